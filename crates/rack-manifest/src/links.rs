//! Variables injected into a service for each of its links.
//!
//! For a link to `redis` in app `shop` whose first port is `6379`, the
//! dependent service sees `REDIS_HOST=shop-redis`, `REDIS_PORT=6379`,
//! `REDIS_URL=tcp://shop-redis:6379` and the related scheme, credential
//! and path variables.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rack_common::types::ContainerName;

use crate::model::{Manifest, Service};
use crate::ports::PortMapping;

/// Scheme of the link URL; defaults to `tcp`.
pub const LINK_SCHEME: &str = "LINK_SCHEME";
/// User name placed in the link URL.
pub const LINK_USERNAME: &str = "LINK_USERNAME";
/// Password placed in the link URL.
pub const LINK_PASSWORD: &str = "LINK_PASSWORD";
/// Path appended to the link URL.
pub const LINK_PATH: &str = "LINK_PATH";

const DEFAULT_SCHEME: &str = "tcp";

/// Computes link variables for `service`.
///
/// `image_env` returns the configured environment of a link target's image;
/// the target's literal manifest environment is laid over it. Links whose
/// target publishes no port produce no variables.
///
/// # Errors
///
/// Propagates the first error returned by `image_env`.
pub fn link_variables<E>(
    manifest: &Manifest,
    app: &str,
    service: &Service,
    mut image_env: impl FnMut(&Service) -> Result<BTreeMap<String, String>, E>,
) -> Result<BTreeMap<String, String>, E> {
    let mut vars = BTreeMap::new();

    for link in &service.links {
        let Some(target) = manifest.service(&link.target) else {
            continue;
        };
        let Some(port) = target.ports.iter().find_map(|p| PortMapping::parse(p)) else {
            tracing::debug!(service = %service.name, link = %link.target, "link target publishes no port");
            continue;
        };

        let mut env = image_env(target)?;
        for (name, value) in target.literal_environment() {
            let _ = env.insert(name.to_string(), value.to_string());
        }
        let get = |key: &str| env.get(key).cloned().unwrap_or_default();

        let scheme = env
            .get(LINK_SCHEME)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        let username = get(LINK_USERNAME);
        let password = get(LINK_PASSWORD);
        let path = get(LINK_PATH);
        let host = ContainerName::for_service(app, &target.name).to_string();

        let url = link_url(&scheme, &username, &password, &host, port.container, &path);
        let prefix = env_prefix(&target.name);

        let _ = vars.insert(format!("{prefix}_URL"), url);
        let _ = vars.insert(format!("{prefix}_HOST"), host);
        let _ = vars.insert(format!("{prefix}_SCHEME"), scheme);
        let _ = vars.insert(format!("{prefix}_PORT"), port.container.to_string());
        let _ = vars.insert(format!("{prefix}_USERNAME"), username);
        let _ = vars.insert(format!("{prefix}_PASSWORD"), password);
        let _ = vars.insert(format!("{prefix}_PATH"), path);
    }

    Ok(vars)
}

/// `redis-cache` becomes `REDIS_CACHE`.
fn env_prefix(target: &str) -> String {
    target.to_uppercase().replace('-', "_")
}

fn link_url(
    scheme: &str,
    username: &str,
    password: &str,
    host: &str,
    port: u16,
    path: &str,
) -> String {
    let mut url = format!("{scheme}://");
    if !username.is_empty() || !password.is_empty() {
        let _ = write!(url, "{}:{}@", escape_userinfo(username), escape_userinfo(password));
    }
    let _ = write!(url, "{host}:{port}");
    if !path.is_empty() {
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);
    }
    url
}

fn escape_userinfo(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}
