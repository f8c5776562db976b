//! Port declarations, host port shifting and conflict detection.

use std::collections::BTreeMap;
use std::fmt;

use rack_common::constants::SHIFT_LABEL;
use rack_common::error::ConfigError;

use crate::model::{Manifest, Service};

/// A parsed port publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortMapping {
    /// Port published on the engine host.
    pub host: u16,
    /// Port inside the container.
    pub container: u16,
}

impl PortMapping {
    /// Parses `container` or `host:container`.
    ///
    /// A bare container port publishes the same number on the host.
    /// Anything else (interface bindings, protocols, ranges) is rejected.
    #[must_use]
    pub fn parse(port: &str) -> Option<Self> {
        let mut parts = port.split(':');
        let first = parts.next()?.trim().parse().ok()?;
        match (parts.next(), parts.next()) {
            (None, _) => Some(Self {
                host: first,
                container: first,
            }),
            (Some(container), None) => Some(Self {
                host: first,
                container: container.trim().parse().ok()?,
            }),
            (Some(_), Some(_)) => None,
        }
    }

    /// Moves the host port by `shift`. Returns `None` if the result leaves
    /// the valid port range.
    #[must_use]
    pub fn shifted(self, shift: i32) -> Option<Self> {
        let host = u16::try_from(i32::from(self.host) + shift).ok()?;
        Some(Self { host, ..self })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Effective shift for a service: the `rack.start.shift` label when set,
/// otherwise `default`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidLabel`] if the label is not an integer.
pub fn service_shift(service: &Service, default: i32) -> Result<i32, ConfigError> {
    match service.label(SHIFT_LABEL) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidLabel {
            service: service.name.clone(),
            label: SHIFT_LABEL.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parsed and shifted port mappings of a service. Declarations that do not
/// parse are skipped; the runtime driver reports them when it renders the
/// run invocation.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidLabel`] for a malformed shift label.
pub fn service_ports(service: &Service, shift: i32) -> Result<Vec<PortMapping>, ConfigError> {
    let shift = service_shift(service, shift)?;
    Ok(service
        .ports
        .iter()
        .filter_map(|p| PortMapping::parse(p).and_then(|m| m.shifted(shift)))
        .collect())
}

/// Every host port the manifest publishes after shifting, sorted and
/// deduplicated.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidLabel`] for a malformed shift label.
pub fn wanted_host_ports(manifest: &Manifest, shift: i32) -> Result<Vec<u16>, ConfigError> {
    let mut ports = Vec::new();
    for service in manifest.services() {
        ports.extend(service_ports(service, shift)?.into_iter().map(|m| m.host));
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Fails if two services publish the same host port.
///
/// # Errors
///
/// Returns [`ConfigError::PortConflict`] for the lowest conflicting port,
/// or [`ConfigError::InvalidLabel`] for a malformed shift label.
pub fn check_conflicts(manifest: &Manifest, shift: i32) -> Result<(), ConfigError> {
    let mut owners: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for service in manifest.services() {
        for mapping in service_ports(service, shift)? {
            let entry = owners.entry(mapping.host).or_default();
            if !entry.contains(&service.name) {
                entry.push(service.name.clone());
            }
        }
    }

    if let Some((port, services)) = owners.into_iter().find(|(_, s)| s.len() > 1) {
        tracing::debug!(port, services = ?services, "host port conflict");
        return Err(ConfigError::PortConflict { port, services });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::loader::parse_str;

    fn manifest(yaml: &str) -> Manifest {
        parse_str(Path::new("/app"), yaml).expect("should parse")
    }

    #[test]
    fn parses_both_forms() {
        assert_eq!(
            PortMapping::parse("5000:3000"),
            Some(PortMapping {
                host: 5000,
                container: 3000
            })
        );
        assert_eq!(PortMapping::parse("3000").map(|m| m.to_string()).as_deref(), Some("3000:3000"));
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(PortMapping::parse("127.0.0.1:80:80"), None);
        assert_eq!(PortMapping::parse("80/udp"), None);
        assert_eq!(PortMapping::parse("http"), None);
        assert_eq!(PortMapping::parse(""), None);
        assert_eq!(PortMapping::parse("70000"), None);
    }

    #[test]
    fn shift_moves_host_side_only() {
        let mapping = PortMapping::parse("5000:3000").expect("parse");
        assert_eq!(mapping.shifted(100).map(|m| m.to_string()).as_deref(), Some("5100:3000"));
        assert_eq!(mapping.shifted(70_000), None);
    }

    #[test]
    fn label_overrides_shift() {
        let m = manifest(
            "web:\n  image: x\n  ports: [\"80:80\"]\n  labels:\n    rack.start.shift: 1000\n",
        );
        let web = m.service("web").expect("web");
        assert_eq!(service_shift(web, 5).expect("shift"), 1000);
        assert_eq!(wanted_host_ports(&m, 5).expect("ports"), vec![1080]);
    }

    #[test]
    fn malformed_label_is_rejected() {
        let m = manifest("web:\n  image: x\n  labels:\n    rack.start.shift: lots\n");
        let err = service_shift(m.service("web").expect("web"), 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLabel { .. }), "got: {err}");
    }

    #[test]
    fn shared_host_port_conflicts() {
        let m = manifest(
            "web:\n  image: x\n  ports: [\"5000:3000\"]\napi:\n  image: y\n  ports: [\"5000:4000\"]\n",
        );
        let err = check_conflicts(&m, 0).unwrap_err();
        match err {
            ConfigError::PortConflict { port, services } => {
                assert_eq!(port, 5000);
                assert_eq!(services, vec!["api", "web"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bare_port_conflicts_with_mapped_port() {
        let m = manifest("a:\n  image: x\n  ports: [3000]\nb:\n  image: y\n  ports: [\"3000:80\"]\n");
        assert!(check_conflicts(&m, 0).is_err());
    }

    #[test]
    fn distinct_ports_are_accepted() {
        let m = manifest("a:\n  image: x\n  ports: [3000]\nb:\n  image: y\n  ports: [\"3001:3000\"]\n");
        assert!(check_conflicts(&m, 0).is_ok());
        assert_eq!(wanted_host_ports(&m, 0).expect("ports"), vec![3000, 3001]);
    }
}
