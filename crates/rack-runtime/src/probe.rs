//! Host port probe run before any container starts.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use rack_common::constants::PORT_PROBE_TIMEOUT_MS;
use rack_common::error::ConfigError;

/// Variable naming a remote engine daemon.
pub const DOCKER_HOST_VAR: &str = "DOCKER_HOST";

const LOCALHOST: &str = "127.0.0.1";

/// Host on which published ports appear, derived from a `DOCKER_HOST`
/// value. Unix sockets and unset values mean the local machine.
#[must_use]
pub fn engine_host(docker_host: Option<&str>) -> String {
    let Some(value) = docker_host.map(str::trim).filter(|v| !v.is_empty()) else {
        return LOCALHOST.to_string();
    };
    let Some((scheme, rest)) = value.split_once("://") else {
        return LOCALHOST.to_string();
    };
    if scheme == "unix" || scheme == "npipe" {
        return LOCALHOST.to_string();
    }
    let authority = rest.split('/').next().unwrap_or_default();
    let host = match authority.strip_prefix('[') {
        Some(v6) => v6.split(']').next().unwrap_or_default(),
        None => authority.split(':').next().unwrap_or_default(),
    };
    if host.is_empty() {
        LOCALHOST.to_string()
    } else {
        host.to_string()
    }
}

/// Engine host of the current process environment.
#[must_use]
pub fn current_engine_host() -> String {
    engine_host(std::env::var(DOCKER_HOST_VAR).ok().as_deref())
}

/// Ports on `host` that accept a TCP connection within `timeout`, in input
/// order.
#[must_use]
pub fn ports_in_use(host: &str, ports: &[u16], timeout: Duration) -> Vec<u16> {
    ports
        .iter()
        .copied()
        .filter(|&port| accepts(host, port, timeout))
        .collect()
}

fn accepts(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::debug!(host, port, error = %e, "cannot resolve engine host");
            return false;
        }
    };
    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
}

/// Fails if any of `ports` is already open on `host`.
///
/// # Errors
///
/// Returns [`ConfigError::PortsInUse`] listing the open ports.
pub fn check_ports_free(host: &str, ports: &[u16]) -> Result<(), ConfigError> {
    let timeout = Duration::from_millis(PORT_PROBE_TIMEOUT_MS);
    let open = ports_in_use(host, ports, timeout);
    if open.is_empty() {
        tracing::debug!(host, count = ports.len(), "wanted host ports are free");
        Ok(())
    } else {
        Err(ConfigError::PortsInUse { ports: open })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn engine_host_defaults_to_localhost() {
        assert_eq!(engine_host(None), "127.0.0.1");
        assert_eq!(engine_host(Some("")), "127.0.0.1");
        assert_eq!(engine_host(Some("unix:///var/run/docker.sock")), "127.0.0.1");
    }

    #[test]
    fn engine_host_from_tcp_url() {
        assert_eq!(engine_host(Some("tcp://192.168.99.100:2376")), "192.168.99.100");
        assert_eq!(engine_host(Some("tcp://docker.local")), "docker.local");
        assert_eq!(engine_host(Some("tcp://[::1]:2375")), "::1");
    }

    #[test]
    fn detects_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let err = check_ports_free("127.0.0.1", &[port]).unwrap_err();
        assert!(matches!(err, ConfigError::PortsInUse { ref ports } if ports == &[port]));
    }

    #[test]
    fn closed_port_is_free() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        check_ports_free("127.0.0.1", &[port]).expect("port should be free");
    }
}
