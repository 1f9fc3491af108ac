//! Data-node address to producer admin address mapping.
//!
//! Producers run next to the data service on every node. A remote node's
//! producer listens on [`PROJECTOR_PORT`]; on a development cluster several
//! nodes share one host, data ports step by two from
//! [`KV_DCP_PORT_CLUSTER_RUN`] and producer ports step by one.

use std::net::IpAddr;
use streamadmin_common::protocol::ProducerError;

use crate::http::HttpClientConfig;

pub const PROJECTOR_PORT: u16 = 9999;
pub const KV_DCP_PORT: u16 = 11210;
pub const KV_DCP_PORT_CLUSTER_RUN: u16 = 12000;
pub const LOCALHOST: &str = "127.0.0.1";

fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || (host.contains(':') && !addr.starts_with('[')) {
        return None;
    }
    let port = port.parse().ok()?;
    Some((host, port))
}

fn is_local(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// Derives the producer admin address for a data node.
///
/// Fails with [`ProducerError::InvalidKvAddrs`] if `node` is not `host:port`
/// or a local development port maps outside the valid port range.
pub fn producer_address(node: &str, config: &HttpClientConfig) -> Result<String, ProducerError> {
    let (host, port) = split_host_port(node).ok_or(ProducerError::InvalidKvAddrs)?;

    if !is_local(host) {
        return Ok(format!("{}:{}", host, config.projector_port));
    }

    if port == config.kv_dcp_port {
        return Ok(format!("{}:{}", LOCALHOST, config.projector_port));
    }

    let node_num = (i32::from(port) - i32::from(config.kv_dcp_port_cluster_run)) / 2;
    let mapped = u16::try_from(i32::from(config.projector_port) + node_num)
        .map_err(|_| ProducerError::InvalidKvAddrs)?;
    Ok(format!("{}:{}", LOCALHOST, mapped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpClientConfig {
        HttpClientConfig::default()
    }

    #[test]
    fn test_remote_node_uses_projector_port() {
        assert_eq!(
            producer_address("10.1.2.3:11210", &config()).unwrap(),
            "10.1.2.3:9999"
        );
        assert_eq!(
            producer_address("kv-node-7.example:12000", &config()).unwrap(),
            "kv-node-7.example:9999"
        );
    }

    #[test]
    fn test_local_default_port() {
        assert_eq!(
            producer_address("127.0.0.1:11210", &config()).unwrap(),
            "127.0.0.1:9999"
        );
        assert_eq!(
            producer_address("localhost:11210", &config()).unwrap(),
            "127.0.0.1:9999"
        );
    }

    #[test]
    fn test_local_cluster_run_ports_step_by_two() {
        assert_eq!(producer_address("127.0.0.1:12000", &config()).unwrap(), "127.0.0.1:9999");
        assert_eq!(producer_address("127.0.0.1:12002", &config()).unwrap(), "127.0.0.1:10000");
        assert_eq!(producer_address("127.0.0.1:12006", &config()).unwrap(), "127.0.0.1:10002");
    }

    #[test]
    fn test_ipv6_loopback() {
        assert_eq!(producer_address("[::1]:11210", &config()).unwrap(), "127.0.0.1:9999");
    }

    #[test]
    fn test_unparseable_address() {
        assert_eq!(producer_address("no-port", &config()), Err(ProducerError::InvalidKvAddrs));
        assert_eq!(producer_address("host:port", &config()), Err(ProducerError::InvalidKvAddrs));
        assert_eq!(producer_address(":11210", &config()), Err(ProducerError::InvalidKvAddrs));
    }
}
