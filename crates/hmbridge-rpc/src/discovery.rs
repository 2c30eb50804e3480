//! Controller interface discovery
//!
//! An interface counts as present when a bare TCP connection to its port
//! succeeds. Probes run concurrently.

use std::time::Duration;

use futures::future::join_all;
use hmbridge_core::WireProtocol;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A controller interface the gateway may register with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    pub port: u16,
    pub protocol: WireProtocol,
}

impl InterfaceSpec {
    pub fn new(name: impl Into<String>, port: u16, protocol: WireProtocol) -> Self {
        Self {
            name: name.into(),
            port,
            protocol,
        }
    }
}

/// Interfaces a stock controller may expose
pub fn default_candidates() -> Vec<InterfaceSpec> {
    vec![
        InterfaceSpec::new("rfd", 2001, WireProtocol::BinRpc),
        InterfaceSpec::new("hs485d", 2000, WireProtocol::BinRpc),
        InterfaceSpec::new("hmip", 2010, WireProtocol::XmlRpc),
    ]
}

/// Probe every candidate and return the reachable ones, in candidate order
pub async fn discover(
    host: &str,
    candidates: Vec<InterfaceSpec>,
    timeout: Duration,
) -> Vec<InterfaceSpec> {
    let probes = candidates.iter().map(|spec| async move {
        let addr = format!("{}:{}", host, spec.port);
        let reachable = matches!(
            tokio::time::timeout(timeout, TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        );
        debug!(interface = %spec.name, %addr, reachable, "Probed interface");
        reachable
    });
    let results = join_all(probes).await;

    let found: Vec<InterfaceSpec> = candidates
        .into_iter()
        .zip(results)
        .filter_map(|(spec, reachable)| reachable.then_some(spec))
        .collect();
    info!(
        host,
        interfaces = ?found.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "Discovery complete"
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_only_listening_ports_are_found() {
        let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = open.local_addr().unwrap().port();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let found = discover(
            "127.0.0.1",
            vec![
                InterfaceSpec::new("rfd", closed_port, WireProtocol::BinRpc),
                InterfaceSpec::new("hmip", open_port, WireProtocol::XmlRpc),
            ],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(
            found,
            vec![InterfaceSpec::new("hmip", open_port, WireProtocol::XmlRpc)]
        );
    }

    #[test]
    fn test_default_candidates() {
        let names: Vec<_> = default_candidates().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["rfd", "hs485d", "hmip"]);
    }
}
