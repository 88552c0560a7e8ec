use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::ProbeError;
use crate::types::ProbeTarget;

/// A single connectivity check.
///
/// Implementations do not need to enforce a timeout; the pool bounds every
/// call with the configured per-probe timeout.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, target: ProbeTarget) -> Result<(), ProbeError>;
}

/// Plain TCP connect probe. The stream is closed as soon as it opens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: ProbeTarget) -> Result<(), ProbeError> {
        let stream = TcpStream::connect(target.socket_addr()).await?;
        drop(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = ProbeTarget::new(Ipv4Addr::LOCALHOST, port);
        assert_eq!(TcpProber.probe(target).await, Ok(()));
    }

    #[tokio::test]
    async fn closed_port_is_not_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = ProbeTarget::new(Ipv4Addr::LOCALHOST, port);
        assert!(TcpProber.probe(target).await.is_err());
    }
}
