//! Connectivity probe.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Probe timeout. The probe is a pre-flight gate and must fail fast.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Check whether the render backend accepts TCP connections.
///
/// Any failure (timeout, refusal, resolution error) maps to `false`.
pub async fn is_reachable(host: &str, port: u16) -> bool {
    let addr = format!("{}:{}", host, port);
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Probe to {} failed: {}", addr, e);
            false
        }
        Err(_) => {
            debug!("Probe to {} timed out", addr);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_refused_port() {
        // Bind then drop to get a port that is very likely closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!is_reachable("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(is_reachable("127.0.0.1", port).await);
    }
}
