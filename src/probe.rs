//! Harness-side readiness check for a bridge that is still starting up.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};

use crate::constants::timing::PROBE_RETRY_INTERVAL;
use crate::error::{BridgeError, Result};

/// Connects to `addr`, retrying until the bridge accepts or `timeout` elapses.
pub async fn wait_for_bridge(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + timeout;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if Instant::now() >= deadline {
                    log::warn!("Bridge on {} not reachable: {}", addr, e);
                    return Err(BridgeError::Timeout { addr });
                }
                log::debug!("Bridge on {} not ready yet: {}", addr, e);
                sleep(PROBE_RETRY_INTERVAL).await;
            }
        }
    }
}
