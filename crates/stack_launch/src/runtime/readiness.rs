//! Gate between two consecutive launches

use crate::config::Readiness;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Wait until the next service may be launched.
///
/// Returns `true` when the gate was satisfied, `false` when a port probe
/// timed out. A timeout is logged and never treated as an error.
pub async fn wait_ready(readiness: &Readiness) -> bool {
    match *readiness {
        Readiness::Delay(delay) => {
            log::debug!("Waiting {}ms before next launch", delay.as_millis());
            tokio::time::sleep(delay).await;
            true
        }
        Readiness::Port {
            addr,
            timeout,
            interval,
        } => {
            log::info!("Waiting for {} to accept connections...", addr);
            let ready = poll_port(addr, timeout, interval).await;
            if ready {
                log::info!("{} is accepting connections", addr);
            } else {
                log::warn!(
                    "{} not ready after {}ms, launching next service anyway",
                    addr,
                    timeout.as_millis()
                );
            }
            ready
        }
    }
}

async fn poll_port(addr: SocketAddr, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => return true,
            Ok(Err(e)) => log::trace!("Probe of {} failed: {}", addr, e),
            Err(_) => return false,
        }

        if Instant::now() + interval >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
