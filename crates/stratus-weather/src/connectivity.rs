//! Network reachability.
//!
//! `is_online()` must answer immediately, so the real checker never touches the
//! network on the caller's thread: a background probe keeps an atomic flag fresh
//! and the check only reads it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Synchronous snapshot of current network reachability.
pub trait ConnectivityChecker: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Reachability flag maintained by periodic TCP connect probes.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    online: Arc<AtomicBool>,
    probe_address: SocketAddr,
    probe_timeout: Duration,
}

impl NetworkMonitor {
    /// Starts out offline until the first probe succeeds.
    pub fn new(probe_address: SocketAddr, probe_timeout: Duration) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(false)),
            probe_address,
            probe_timeout,
        }
    }

    /// Probe once and update the flag. Returns the new reachability.
    pub async fn probe_now(&self) -> bool {
        let reachable = matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect(self.probe_address)).await,
            Ok(Ok(_))
        );

        let was_online = self.online.swap(reachable, Ordering::AcqRel);
        if was_online != reachable {
            if reachable {
                tracing::info!("Network reachable via {}", self.probe_address);
            } else {
                tracing::warn!("Network unreachable (probe {} failed)", self.probe_address);
            }
        }
        reachable
    }

    /// Re-probe every `interval` until `cancel` fires.
    pub fn spawn(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        monitor.probe_now().await;
                    }
                }
            }
            tracing::debug!("Connectivity probe stopped");
        })
    }
}

impl ConnectivityChecker for NetworkMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}
