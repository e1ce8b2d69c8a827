//! Connection gate.
//!
//! Blocks until a database accepts connections. There is no attempt limit:
//! at startup the databases may take arbitrarily long to come up, and the
//! only way out other than success is an operator stop.

use std::time::Duration;

use paysync_store::Probe;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::shutdown::Shutdown;

/// Readiness check with a fixed retry delay.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionGate {
    backoff: Duration,
}

impl ConnectionGate {
    /// Create a gate that waits `backoff` between attempts.
    #[must_use]
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Wait until `probe` succeeds. Returns the number of attempts made.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cancelled` if a stop is requested while waiting.
    pub async fn await_ready(
        &self,
        probe: &dyn Probe,
        shutdown: &mut Shutdown,
    ) -> Result<u32, SyncError> {
        let mut attempts = 0u32;

        loop {
            if shutdown.is_stopped() {
                return Err(SyncError::Cancelled);
            }

            attempts += 1;
            match probe.ping().await {
                Ok(()) => {
                    info!(endpoint = probe.name(), attempts, "Database is ready");
                    return Ok(attempts);
                }
                Err(e) => {
                    warn!(
                        endpoint = probe.name(),
                        attempts,
                        retry_in = ?self.backoff,
                        error = %e,
                        "Waiting for database"
                    );
                }
            }

            if shutdown.sleep(self.backoff).await {
                return Err(SyncError::Cancelled);
            }
        }
    }
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
