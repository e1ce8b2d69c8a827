//! Exponential backoff for connectivity failures.

use std::future::Future;
use std::time::Duration;

use paysync_store::StoreError;
use tracing::warn;

use crate::error::SyncError;
use crate::shutdown::Shutdown;

/// Doubling delay with a ceiling, reset after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    /// Create a backoff starting at `initial` and capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    /// The delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Run `attempt` until it succeeds, sleeping out connectivity failures.
///
/// Any other store error is returned at once, tagged with `wrap`. A stop
/// during a wait ends the retries with [`SyncError::Cancelled`].
///
/// # Errors
///
/// Returns the first non-connectivity failure, or `Cancelled` on stop.
pub async fn retry_unavailable<T, F, Fut>(
    operation: &'static str,
    mut backoff: Backoff,
    shutdown: &mut Shutdown,
    wrap: fn(StoreError) -> SyncError,
    mut attempt: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_connectivity() => {
                let delay = backoff.next_delay();
                warn!(operation, error = %e, retry_in = ?delay, "Database unreachable, retrying");
                if shutdown.sleep(delay).await {
                    return Err(SyncError::Cancelled);
                }
            }
            Err(e) => return Err(wrap(e)),
        }
    }
}
