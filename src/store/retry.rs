// Retry module
// Bounded geometric backoff for transient adapter failures

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::SyncError;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Run an adapter operation, retrying `AdapterTransient` failures with a
/// geometrically increasing delay: one second, doubled each attempt,
/// abandoned once the next delay would exceed a minute. Terminal errors
/// pass straight through. The core engine never calls this; only the
/// adapter layer retries.
pub fn with_backoff<T>(
    operation: &str,
    mut f: impl FnMut() -> Result<T, SyncError>,
) -> Result<T, SyncError> {
    let mut delay = INITIAL_DELAY;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match f() {
            Ok(value) => return Ok(value),
            Err(SyncError::AdapterTransient { reason, .. }) => {
                if delay > MAX_DELAY {
                    return Err(SyncError::AdapterTransient {
                        operation: operation.to_string(),
                        attempts,
                        reason,
                    });
                }
                warn!(
                    operation,
                    attempt = attempts,
                    delay_secs = delay.as_secs(),
                    %reason,
                    "transient backend failure, backing off"
                );
                thread::sleep(delay);
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(reason: &str) -> SyncError {
        SyncError::AdapterTransient {
            operation: "listing".to_string(),
            attempts: 1,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_first_success_needs_no_retry() {
        let mut calls = 0;
        let result = with_backoff("op", || {
            calls += 1;
            Ok::<_, SyncError>(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let mut calls = 0;
        let result = with_backoff("op", || {
            calls += 1;
            if calls < 3 {
                Err(transient("throttled"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_terminal_error_passes_through() {
        let mut calls = 0;
        let result: Result<(), _> = with_backoff("op", || {
            calls += 1;
            Err(SyncError::NotFound { path: "/x".into() })
        });
        assert!(matches!(result.unwrap_err(), SyncError::NotFound { .. }));
        assert_eq!(calls, 1);
    }
}
