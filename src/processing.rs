//! Polling for remote processing.

use crate::error::ApiError;
use std::time::{Duration, Instant};
use tracing::debug;

/// Calls `poll` every `interval` until it returns `true` or `timeout` elapses.
///
/// Expiry fails with `ProcessingTimeout`; the remote work is left running.
pub fn wait_until(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut poll: impl FnMut() -> Result<bool, ApiError>,
) -> Result<(), ApiError> {
    let start = Instant::now();
    loop {
        if poll()? {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(ApiError::ProcessingTimeout {
                what: what.to_string(),
                waited,
            });
        }
        debug!(what, waited_ms = waited.as_millis() as u64, "Still waiting");
        std::thread::sleep(interval.min(timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_once_condition_holds() {
        let mut polls = 0;
        wait_until("test", Duration::from_secs(5), Duration::ZERO, || {
            polls += 1;
            Ok(polls == 3)
        })
        .unwrap();
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_times_out() {
        let err = wait_until(
            "video processing",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || Ok(false),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::ProcessingTimeout { ref what, .. } if what == "video processing"));
    }

    #[test]
    fn test_poll_errors_propagate() {
        let err = wait_until("x", Duration::from_secs(1), Duration::ZERO, || {
            Err(ApiError::Transport("down".into()))
        })
        .unwrap_err();
        assert!(err.is_transient());
    }
}
