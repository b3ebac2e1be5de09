use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::SessionError;

use super::CancelToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a readiness check at a fixed interval.
#[derive(Clone)]
pub struct ReadinessPoller {
    interval: Duration,
    cancel: CancelToken,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, cancel: CancelToken) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Call `predicate` until it reports ready, fails, or `deadline` elapses.
    ///
    /// A predicate error is returned as-is without further polling. Running out
    /// of time yields [`SessionError::ReadinessTimeout`]; cancellation yields
    /// [`SessionError::Cancelled`].
    pub fn wait_until_ready<F>(&self, mut predicate: F, deadline: Duration) -> Result<(), SessionError>
    where
        F: FnMut() -> Result<bool, SessionError>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            attempt += 1;
            if predicate()? {
                debug!(attempt, elapsed_ms = start.elapsed().as_millis() as u64, "readiness:ready");
                return Ok(());
            }
            trace!(attempt, "readiness:not ready");

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                debug!(attempt, "readiness:deadline exceeded");
                return Err(SessionError::ReadinessTimeout { waited: elapsed });
            }

            if self.cancel.sleep(self.interval.min(deadline - elapsed)) {
                return Err(SessionError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn poller(interval_ms: u64) -> ReadinessPoller {
        ReadinessPoller::new(Duration::from_millis(interval_ms), CancelToken::new())
    }

    #[test]
    fn returns_on_first_success_without_extra_polls() {
        let mut calls = 0;
        let start = Instant::now();
        poller(500)
            .wait_until_ready(
                || {
                    calls += 1;
                    Ok(true)
                },
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(calls, 1);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn polls_until_ready() {
        let mut calls = 0;
        poller(5)
            .wait_until_ready(
                || {
                    calls += 1;
                    Ok(calls == 3)
                },
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out_when_never_ready() {
        let err = poller(10)
            .wait_until_ready(|| Ok(false), Duration::from_millis(50))
            .unwrap_err();
        assert!(err.is(ErrorKind::ReadinessTimeout));
    }

    #[test]
    fn hard_error_propagates_immediately() {
        let mut calls = 0;
        let err = poller(5)
            .wait_until_ready(
                || {
                    calls += 1;
                    Err(SessionError::Validation("guest unreachable".to_string()))
                },
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(err.is(ErrorKind::Validation));
    }

    #[test]
    fn cancellation_aborts_pending_wait() {
        let token = CancelToken::new();
        let poller = ReadinessPoller::new(Duration::from_secs(30), token.clone());
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token.cancel();
        });

        let start = Instant::now();
        let err = poller
            .wait_until_ready(|| Ok(false), Duration::from_secs(60))
            .unwrap_err();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
