//! Fixed-interval polling with a bounded timeout
//!
//! Time is measured on the tokio clock, so tests running with a paused
//! runtime observe timeouts without real delays.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Timeout and interval of one polling loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum time to keep polling
    pub timeout: Duration,
    /// Time between checks
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a policy
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Result of a single check.
///
/// - `Ready(value)` - terminal observation, stop polling
/// - `Pending(observed)` - keep polling; `observed` is the state seen, if any
pub enum Check<T> {
    /// Terminal observation
    Ready(T),
    /// Not terminal yet
    Pending(Option<String>),
}

/// Result of a whole polling loop
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A check returned `Check::Ready`
    Ready(T),
    /// The timeout elapsed first
    TimedOut {
        /// Last state reported by a pending check
        last_observed: Option<String>,
    },
}

/// Poll `check_fn` until it reports a terminal state or `policy.timeout`
/// elapses.
///
/// The first check runs immediately. Checks handle their own transient errors
/// by returning `Check::Pending`; the last observed state is kept across
/// checks that observe nothing.
pub async fn poll_until_ready<T, F, Fut>(
    policy: PollPolicy,
    description: &str,
    mut check_fn: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Check<T>>,
{
    let start = Instant::now();
    let mut last_observed = None;

    loop {
        match check_fn().await {
            Check::Ready(value) => return PollOutcome::Ready(value),
            Check::Pending(observed) => {
                if observed.is_some() {
                    last_observed = observed;
                }
            }
        }

        if start.elapsed() + policy.interval > policy.timeout {
            debug!(
                timeout_secs = policy.timeout.as_secs(),
                "Timeout waiting for {}", description
            );
            return PollOutcome::TimedOut { last_observed };
        }

        debug!(
            observed = last_observed.as_deref().unwrap_or("none"),
            "Waiting for {}...", description
        );
        tokio::time::sleep(policy.interval).await;
    }
}

/// Poll until a resource is gone.
///
/// `check_exists` returns `Ok(true)` while the resource exists. Errors count
/// as "gone" since the state cannot be determined; a timeout is logged and
/// the caller proceeds anyway.
pub async fn wait_for_deletion<F, Fut>(policy: PollPolicy, description: &str, mut check_exists: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, String>>,
{
    let start = Instant::now();

    loop {
        match check_exists().await {
            Ok(true) => {
                if start.elapsed() + policy.interval > policy.timeout {
                    warn!(
                        "Timeout waiting for {} deletion, proceeding anyway",
                        description
                    );
                    return;
                }
                debug!("{} still exists, waiting...", description);
                tokio::time::sleep(policy.interval).await;
            }
            Ok(false) => {
                debug!("{} deleted", description);
                return;
            }
            Err(e) => {
                debug!(error = %e, "Could not check {}, assuming deleted", description);
                return;
            }
        }
    }
}
