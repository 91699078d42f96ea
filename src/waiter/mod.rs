//! Polling primitive for eventually-consistent remote state.
//!
//! A [`Waiter`] repeatedly sleeps for a computed delay and then invokes a
//! status check until the check reports completion, reports a terminal
//! failure, or the caller's cancellation token / deadline fires.
//!
//! The operation returns a three-way outcome:
//! - `Ok(false)` - not done yet, poll again
//! - `Ok(true)` - done
//! - `Err(e)` - terminal failure, returned unchanged
//!
//! There is no built-in attempt limit. Bound the total time with a
//! [`CancellationToken`] or [`Waiter::run_with_timeout`].

mod backoff;
mod status;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use backoff::Backoff;
pub use status::{StatusClass, StatusClassifier, StatusSource, StatusWait, StatusWaitTask};

/// Errors produced by the waiter itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The caller's cancellation token fired.
    #[error("wait cancelled")]
    Cancelled,

    /// The wait did not finish before its deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The polled resource reached a recognized failure status.
    #[error("{resource} reached terminal status '{status}'")]
    TerminalStatus { resource: String, status: String },
}

/// Polling loop built from a delay schedule and a status check.
///
/// Constructed per wait and consumed by a single run.
///
/// # Example
///
/// ```
/// use fleetops::{WaitError, Waiter};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut polls = 0;
/// let waiter = Waiter::new(
///     |_attempt| Duration::from_millis(1),
///     || {
///         polls += 1;
///         let done = polls == 3;
///         async move { Ok::<_, WaitError>(done) }
///     },
/// );
///
/// waiter.run_with_timeout(Duration::from_secs(1)).await.unwrap();
/// # }
/// ```
pub struct Waiter<D, F> {
    next_delay: D,
    operation: F,
}

impl<D, F> Waiter<D, F> {
    /// Create a waiter.
    ///
    /// # Arguments
    /// * `next_delay` - Maps the attempt number (starting at 1) to a delay
    /// * `operation` - Status check invoked once per attempt
    pub fn new<Fut>(next_delay: D, operation: F) -> Self
    where
        D: Fn(u32) -> Duration,
        F: FnMut() -> Fut,
    {
        Self {
            next_delay,
            operation,
        }
    }
}

impl<F> Waiter<Box<dyn Fn(u32) -> Duration + Send + Sync>, F> {
    /// Create a waiter whose delays follow `backoff`.
    pub fn with_backoff<Fut>(backoff: Backoff, operation: F) -> Self
    where
        F: FnMut() -> Fut,
    {
        Self::new(Box::new(move |attempt| backoff.delay_for(attempt)), operation)
    }
}

impl<D, F, Fut, E> Waiter<D, F>
where
    D: Fn(u32) -> Duration,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<WaitError>,
{
    /// Poll until done, failed, or `cancel` fires.
    pub async fn run(self, cancel: &CancellationToken) -> Result<(), E> {
        self.poll_until(cancel, None).await
    }

    /// Poll until done or failed, giving up with
    /// [`WaitError::DeadlineExceeded`] after `timeout`.
    ///
    /// The deadline is checked between polls; an operation call already in
    /// flight is allowed to finish.
    pub async fn run_with_timeout(self, timeout: Duration) -> Result<(), E> {
        self.run_bounded(&CancellationToken::new(), timeout).await
    }

    /// Poll with both a cancellation token and a deadline.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub async fn run_bounded(self, cancel: &CancellationToken, timeout: Duration) -> Result<(), E> {
        let deadline = Instant::now().checked_add(timeout).map(|at| (at, timeout));
        self.poll_until(cancel, deadline).await
    }

    async fn poll_until(
        mut self,
        cancel: &CancellationToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), E> {
        let mut attempt: u32 = 1;
        loop {
            let delay = (self.next_delay)(attempt);
            trace!(attempt, delay_ms = delay.as_millis() as u64, "waiting before poll");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt, "wait cancelled");
                    return Err(WaitError::Cancelled.into());
                }
                _ = deadline_reached(deadline) => {
                    let timeout = deadline.map(|(_, timeout)| timeout).unwrap_or_default();
                    debug!(attempt, timeout_ms = timeout.as_millis() as u64, "wait deadline exceeded");
                    return Err(WaitError::DeadlineExceeded(timeout).into());
                }
                _ = sleep(delay) => {}
            }

            match (self.operation)().await {
                Ok(true) => {
                    debug!(attempt, "wait finished");
                    return Ok(());
                }
                Ok(false) => {
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => {
                    debug!(attempt, "wait aborted by operation error");
                    return Err(err);
                }
            }
        }
    }
}

async fn deadline_reached(deadline: Option<(Instant, Duration)>) {
    match deadline {
        Some((at, _)) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
