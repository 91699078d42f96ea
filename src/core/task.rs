//! Task trait, outcome protocol, and error types.
//!
//! The `Task` trait is the smallest schedulable unit of work. A task either
//! finishes its work inside [`Task::execute`] and reports the result
//! immediately, or it hands the work to a spawned tokio task and returns a
//! [`ResultReceiver`] that the caller drains. Both paths are folded into the
//! single [`Outcome`] type so callers never have to guess which one a given
//! task used.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::waiter::WaitError;

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Task timed out.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// External command exited with a non-zero code.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Waiting on remote state was cancelled, hit its deadline, or observed
    /// a terminal failure status.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// Deferred work panicked before completing its result signal.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Shorthand for [`TaskError::ExecutionFailed`].
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::ExecutionFailed(message.into())
    }

    /// Check if this error came from the polling waiter.
    pub fn is_wait_error(&self) -> bool {
        matches!(self, TaskError::Wait(_))
    }
}

/// Sending half of a deferred result.
///
/// Completing the signal consumes it, so a leaf can report at most once. The
/// underlying channel closes when the signal is dropped.
#[derive(Debug)]
pub struct ResultSignal {
    tx: mpsc::UnboundedSender<TaskError>,
}

/// Receiving half of a deferred result: zero or more errors, then closed.
///
/// A receiver that closes without yielding an error means success.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::UnboundedReceiver<TaskError>,
}

/// Create a connected signal/receiver pair.
pub fn result_signal() -> (ResultSignal, ResultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSignal { tx }, ResultReceiver { rx })
}

impl ResultSignal {
    /// Report the final result and close the signal.
    pub fn complete(self, result: Result<(), TaskError>) {
        if let Err(err) = result {
            // Receiver may already be gone; nothing is waiting then.
            let _ = self.tx.send(err);
        }
    }

    /// Push one error without closing. Used by trees relaying a subtree.
    pub(crate) fn forward(&self, err: TaskError) {
        let _ = self.tx.send(err);
    }
}

impl Clone for ResultSignal {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl ResultReceiver {
    /// A receiver that is already closed and will never yield an error.
    pub fn closed() -> Self {
        let (signal, receiver) = result_signal();
        drop(signal);
        receiver
    }

    /// Wait for the next error, or `None` once the signal is closed.
    pub async fn recv(&mut self) -> Option<TaskError> {
        self.rx.recv().await
    }

    /// Drain every error until the signal closes.
    pub async fn collect(mut self) -> Vec<TaskError> {
        let mut errors = Vec::new();
        while let Some(err) = self.rx.recv().await {
            errors.push(err);
        }
        errors
    }
}

/// What a task hands back from [`Task::execute`].
#[derive(Debug)]
pub enum Outcome {
    /// The work already ran; this is its final result.
    Immediate(Result<(), TaskError>),
    /// The work is still running; drain the receiver for its errors.
    Deferred(ResultReceiver),
}

impl Outcome {
    /// Immediate success.
    pub fn done() -> Self {
        Outcome::Immediate(Ok(()))
    }

    /// Spawn `work` on the tokio runtime and return its deferred result.
    ///
    /// A panic inside `work` is reported as [`TaskError::Panicked`] instead
    /// of closing the signal silently. Must be called from within a tokio
    /// runtime.
    pub fn deferred<F>(work: F) -> Self
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let (signal, receiver) = result_signal();
        tokio::spawn(async move {
            let result = match tokio::spawn(work).await {
                Ok(result) => result,
                Err(join_err) => Err(TaskError::Panicked(join_err.to_string())),
            };
            signal.complete(result);
        });
        Outcome::Deferred(receiver)
    }

    /// Resolve the outcome into the list of errors it produced.
    pub async fn errors(self) -> Vec<TaskError> {
        match self {
            Outcome::Immediate(Ok(())) => Vec::new(),
            Outcome::Immediate(Err(err)) => vec![err],
            Outcome::Deferred(receiver) => receiver.collect().await,
        }
    }
}

/// The core trait for schedulable units of work.
///
/// # Example
///
/// ```
/// use fleetops::{Outcome, Task, TaskError};
///
/// struct DeleteRole {
///     role: String,
/// }
///
/// impl Task for DeleteRole {
///     fn describe(&self) -> String {
///         format!("delete IAM role {}", self.role)
///     }
///
///     fn execute(&self) -> Outcome {
///         let role = self.role.clone();
///         Outcome::deferred(async move {
///             if role.is_empty() {
///                 return Err(TaskError::failed("no role name"));
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync {
    /// Short human-readable summary, for display and logging only.
    fn describe(&self) -> String;

    /// Start the work.
    ///
    /// Return [`Outcome::Immediate`] when the work finished inline, or
    /// [`Outcome::Deferred`] when it continues on another tokio task.
    fn execute(&self) -> Outcome;
}
