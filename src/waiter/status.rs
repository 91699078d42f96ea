//! Waiting on a remote resource's status string.
//!
//! Remote control planes report lifecycle state as a status word
//! ("CREATING", "ACTIVE", "FAILED", ...). A [`StatusClassifier`] sorts each
//! observed status into done, in progress, or failed, and [`StatusWait`]
//! drives a [`Waiter`] over a [`StatusSource`] until the resource settles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Backoff, WaitError, Waiter};
use crate::core::task::{Outcome, Task, TaskError};

/// Where an observed status falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// A recognized success value.
    Done,
    /// Anything not recognized.
    InProgress,
    /// A recognized failure value.
    Failed,
}

/// Classifies status strings against known success and failure values.
///
/// Matching ignores case and surrounding whitespace. Any status not listed
/// counts as still in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusClassifier {
    success: Vec<String>,
    failure: Vec<String>,
}

fn normalize(status: &str) -> String {
    status.trim().to_lowercase()
}

impl StatusClassifier {
    pub fn new<S, F>(success: S, failure: F) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            success: success.into_iter().map(|s| normalize(s.as_ref())).collect(),
            failure: failure.into_iter().map(|s| normalize(s.as_ref())).collect(),
        }
    }

    pub fn success_values(&self) -> &[String] {
        &self.success
    }

    pub fn failure_values(&self) -> &[String] {
        &self.failure
    }

    pub fn classify(&self, status: &str) -> StatusClass {
        let status = normalize(status);
        if self.success.contains(&status) {
            StatusClass::Done
        } else if self.failure.contains(&status) {
            StatusClass::Failed
        } else {
            StatusClass::InProgress
        }
    }

    /// Map a status onto the waiter's three-way outcome.
    pub fn check(&self, resource: &str, status: &str) -> Result<bool, WaitError> {
        match self.classify(status) {
            StatusClass::Done => Ok(true),
            StatusClass::InProgress => Ok(false),
            StatusClass::Failed => Err(WaitError::TerminalStatus {
                resource: resource.to_string(),
                status: status.trim().to_string(),
            }),
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(["successful"], ["failed", "cancelled"])
    }
}

/// A remote resource whose status can be queried.
///
/// Implementations should be side-effect free reads; they may fail
/// transiently, and such failures end the wait.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Name of the resource, used in logs and terminal-status errors.
    fn resource(&self) -> String;

    async fn status(&self) -> Result<String, TaskError>;
}

/// How to wait for a [`StatusSource`] to settle.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusWait {
    pub classifier: StatusClassifier,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl StatusWait {
    pub fn new(classifier: StatusClassifier, backoff: Backoff, timeout: Duration) -> Self {
        Self {
            classifier,
            backoff,
            timeout,
        }
    }

    /// Poll `source` until it reports success, a failure status, the
    /// deadline passes, or `cancel` fires.
    pub async fn wait(
        &self,
        source: &dyn StatusSource,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let resource = source.resource();
        let resource = resource.as_str();
        let classifier = &self.classifier;
        let backoff = &self.backoff;

        let waiter = Waiter::new(
            move |attempt| backoff.delay_for(attempt),
            move || async move {
                let status = source.status().await?;
                debug!(resource, status = %status.trim(), "polled status");
                classifier.check(resource, &status).map_err(TaskError::from)
            },
        );

        waiter.run_bounded(cancel, self.timeout).await
    }
}

/// Leaf task that waits for a remote resource to settle.
pub struct StatusWaitTask {
    description: String,
    source: Arc<dyn StatusSource>,
    wait: Arc<StatusWait>,
    cancel: CancellationToken,
}

impl StatusWaitTask {
    pub fn new(
        description: impl Into<String>,
        source: Arc<dyn StatusSource>,
        wait: StatusWait,
    ) -> Self {
        Self {
            description: description.into(),
            source,
            wait: Arc::new(wait),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder: abort the wait when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Task for StatusWaitTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self) -> Outcome {
        let source = Arc::clone(&self.source);
        let wait = Arc::clone(&self.wait);
        let cancel = self.cancel.clone();
        Outcome::deferred(async move { wait.wait(source.as_ref(), &cancel).await })
    }
}
