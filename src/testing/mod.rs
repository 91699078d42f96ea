//! Testing utilities for users of the fleetops library.
//!
//! This module provides helpers for testing task trees:
//!
//! - [`SpyTask`]: a task that records how often it ran and succeeds or fails
//!   on demand, inline or deferred
//! - [`SpyHandle`]: observes a [`SpyTask`] after the tree has taken ownership
//! - [`CallLog`]: records the order in which tasks were started

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::task::{Outcome, Task, TaskError};

/// Shared, ordered record of task starts.
///
/// # Example
///
/// ```
/// use fleetops::testing::CallLog;
///
/// let log = CallLog::new();
/// log.record("create vpc");
/// assert_eq!(log.entries(), vec!["create vpc"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Counters observed through a [`SpyHandle`].
#[derive(Debug, Default)]
struct SpyCounters {
    calls: AtomicU32,
    completions: AtomicU32,
}

/// Read-only view of a [`SpyTask`]'s counters.
#[derive(Debug, Clone)]
pub struct SpyHandle {
    counters: Arc<SpyCounters>,
}

impl SpyHandle {
    /// How many times `execute` was called.
    pub fn calls(&self) -> u32 {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// How many executions ran to the end (after any delay).
    pub fn completions(&self) -> u32 {
        self.counters.completions.load(Ordering::SeqCst)
    }
}

/// A task that records its executions and returns a scripted result.
///
/// By default it reports inline ([`Outcome::Immediate`]); [`SpyTask::deferred`]
/// or [`SpyTask::with_delay`] switch it to a spawned, deferred result.
#[derive(Debug)]
pub struct SpyTask {
    description: String,
    failure: Option<String>,
    delay: Option<Duration>,
    deferred: bool,
    log: Option<CallLog>,
    counters: Arc<SpyCounters>,
}

impl SpyTask {
    /// A spy that succeeds.
    pub fn succeeding(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            failure: None,
            delay: None,
            deferred: false,
            log: None,
            counters: Arc::new(SpyCounters::default()),
        }
    }

    /// A spy that fails with [`TaskError::ExecutionFailed`] carrying `message`.
    pub fn failing(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::succeeding(description)
        }
    }

    /// Report the result through a deferred signal instead of inline.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Sleep before reporting. Implies [`SpyTask::deferred`].
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.deferred = true;
        self
    }

    /// Record the description in `log` every time the spy starts.
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn handle(&self) -> SpyHandle {
        SpyHandle {
            counters: Arc::clone(&self.counters),
        }
    }

    fn result(&self) -> Result<(), TaskError> {
        match &self.failure {
            Some(message) => Err(TaskError::ExecutionFailed(message.clone())),
            None => Ok(()),
        }
    }
}

impl Task for SpyTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self) -> Outcome {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.record(&self.description);
        }

        if !self.deferred {
            self.counters.completions.fetch_add(1, Ordering::SeqCst);
            return Outcome::Immediate(self.result());
        }

        let result = self.result();
        let delay = self.delay;
        let counters = Arc::clone(&self.counters);
        Outcome::deferred(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            counters.completions.fetch_add(1, Ordering::SeqCst);
            result
        })
    }
}
