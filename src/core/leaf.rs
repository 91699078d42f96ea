//! Leaf adapters: wrap plain fallible calls into the [`Task`] contract.
//!
//! - [`GenericTask`] and [`SynchronousTask`] run their call inline and always
//!   report through [`Outcome::Immediate`].
//! - [`AsyncTask`] and [`DeferredTask`] spawn their call on the tokio runtime
//!   and always report through [`Outcome::Deferred`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::task::{Outcome, Task, TaskError};

/// A description plus a synchronous fallible closure.
///
/// ```
/// use fleetops::{GenericTask, Task};
///
/// let task = GenericTask::new("tag subnet", || Ok(()));
/// assert_eq!(task.describe(), "tag subnet");
/// ```
pub struct GenericTask {
    description: String,
    func: Box<dyn Fn() -> Result<(), TaskError> + Send + Sync>,
}

impl GenericTask {
    pub fn new<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for GenericTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericTask")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Task for GenericTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self) -> Outcome {
        Outcome::Immediate((self.func)())
    }
}

/// A synchronous capability that can describe itself and be called once.
pub trait Call: Send + Sync {
    fn describe(&self) -> String;

    fn call(&self) -> Result<(), TaskError>;
}

/// Adapts a [`Call`] into a [`Task`]. Behaves exactly like [`GenericTask`].
#[derive(Debug)]
pub struct SynchronousTask<C> {
    inner: C,
}

impl<C: Call> SynchronousTask<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Call> Task for SynchronousTask<C> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn execute(&self) -> Outcome {
        Outcome::Immediate(self.inner.call())
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
type AsyncFn = dyn Fn() -> TaskFuture + Send + Sync;

/// A description plus an async closure, run on its own tokio task.
///
/// Use this for anything that talks to a remote API or waits on remote
/// state, so parallel siblings do not block each other.
pub struct AsyncTask {
    description: String,
    func: Arc<AsyncFn>,
}

impl AsyncTask {
    pub fn new<F, Fut>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            description: description.into(),
            func: Arc::new(move || -> TaskFuture { Box::pin(func()) }),
        }
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Task for AsyncTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self) -> Outcome {
        Outcome::deferred((self.func)())
    }
}

/// An asynchronous capability that can describe itself and be called.
#[async_trait]
pub trait AsyncCall: Send + Sync + 'static {
    fn describe(&self) -> String;

    async fn call(&self) -> Result<(), TaskError>;
}

/// Adapts an [`AsyncCall`] into a [`Task`]. Behaves exactly like [`AsyncTask`].
pub struct DeferredTask<C> {
    inner: Arc<C>,
}

impl<C: AsyncCall> DeferredTask<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: AsyncCall> Task for DeferredTask<C> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn execute(&self) -> Outcome {
        let inner = Arc::clone(&self.inner);
        Outcome::deferred(async move { inner.call().await })
    }
}
