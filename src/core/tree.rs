//! Composite task scheduler.
//!
//! A [`TaskTree`] holds an ordered list of child tasks and runs them either
//! sequentially (fail-fast) or in parallel (continue-on-error). A tree is
//! itself a [`Task`], so trees nest freely: a parallel tree of sequential
//! subtrees runs independent cloud operations concurrently while each branch
//! stops at its own first failure.
//!
//! Plan mode turns a tree into a dry run: nothing executes and no errors are
//! reported. The flag applies only to the node it is set on; callers that
//! want a dry run of a whole hierarchy set it on every subtree.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span, warn};

use super::task::{Outcome, ResultReceiver, ResultSignal, Task, TaskError, result_signal};
use super::types::RunId;

/// How a tree schedules its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Children run one after another in insertion order; the first failure
    /// stops the tree.
    #[default]
    Sequential,
    /// Every child runs on its own tokio task; failures never cancel
    /// siblings.
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composite task executing its children in parallel or in sequence.
///
/// # Example
///
/// ```
/// use fleetops::{GenericTask, TaskError, TaskTree};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut per_cluster = TaskTree::sequential();
/// per_cluster
///     .append(GenericTask::new("create role", || Ok(())))
///     .append(GenericTask::new("attach policy", || {
///         Err(TaskError::failed("policy not found"))
///     }));
///
/// let mut fleet = TaskTree::parallel();
/// fleet.append(per_cluster);
///
/// let errors = fleet.run_sync().await;
/// assert_eq!(errors.len(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct TaskTree {
    tasks: Vec<Arc<dyn Task>>,
    mode: ExecutionMode,
    plan_mode: bool,
    is_subtask: bool,
}

impl TaskTree {
    /// Create an empty tree with the given execution mode.
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            tasks: Vec::new(),
            mode,
            plan_mode: false,
            is_subtask: false,
        }
    }

    /// Create an empty sequential tree.
    pub fn sequential() -> Self {
        Self::new(ExecutionMode::Sequential)
    }

    /// Create an empty parallel tree.
    pub fn parallel() -> Self {
        Self::new(ExecutionMode::Parallel)
    }

    /// Builder: set plan (dry-run) mode on this node only.
    pub fn with_plan_mode(mut self, plan_mode: bool) -> Self {
        self.plan_mode = plan_mode;
        self
    }

    /// Builder: mark this tree as nested, which shortens its description.
    pub fn with_subtask(mut self, is_subtask: bool) -> Self {
        self.is_subtask = is_subtask;
        self
    }

    pub fn set_plan_mode(&mut self, plan_mode: bool) {
        self.plan_mode = plan_mode;
    }

    pub fn set_subtask(&mut self, is_subtask: bool) {
        self.is_subtask = is_subtask;
    }

    /// Append a child task. The tree takes ownership of it.
    pub fn append<T: Task + 'static>(&mut self, task: T) -> &mut Self {
        self.tasks.push(Arc::new(task));
        self
    }

    /// Append an already boxed child task.
    pub fn append_boxed(&mut self, task: Box<dyn Task>) -> &mut Self {
        self.tasks.push(Arc::from(task));
        self
    }

    /// Append several boxed child tasks, keeping their order.
    pub fn extend<I>(&mut self, tasks: I) -> &mut Self
    where
        I: IntoIterator<Item = Box<dyn Task>>,
    {
        self.tasks.extend(tasks.into_iter().map(Arc::from));
        self
    }

    /// Builder form of [`TaskTree::append`].
    pub fn with_task<T: Task + 'static>(mut self, task: T) -> Self {
        self.append(task);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_plan_mode(&self) -> bool {
        self.plan_mode
    }

    pub fn is_subtask(&self) -> bool {
        self.is_subtask
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn skips_execution(&self) -> bool {
        self.tasks.is_empty() || self.plan_mode
    }

    /// Run the tree to completion and return every error it produced.
    ///
    /// Empty and plan-mode trees return an empty list without touching any
    /// child. A sequential tree returns at most the first failure; a
    /// parallel tree returns all failures in completion order. Errors from
    /// nested trees are flattened into the same list.
    pub async fn run_sync(&self) -> Vec<TaskError> {
        if self.skips_execution() {
            debug!(plan_mode = self.plan_mode, "skipping task tree execution");
            return Vec::new();
        }
        self.start().collect().await
    }

    /// Spawn the tree's execution and return its error stream.
    fn start(&self) -> ResultReceiver {
        let (signal, receiver) = result_signal();
        let tasks = self.tasks.clone();
        let mode = self.mode;
        let run_id = RunId::new();

        let span = info_span!(
            "task_tree",
            run = %run_id,
            mode = %mode,
            tasks = tasks.len(),
        );

        tokio::spawn(async move {
            let driver = {
                let signal = signal.clone();
                tokio::spawn(
                    async move {
                        debug!("starting task tree");
                        match mode {
                            ExecutionMode::Sequential => run_sequential(tasks, &signal).await,
                            ExecutionMode::Parallel => run_parallel(tasks, &signal).await,
                        }
                        debug!("task tree finished");
                    }
                    .instrument(span),
                )
            };

            if let Err(join_err) = driver.await {
                signal.forward(TaskError::Panicked(join_err.to_string()));
            }
            // Dropping the last signal closes the caller's stream.
        });

        receiver
    }
}

impl fmt::Debug for TaskTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTree")
            .field("tasks", &self.tasks.len())
            .field("mode", &self.mode)
            .field("plan_mode", &self.plan_mode)
            .field("is_subtask", &self.is_subtask)
            .finish()
    }
}

impl Task for TaskTree {
    fn describe(&self) -> String {
        let body = match self.tasks.as_slice() {
            [] => "no tasks".to_string(),
            [only] if self.is_subtask => only.describe(),
            [only] => format!("1 task: {}", only.describe()),
            tasks => {
                let parts: Vec<String> = tasks.iter().map(|t| t.describe()).collect();
                format!("{} {} tasks: {}", tasks.len(), self.mode, parts.join(", "))
            }
        };

        if self.plan_mode {
            format!("(plan) {}", body)
        } else {
            body
        }
    }

    fn execute(&self) -> Outcome {
        if self.skips_execution() {
            return Outcome::Deferred(ResultReceiver::closed());
        }
        Outcome::Deferred(self.start())
    }
}

/// Run one child and relay its errors. Returns `true` on success.
async fn run_one(task: &dyn Task, signal: &ResultSignal) -> bool {
    let description = task.describe();
    debug!(task = %description, "starting task");

    let succeeded = match task.execute() {
        Outcome::Immediate(Ok(())) => true,
        Outcome::Immediate(Err(err)) => {
            warn!(task = %description, error = %err, "task failed");
            signal.forward(err);
            false
        }
        Outcome::Deferred(mut receiver) => {
            let mut succeeded = true;
            while let Some(err) = receiver.recv().await {
                warn!(task = %description, error = %err, "task failed");
                signal.forward(err);
                succeeded = false;
            }
            succeeded
        }
    };

    if succeeded {
        debug!(task = %description, "task finished");
    }
    succeeded
}

async fn run_sequential(tasks: Vec<Arc<dyn Task>>, signal: &ResultSignal) {
    let total = tasks.len();
    for (index, task) in tasks.iter().enumerate() {
        if !run_one(task.as_ref(), signal).await {
            debug!(
                skipped = total - index - 1,
                "halting sequential tree after failure"
            );
            break;
        }
    }
}

async fn run_parallel(tasks: Vec<Arc<dyn Task>>, signal: &ResultSignal) {
    let mut branches = JoinSet::new();
    for task in tasks {
        let signal = signal.clone();
        branches.spawn(
            async move {
                run_one(task.as_ref(), &signal).await;
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = branches.join_next().await {
        if let Err(join_err) = joined {
            signal.forward(TaskError::Panicked(join_err.to_string()));
        }
    }
}
