//! fleetops - composable task trees for orchestrating cloud fleet operations.
//!
//! A plan is a tree of [`Task`]s. Leaves do work (run a command, poll a
//! remote status), and [`TaskTree`] nodes run their children in order or
//! concurrently, flattening every failure into one error stream.

pub mod config;
pub mod core;
pub mod execution;
pub mod testing;
pub mod waiter;

pub use config::{ConfigError, PlanBuilder, PlanConfig, YamlLoader, load_plan};
pub use core::leaf::{AsyncCall, AsyncTask, Call, DeferredTask, GenericTask, SynchronousTask};
pub use core::task::{Outcome, ResultReceiver, ResultSignal, Task, TaskError, result_signal};
pub use core::tree::{ExecutionMode, TaskTree};
pub use core::types::RunId;
pub use execution::{CommandOutput, CommandStatus, CommandTask, CommandTaskBuilder};
pub use waiter::{
    Backoff, StatusClass, StatusClassifier, StatusSource, StatusWait, StatusWaitTask, WaitError,
    Waiter,
};
