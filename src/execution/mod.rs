//! Leaves that reach outside the process.
//!
//! This module provides external command execution, both as a task in a
//! tree and as a status source for the polling waiter.

mod command;

pub use command::{CommandOutput, CommandStatus, CommandTask, CommandTaskBuilder};
