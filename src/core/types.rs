//! Identifier types used when tracing task tree executions.

use std::fmt;
use uuid::Uuid;

/// Unique identifier for one execution of a task tree.
///
/// A fresh id is minted every time a non-empty tree starts, so nested trees
/// get their own spans in the logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
