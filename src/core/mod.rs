//! Core orchestration types: the task contract, leaf adapters, and the
//! composite task tree.

pub mod leaf;
pub mod task;
pub mod tree;
pub mod types;
