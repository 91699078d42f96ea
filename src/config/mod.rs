//! Plan file loading and parsing.
//!
//! This module provides YAML plan files and turns them into task trees.

mod builder;
mod error;
mod yaml;

pub use builder::{PlanBuilder, load_plan};
pub use error::ConfigError;
pub use yaml::{
    BackoffConfig, CommandStepConfig, DefaultsConfig, GroupConfig, ModeConfig, PlanConfig,
    StepConfig, WaitStepConfig, YamlLoader,
};
