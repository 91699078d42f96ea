//! Task tree builder from plan configuration.
//!
//! This module converts a [`PlanConfig`] into a runnable [`TaskTree`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::tree::{ExecutionMode, TaskTree};
use crate::execution::{CommandStatus, CommandTask};
use crate::waiter::{Backoff, StatusClassifier, StatusWait, StatusWaitTask};

use super::error::ConfigError;
use super::yaml::{
    BackoffConfig, CommandStepConfig, DefaultsConfig, ModeConfig, PlanConfig, StepConfig,
    WaitStepConfig, YamlLoader,
};

/// Builds task trees from plan configuration.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    plan_mode: bool,
    cancel: CancellationToken,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every tree in the result as plan-only (dry run).
    pub fn plan_mode(mut self, plan_mode: bool) -> Self {
        self.plan_mode = plan_mode;
        self
    }

    /// Token that aborts every wait step in the plan.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the root tree of a plan.
    pub fn build(&self, config: &PlanConfig) -> Result<TaskTree, ConfigError> {
        YamlLoader::validate_plan(config)?;

        let tree = self.build_group(config.mode, false, &config.tasks, &config.defaults)?;
        debug!(
            plan = %config.name,
            tasks = tree.len(),
            plan_mode = self.plan_mode,
            "built plan"
        );
        Ok(tree)
    }

    fn build_group(
        &self,
        mode: ModeConfig,
        subtask: bool,
        steps: &[StepConfig],
        defaults: &DefaultsConfig,
    ) -> Result<TaskTree, ConfigError> {
        let mode = match mode {
            ModeConfig::Sequential => ExecutionMode::Sequential,
            ModeConfig::Parallel => ExecutionMode::Parallel,
        };
        let mut tree = TaskTree::new(mode)
            .with_plan_mode(self.plan_mode)
            .with_subtask(subtask);

        for step in steps {
            match step {
                StepConfig::Command(command) => {
                    tree.append(build_command(command, defaults)?);
                }
                StepConfig::Wait(wait) => {
                    tree.append(self.build_wait(wait, defaults)?);
                }
                StepConfig::Sequential(group) => {
                    tree.append(self.build_group(
                        ModeConfig::Sequential,
                        group.subtask,
                        &group.tasks,
                        defaults,
                    )?);
                }
                StepConfig::Parallel(group) => {
                    tree.append(self.build_group(
                        ModeConfig::Parallel,
                        group.subtask,
                        &group.tasks,
                        defaults,
                    )?);
                }
            }
        }

        Ok(tree)
    }

    fn build_wait(
        &self,
        config: &WaitStepConfig,
        defaults: &DefaultsConfig,
    ) -> Result<StatusWaitTask, ConfigError> {
        let resource = config
            .resource
            .clone()
            .unwrap_or_else(|| config.status.clone());
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("wait for {}", resource));

        let status_command = CommandTask::shell(&config.status)
            .envs(merge_env(&defaults.environment, &config.environment))
            .build();

        let backoff = match &config.backoff {
            Some(backoff) => build_backoff(backoff)?,
            None => Backoff::constant(secs(defaults.poll_interval_secs)?),
        };
        let timeout = secs(config.timeout_secs.unwrap_or(defaults.timeout_secs))?;

        let wait = StatusWait::new(
            StatusClassifier::new(&config.success, &config.failure),
            backoff,
            timeout,
        );

        Ok(StatusWaitTask::new(
            description,
            Arc::new(CommandStatus::new(resource, status_command)),
            wait,
        )
        .with_cancellation(self.cancel.clone()))
    }
}

fn build_command(
    config: &CommandStepConfig,
    defaults: &DefaultsConfig,
) -> Result<CommandTask, ConfigError> {
    let mut builder = CommandTask::shell(&config.run)
        .envs(merge_env(&defaults.environment, &config.environment));

    if let Some(description) = &config.description {
        builder = builder.description(description);
    }
    if let Some(dir) = &config.working_dir {
        builder = builder.working_dir(dir);
    }
    if let Some(timeout) = config.timeout_secs {
        builder = builder.timeout(secs(timeout)?);
    }

    Ok(builder.build())
}

fn build_backoff(config: &BackoffConfig) -> Result<Backoff, ConfigError> {
    let backoff = match config {
        BackoffConfig::Constant { interval_secs } => Backoff::constant(secs(*interval_secs)?),
        BackoffConfig::Linear {
            base_secs,
            step_secs,
            max_secs,
        } => Backoff::linear(secs(*base_secs)?, secs(*step_secs)?, secs(*max_secs)?),
        BackoffConfig::Exponential {
            base_secs,
            multiplier,
            max_secs,
        } => Backoff::exponential(secs(*base_secs)?, *multiplier, secs(*max_secs)?),
    };
    Ok(backoff)
}

/// Step variables override plan defaults.
fn merge_env(
    defaults: &HashMap<String, String>,
    step: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = defaults.clone();
    env.extend(step.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn secs(value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid duration {}: {}", value, e)))
}

/// Load a plan file and build its task tree.
pub fn load_plan(path: impl AsRef<Path>, builder: &PlanBuilder) -> Result<TaskTree, ConfigError> {
    let config = YamlLoader::load_plan(path)?;
    builder.build(&config)
}
