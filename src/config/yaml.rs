//! YAML plan file parsing.
//!
//! A plan file describes one fleet operation as a tree of steps:
//!
//! ```yaml
//! name: provision-staging
//! mode: sequential
//! defaults:
//!   poll_interval_secs: 5
//!   timeout_secs: 600
//! tasks:
//!   - type: command
//!     description: create network
//!     run: ./bin/create-vpc staging
//!   - type: parallel
//!     tasks:
//!       - type: command
//!         run: ./bin/create-cluster a
//!       - type: wait
//!         resource: cluster/a
//!         status: ./bin/cluster-status a
//!         success: [ACTIVE]
//!         failure: [FAILED]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::error::ConfigError;

/// Top-level plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Plan name, used in logs.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Execution mode of the root tree.
    #[serde(default)]
    pub mode: ModeConfig,
    /// Defaults applied to every step.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Root steps.
    #[serde(default)]
    pub tasks: Vec<StepConfig>,
}

/// Execution mode of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeConfig {
    #[default]
    Sequential,
    Parallel,
}

/// Plan-wide defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Constant poll interval for wait steps without their own backoff.
    pub poll_interval_secs: f64,
    /// Deadline for wait steps without their own timeout.
    pub timeout_secs: f64,
    /// Environment variables passed to every command.
    pub environment: HashMap<String, String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5.0,
            timeout_secs: 600.0,
            environment: HashMap::new(),
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Run a shell command.
    Command(CommandStepConfig),
    /// Poll a status command until the resource settles.
    Wait(WaitStepConfig),
    /// Nested group whose steps run in order.
    Sequential(GroupConfig),
    /// Nested group whose steps run concurrently.
    Parallel(GroupConfig),
}

/// Shell command step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStepConfig {
    /// Human-readable summary; defaults to the command line.
    pub description: Option<String>,
    /// Command line, run with `sh -c`.
    pub run: String,
    /// Environment variables for this step (override plan defaults).
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<f64>,
}

/// Status polling step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitStepConfig {
    /// Human-readable summary; defaults to "wait for <resource>".
    pub description: Option<String>,
    /// Resource name used in logs and errors; defaults to the status command.
    pub resource: Option<String>,
    /// Command whose trimmed stdout is the current status.
    pub status: String,
    /// Status values meaning done.
    #[serde(default = "default_success")]
    pub success: Vec<String>,
    /// Status values meaning permanently failed.
    #[serde(default = "default_failure")]
    pub failure: Vec<String>,
    /// Delay schedule; defaults to a constant `poll_interval_secs`.
    pub backoff: Option<BackoffConfig>,
    /// Deadline in seconds; defaults to `defaults.timeout_secs`.
    pub timeout_secs: Option<f64>,
    /// Environment variables for the status command.
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_success() -> Vec<String> {
    vec!["successful".to_string()]
}

fn default_failure() -> Vec<String> {
    vec!["failed".to_string(), "cancelled".to_string()]
}

/// Nested group of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Render a single-step group as just that step.
    #[serde(default)]
    pub subtask: bool,
    #[serde(default)]
    pub tasks: Vec<StepConfig>,
}

/// Delay schedule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Constant {
        interval_secs: f64,
    },
    Linear {
        base_secs: f64,
        step_secs: f64,
        max_secs: f64,
    },
    Exponential {
        base_secs: f64,
        multiplier: f64,
        max_secs: f64,
    },
}

/// YAML plan loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a plan from a file.
    pub fn load_plan(path: impl AsRef<Path>) -> Result<PlanConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: PlanConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_plan(&config)?;
        Ok(config)
    }

    /// Parse and validate a plan from a YAML string.
    pub fn parse_plan(yaml: &str) -> Result<PlanConfig, ConfigError> {
        let config: PlanConfig = serde_yaml::from_str(yaml)?;
        Self::validate_plan(&config)?;
        Ok(config)
    }

    /// Validate a plan configuration.
    pub fn validate_plan(config: &PlanConfig) -> Result<(), ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }

        check_secs("defaults.poll_interval_secs", config.defaults.poll_interval_secs)?;
        check_positive_secs("defaults.timeout_secs", config.defaults.timeout_secs)?;

        validate_steps("tasks", &config.tasks)
    }
}

fn validate_steps(path: &str, steps: &[StepConfig]) -> Result<(), ConfigError> {
    for (index, step) in steps.iter().enumerate() {
        let path = format!("{}[{}]", path, index);
        match step {
            StepConfig::Command(command) => validate_command(&path, command)?,
            StepConfig::Wait(wait) => validate_wait(&path, wait)?,
            StepConfig::Sequential(group) | StepConfig::Parallel(group) => {
                validate_steps(&format!("{}.tasks", path), &group.tasks)?
            }
        }
    }
    Ok(())
}

fn validate_command(path: &str, command: &CommandStepConfig) -> Result<(), ConfigError> {
    if command.run.trim().is_empty() {
        return Err(ConfigError::MissingField(format!("{}.run", path)));
    }
    if let Some(timeout) = command.timeout_secs {
        check_positive_secs(&format!("{}.timeout_secs", path), timeout)?;
    }
    Ok(())
}

fn validate_wait(path: &str, wait: &WaitStepConfig) -> Result<(), ConfigError> {
    if wait.status.trim().is_empty() {
        return Err(ConfigError::MissingField(format!("{}.status", path)));
    }
    if wait.success.is_empty() {
        return Err(ConfigError::InvalidConfig(format!(
            "{}.success must list at least one status",
            path
        )));
    }

    let success: HashSet<String> = wait.success.iter().map(|s| s.trim().to_lowercase()).collect();
    if let Some(overlap) = wait
        .failure
        .iter()
        .find(|s| success.contains(&s.trim().to_lowercase()))
    {
        return Err(ConfigError::InvalidConfig(format!(
            "{}: status '{}' is listed as both success and failure",
            path, overlap
        )));
    }

    if let Some(timeout) = wait.timeout_secs {
        check_positive_secs(&format!("{}.timeout_secs", path), timeout)?;
    }
    if let Some(backoff) = &wait.backoff {
        validate_backoff(&format!("{}.backoff", path), backoff)?;
    }
    Ok(())
}

fn validate_backoff(path: &str, backoff: &BackoffConfig) -> Result<(), ConfigError> {
    match backoff {
        BackoffConfig::Constant { interval_secs } => {
            check_secs(&format!("{}.interval_secs", path), *interval_secs)
        }
        BackoffConfig::Linear {
            base_secs,
            step_secs,
            max_secs,
        } => {
            check_secs(&format!("{}.base_secs", path), *base_secs)?;
            check_secs(&format!("{}.step_secs", path), *step_secs)?;
            check_secs(&format!("{}.max_secs", path), *max_secs)?;
            check_cap(path, *base_secs, *max_secs)
        }
        BackoffConfig::Exponential {
            base_secs,
            multiplier,
            max_secs,
        } => {
            check_secs(&format!("{}.base_secs", path), *base_secs)?;
            check_secs(&format!("{}.max_secs", path), *max_secs)?;
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{}.multiplier must be at least 1.0",
                    path
                )));
            }
            check_cap(path, *base_secs, *max_secs)
        }
    }
}

fn check_secs(field: &str, secs: f64) -> Result<(), ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidConfig(format!(
            "{} must be a non-negative number of seconds",
            field
        )));
    }
    Ok(())
}

fn check_positive_secs(field: &str, secs: f64) -> Result<(), ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidConfig(format!(
            "{} must be greater than zero",
            field
        )));
    }
    Ok(())
}

fn check_cap(path: &str, base_secs: f64, max_secs: f64) -> Result<(), ConfigError> {
    if max_secs < base_secs {
        return Err(ConfigError::InvalidConfig(format!(
            "{}.max_secs must not be smaller than base_secs",
            path
        )));
    }
    Ok(())
}
