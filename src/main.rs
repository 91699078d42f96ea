//! fleetops - run cloud fleet operation plans.
//!
//! Usage:
//!   fleetops run <plan.yaml>        Execute a plan
//!   fleetops run --dry-run <plan>   Show what would run without running it
//!   fleetops describe <plan.yaml>   Print the plan's task tree
//!   fleetops validate <plan.yaml>   Validate a plan file without running

use clap::{Parser, Subcommand};
use fleetops::{PlanBuilder, Task, YamlLoader};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// fleetops - composable task trees for cloud fleet operations
#[derive(Parser)]
#[command(name = "fleetops")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan
    Run {
        /// Path to the plan YAML file
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Build and describe the plan without executing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the task tree a plan builds
    Describe {
        /// Path to the plan YAML file
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },

    /// Validate a plan file without running it
    Validate {
        /// Path to the plan YAML file
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { plan, dry_run } => {
            run_plan(plan, dry_run).await?;
        }
        Commands::Describe { plan } => {
            describe_plan(plan)?;
        }
        Commands::Validate { plan } => {
            validate_plan(plan)?;
        }
    }

    Ok(())
}

/// Execute a plan, cancelling pending waits on Ctrl+C.
async fn run_plan(path: PathBuf, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading plan from: {}", path.display());

    let config = YamlLoader::load_plan(&path)?;
    let cancel = CancellationToken::new();
    let tree = PlanBuilder::new()
        .plan_mode(dry_run)
        .cancellation(cancel.clone())
        .build(&config)?;

    if dry_run {
        info!("Dry run of '{}'", config.name);
        println!("{}", tree.describe());
        return Ok(());
    }

    info!("Running '{}': {}", config.name, tree.describe());
    info!("Press Ctrl+C to cancel pending waits");

    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancelling pending waits...");
                cancel.cancel();
            }
        })
    };

    let started = Instant::now();
    let errors = tree.run_sync().await;
    watcher.abort();

    if errors.is_empty() {
        info!(
            "Plan '{}' completed successfully in {:?}",
            config.name,
            started.elapsed()
        );
        return Ok(());
    }

    for err in &errors {
        error!("  {}", err);
    }
    error!(
        "Plan '{}' failed after {:?} with {} error(s)",
        config.name,
        started.elapsed(),
        errors.len()
    );
    Err(format!("{} task(s) failed", errors.len()).into())
}

/// Print the task tree a plan builds.
fn describe_plan(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_plan(&path)?;
    let tree = PlanBuilder::new().build(&config)?;

    println!("Plan: {}", config.name);
    if let Some(description) = &config.description {
        println!("  Description: {}", description);
    }
    println!("  Mode: {}", tree.mode());
    println!("  Tasks: {}", tree.describe());
    Ok(())
}

/// Validate a plan file without running.
fn validate_plan(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating plan: {}", path.display());

    match YamlLoader::load_plan(&path) {
        Ok(config) => {
            info!("Plan '{}' is valid: {} root task(s)", config.name, config.tasks.len());
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}
