//! Plan file integration tests.
//!
//! Tests that verify the full pipeline from a YAML plan file to execution.

use crate::common::{messages, write_plan};
use fleetops::{ConfigError, PlanBuilder, Task, TaskError, YamlLoader, load_plan};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_plan_runs_steps_in_order() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("steps.log");
    let yaml = format!(
        r#"
name: rollout
defaults:
  environment:
    OUT: {}
tasks:
  - type: command
    description: first
    run: echo first >> "$OUT"
  - type: parallel
    tasks:
      - type: command
        run: echo second >> "$OUT"
  - type: command
    description: third
    run: echo third >> "$OUT"
"#,
        out.display()
    );
    let file = write_plan(&yaml);

    let tree = load_plan(file.path(), &PlanBuilder::new()).unwrap();
    let errors = tree.run_sync().await;

    assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
    let lines: Vec<String> = fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(lines, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_failing_command_halts_plan() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("never");
    let yaml = format!(
        r#"
name: halts
tasks:
  - type: command
    run: echo "quota exceeded" >&2; exit 3
  - type: command
    run: touch {}
"#,
        marker.display()
    );

    let config = YamlLoader::parse_plan(&yaml).unwrap();
    let tree = PlanBuilder::new().build(&config).unwrap();
    let errors = tree.run_sync().await;

    assert_eq!(errors.len(), 1);
    match &errors[0] {
        TaskError::CommandFailed { code, stderr } => {
            assert_eq!(*code, 3);
            assert_eq!(stderr, "quota exceeded");
        }
        other => panic!("expected CommandFailed, got {:?}", other),
    }
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_parallel_plan_reports_every_failure() {
    let yaml = r#"
name: fleet
mode: parallel
tasks:
  - type: command
    run: exit 1
  - type: command
    run: "true"
  - type: command
    run: exit 2
"#;
    let config = YamlLoader::parse_plan(yaml).unwrap();
    let tree = PlanBuilder::new().build(&config).unwrap();

    let mut codes: Vec<i32> = tree
        .run_sync()
        .await
        .iter()
        .map(|e| match e {
            TaskError::CommandFailed { code, .. } => *code,
            other => panic!("expected CommandFailed, got {:?}", other),
        })
        .collect();
    codes.sort();

    assert_eq!(codes, vec![1, 2]);
}

#[tokio::test]
async fn test_wait_step_polls_status_command() {
    let dir = TempDir::new().unwrap();
    let counter = dir.path().join("polls");
    // Reports CREATING twice, then ACTIVE.
    let yaml = format!(
        r#"
name: wait
tasks:
  - type: wait
    resource: cluster/staging
    status: echo x >> {path}; if [ $(wc -l < {path}) -ge 3 ]; then echo ACTIVE; else echo CREATING; fi
    success: [ACTIVE]
    failure: [FAILED]
    timeout_secs: 10
    backoff:
      kind: linear
      base_secs: 0.001
      step_secs: 0.001
      max_secs: 0.01
"#,
        path = counter.display()
    );

    let config = YamlLoader::parse_plan(&yaml).unwrap();
    let tree = PlanBuilder::new().build(&config).unwrap();
    let errors = tree.run_sync().await;

    assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);
}

#[tokio::test]
async fn test_wait_step_times_out() {
    let yaml = r#"
name: stuck
defaults:
  poll_interval_secs: 0.005
tasks:
  - type: wait
    resource: stack/app
    status: echo UPDATE_IN_PROGRESS
    timeout_secs: 0.05
"#;
    let config = YamlLoader::parse_plan(yaml).unwrap();
    let tree = PlanBuilder::new().build(&config).unwrap();

    let errors = tree.run_sync().await;

    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().starts_with("deadline exceeded"));
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("touched");
    let yaml = format!(
        r#"
name: dry
tasks:
  - type: command
    description: touch marker
    run: touch {}
"#,
        marker.display()
    );
    let file = write_plan(&yaml);

    let tree = load_plan(file.path(), &PlanBuilder::new().plan_mode(true)).unwrap();

    assert_eq!(tree.describe(), "(plan) 1 task: touch marker");
    assert!(tree.run_sync().await.is_empty());
    assert!(tree.execute().errors().await.is_empty());
    assert!(!marker.exists());
}

#[test]
fn test_invalid_plan_file_is_rejected() {
    let file = write_plan(
        r#"
name: broken
tasks:
  - type: wait
    status: echo x
    success: [done]
    failure: [DONE]
"#,
    );

    let result = load_plan(file.path(), &PlanBuilder::new());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_malformed_yaml_names_the_file() {
    let file = write_plan("name: [unclosed");

    let err = YamlLoader::load_plan(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::YamlFileError { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
