//! Task tree integration tests.
//!
//! Tests that verify how sequential, parallel, and nested trees run their
//! children and report failures.

use crate::common::messages;
use fleetops::testing::{CallLog, SpyTask};
use fleetops::{AsyncTask, ExecutionMode, GenericTask, Outcome, Task, TaskError, TaskTree};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_empty_tree_reports_nothing_in_any_mode() {
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        for plan_mode in [false, true] {
            let tree = TaskTree::new(mode).with_plan_mode(plan_mode);

            assert!(tree.run_sync().await.is_empty());

            let outcome = tree.execute();
            assert!(matches!(outcome, Outcome::Deferred(_)));
            assert!(outcome.errors().await.is_empty());
        }
    }
}

#[tokio::test]
async fn test_plan_mode_never_invokes_children() {
    let first = SpyTask::succeeding("create vpc");
    let second = SpyTask::failing("create cluster", "quota exceeded").deferred();
    let handles = [first.handle(), second.handle()];

    let mut inner = TaskTree::parallel().with_plan_mode(true);
    inner.append(second);
    let mut tree = TaskTree::sequential().with_plan_mode(true);
    tree.append(first).append(inner);

    assert!(tree.run_sync().await.is_empty());
    assert!(tree.execute().errors().await.is_empty());

    for handle in &handles {
        assert_eq!(handle.calls(), 0);
    }
}

#[tokio::test]
async fn test_sequential_stops_at_first_failure() {
    let log = CallLog::new();
    let t1 = SpyTask::succeeding("T1").with_log(&log);
    let t2 = SpyTask::failing("T2", "E").deferred().with_log(&log);
    let t3 = SpyTask::succeeding("T3").with_log(&log);
    let t3_handle = t3.handle();

    let mut tree = TaskTree::sequential();
    tree.append(t1).append(t2).append(t3);

    let errors = tree.run_sync().await;

    assert_eq!(messages(&errors), vec!["execution failed: E"]);
    assert_eq!(log.entries(), vec!["T1", "T2"]);
    assert_eq!(t3_handle.calls(), 0);
}

#[tokio::test]
async fn test_sequential_runs_children_in_order() {
    let log = CallLog::new();
    let mut tree = TaskTree::sequential();
    // Earlier children are slower; order must still hold.
    tree.append(
        SpyTask::succeeding("a")
            .with_delay(Duration::from_millis(30))
            .with_log(&log),
    )
    .append(
        SpyTask::succeeding("b")
            .with_delay(Duration::from_millis(10))
            .with_log(&log),
    )
    .append(SpyTask::succeeding("c").with_log(&log));

    assert!(tree.run_sync().await.is_empty());
    assert_eq!(log.entries(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_parallel_collects_every_failure() {
    let t1 = SpyTask::failing("T1", "E1").with_delay(Duration::from_millis(10));
    let t2 = SpyTask::failing("T2", "E2").with_delay(Duration::from_millis(40));
    let (h1, h2) = (t1.handle(), t2.handle());

    let mut tree = TaskTree::parallel();
    tree.append(t1).append(t2);

    let errors = tree.run_sync().await;

    // Completion order: the faster failure arrives first.
    assert_eq!(
        messages(&errors),
        vec!["execution failed: E1", "execution failed: E2"]
    );
    assert_eq!(h1.completions(), 1);
    assert_eq!(h2.completions(), 1);
}

#[tokio::test]
async fn test_parallel_children_overlap() {
    let mut tree = TaskTree::parallel();
    for name in ["us-east-1", "eu-west-1", "ap-south-1", "sa-east-1"] {
        tree.append(SpyTask::succeeding(name).with_delay(Duration::from_millis(100)));
    }

    let start = Instant::now();
    let errors = tree.run_sync().await;
    let elapsed = start.elapsed();

    assert!(errors.is_empty());
    // Sequentially this would take at least 400ms.
    assert!(elapsed < Duration::from_millis(300), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_nested_failure_halts_outer_sequence() {
    let a = SpyTask::succeeding("A");
    let b = SpyTask::failing("B", "E").deferred();
    let c = SpyTask::succeeding("C");
    let (a_handle, c_handle) = (a.handle(), c.handle());

    let mut inner = TaskTree::sequential();
    inner.append(a).append(b);
    let mut outer = TaskTree::sequential();
    outer.append(inner).append(c);

    let errors = outer.run_sync().await;

    assert_eq!(messages(&errors), vec!["execution failed: E"]);
    assert_eq!(a_handle.calls(), 1);
    assert_eq!(c_handle.calls(), 0);
}

#[tokio::test]
async fn test_parallel_subtrees_flatten_errors() {
    let mut left = TaskTree::parallel();
    left.append(SpyTask::failing("l1", "left-1"))
        .append(SpyTask::failing("l2", "left-2").deferred());
    let mut right = TaskTree::sequential();
    right
        .append(SpyTask::succeeding("r1"))
        .append(SpyTask::failing("r2", "right"));

    let mut fleet = TaskTree::parallel();
    fleet.append(left).append(right);

    let mut errors = messages(&fleet.run_sync().await);
    errors.sort();

    assert_eq!(
        errors,
        vec![
            "execution failed: left-1",
            "execution failed: left-2",
            "execution failed: right",
        ]
    );
}

#[tokio::test]
async fn test_mixed_leaf_kinds() {
    let mut tree = TaskTree::sequential();
    tree.append(GenericTask::new("inline", || Ok(())))
        .append(AsyncTask::new("spawned", || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(TaskError::failed("remote rejected request"))
        }));

    let errors = tree.run_sync().await;

    assert_eq!(
        messages(&errors),
        vec!["execution failed: remote rejected request"]
    );
}

#[tokio::test]
async fn test_panicking_child_is_reported() {
    let mut tree = TaskTree::parallel();
    tree.append(AsyncTask::new("explodes", || async { panic!("boom") }))
        .append(SpyTask::succeeding("fine"));

    let errors = tree.run_sync().await;

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], TaskError::Panicked(_)));
}

#[test]
fn test_describe_formats() {
    assert_eq!(TaskTree::sequential().describe(), "no tasks");
    assert_eq!(
        TaskTree::parallel().with_plan_mode(true).describe(),
        "(plan) no tasks"
    );

    let single = TaskTree::sequential()
        .with_subtask(true)
        .with_task(SpyTask::succeeding("delete stack"));
    assert_eq!(single.describe(), "delete stack");

    let top = TaskTree::sequential().with_task(SpyTask::succeeding("delete stack"));
    assert_eq!(top.describe(), "1 task: delete stack");

    let fleet = TaskTree::parallel()
        .with_plan_mode(true)
        .with_task(SpyTask::succeeding("a"))
        .with_task(single);
    assert_eq!(fleet.describe(), "(plan) 2 parallel tasks: a, delete stack");
}
