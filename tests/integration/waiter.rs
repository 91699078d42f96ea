//! Waiter integration tests.
//!
//! Tests that verify polling remote status inside task trees.

use async_trait::async_trait;
use fleetops::{
    Backoff, StatusClassifier, StatusSource, StatusWait, StatusWaitTask, TaskError, TaskTree,
    WaitError, Waiter,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A fake control plane resource that walks through a list of states.
struct FakeResource {
    name: &'static str,
    states: Mutex<Vec<&'static str>>,
    queries: AtomicU32,
}

impl FakeResource {
    fn new(name: &'static str, states: &[&'static str]) -> Arc<Self> {
        let mut states = states.to_vec();
        states.reverse();
        Arc::new(Self {
            name,
            states: Mutex::new(states),
            queries: AtomicU32::new(0),
        })
    }

    fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for FakeResource {
    fn resource(&self) -> String {
        self.name.to_string()
    }

    async fn status(&self) -> Result<String, TaskError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop().unwrap()
        } else {
            states[0]
        };
        Ok(state.to_string())
    }
}

fn quick(success: &[&str], failure: &[&str], timeout: Duration) -> StatusWait {
    StatusWait::new(
        StatusClassifier::new(success, failure),
        Backoff::constant(Duration::from_millis(2)),
        timeout,
    )
}

#[tokio::test]
async fn test_waiter_succeeds_on_third_poll() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let waiter = Waiter::new(
        |attempt| Duration::from_millis(5 * attempt as u64),
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, WaitError>(n == 3) }
        },
    );

    let start = Instant::now();
    let result = waiter.run(&CancellationToken::new()).await;

    assert_eq!(result, Ok(()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 5ms + 10ms + 15ms
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_waiter_timeout_with_task_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let waiter = Waiter::with_backoff(Backoff::constant(Duration::from_millis(1)), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, TaskError>(false) }
    });

    let start = Instant::now();
    let result = waiter.run_with_timeout(Duration::from_millis(10)).await;

    assert!(matches!(
        result,
        Err(TaskError::Wait(WaitError::DeadlineExceeded(_)))
    ));
    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_parallel_waits_settle_independently() {
    let ready = FakeResource::new("cluster/a", &["CREATING", "CREATING", "ACTIVE"]);
    let broken = FakeResource::new("cluster/b", &["CREATING", "FAILED"]);

    let mut fleet = TaskTree::parallel();
    fleet
        .append(StatusWaitTask::new(
            "wait for cluster/a",
            ready.clone(),
            quick(&["ACTIVE"], &["FAILED"], Duration::from_secs(2)),
        ))
        .append(StatusWaitTask::new(
            "wait for cluster/b",
            broken.clone(),
            quick(&["ACTIVE"], &["FAILED"], Duration::from_secs(2)),
        ));

    let errors = fleet.run_sync().await;

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        "cluster/b reached terminal status 'FAILED'"
    );
    assert_eq!(ready.queries(), 3);
    assert_eq!(broken.queries(), 2);
}

#[tokio::test]
async fn test_wait_gates_following_step() {
    let stack = FakeResource::new("stack/app", &["UPDATE_IN_PROGRESS"]);
    let follow_up = fleetops::testing::SpyTask::succeeding("switch traffic");
    let follow_up_handle = follow_up.handle();

    let mut rollout = TaskTree::sequential();
    rollout
        .append(StatusWaitTask::new(
            "wait for stack/app",
            stack,
            quick(&["UPDATE_COMPLETE"], &[], Duration::from_millis(20)),
        ))
        .append(follow_up);

    let errors = rollout.run_sync().await;

    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_wait_error());
    assert_eq!(follow_up_handle.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_every_wait() {
    let cancel = CancellationToken::new();
    let slow = StatusWait::new(
        StatusClassifier::default(),
        Backoff::constant(Duration::from_secs(30)),
        Duration::from_secs(600),
    );

    let mut fleet = TaskTree::parallel();
    for name in ["vm/1", "vm/2", "vm/3"] {
        fleet.append(
            StatusWaitTask::new(name, FakeResource::new(name, &["pending"]), slow.clone())
                .with_cancellation(cancel.clone()),
        );
    }

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let errors = fleet.run_sync().await;

    assert_eq!(errors.len(), 3);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, TaskError::Wait(WaitError::Cancelled)))
    );
    assert!(start.elapsed() < Duration::from_secs(5));
}
