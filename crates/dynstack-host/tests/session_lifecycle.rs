//! Integration tests for the session lifecycle.
//!
//! Runs drive the real yard engine through a thin wrapper that counts the
//! schedules handed to it. Paced runs use tokio's paused clock, so
//! simulated hours pass in milliseconds of wall time.

#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dynstack_core::clock::Pacing;
use dynstack_core::engine::{
    EngineError, RunOutcome, SimulationEngine, WorldListener, WorldSource, YardSimulation,
};
use dynstack_core::policy::{CranePolicy, RuleBasedPolicy};
use dynstack_host::capabilities::{
    HostCapabilities, OutboundQueue, OutboundReceiver, RemotePolicyConnector,
    TracingSessionLogger,
};
use dynstack_host::ingest::{DEFAULT_SCHEDULE_DELAY, IngestOutcome};
use dynstack_host::resolver::{PresetStore, SettingsResolver};
use dynstack_host::session::{
    EngineFactory, RunMode, SessionController, SessionError, SessionOptions,
};
use dynstack_types::{CraneSchedule, PolicyMode, SessionId, SessionState, Settings, World};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Yard engine that counts every schedule handed to it.
struct CountingEngine {
    inner: YardSimulation,
    applied: Arc<AtomicUsize>,
}

impl WorldSource for CountingEngine {
    fn snapshot(&self) -> World {
        self.inner.snapshot()
    }
}

impl SimulationEngine for CountingEngine {
    fn run(&self) -> impl Future<Output = Result<RunOutcome, EngineError>> + Send {
        self.inner.run()
    }

    fn run_blocking(&self) -> Result<RunOutcome, EngineError> {
        self.inner.run_blocking()
    }

    fn stop(&self) -> impl Future<Output = ()> + Send {
        self.inner.stop()
    }

    fn apply_schedule(
        &self,
        schedule: CraneSchedule,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_schedule(schedule)
    }

    fn subscribe(&self, listener: Arc<dyn WorldListener>) {
        self.inner.subscribe(listener);
    }
}

#[derive(Default)]
struct CountingFactory {
    applied: Arc<AtomicUsize>,
}

impl EngineFactory for CountingFactory {
    type Engine = CountingEngine;

    fn create(
        &self,
        settings: Settings,
        policy: Option<Box<dyn CranePolicy>>,
        pacing: Pacing,
    ) -> Result<CountingEngine, EngineError> {
        Ok(CountingEngine {
            inner: YardSimulation::new(settings, policy, pacing)?,
            applied: Arc::clone(&self.applied),
        })
    }
}

/// Connector that hands out the embedded rule-based policy and records
/// every connection request.
#[derive(Default)]
struct RecordingConnector {
    requests: Mutex<Vec<(String, SessionId)>>,
}

impl RemotePolicyConnector for RecordingConnector {
    fn connect(
        &self,
        address: &str,
        session_id: SessionId,
    ) -> Result<Box<dyn CranePolicy>, SessionError> {
        self.requests
            .lock()
            .unwrap()
            .push((address.to_owned(), session_id));
        Ok(Box::new(RuleBasedPolicy::new()))
    }
}

struct Harness {
    controller: Arc<SessionController<CountingFactory>>,
    applied: Arc<AtomicUsize>,
    connector: Arc<RecordingConnector>,
    outbound: OutboundReceiver,
}

fn harness(time_scale: f64) -> Harness {
    let factory = CountingFactory::default();
    let applied = Arc::clone(&factory.applied);
    let connector = Arc::new(RecordingConnector::default());
    let (queue, outbound) = OutboundQueue::new();
    let capabilities = HostCapabilities {
        outbound: Arc::new(queue),
        logger: Arc::new(TracingSessionLogger),
        remote: Arc::clone(&connector) as Arc<dyn RemotePolicyConnector>,
    };
    let resolver = SettingsResolver::new(PresetStore::builtin().unwrap());
    let options = SessionOptions {
        schedule_delay: DEFAULT_SCHEDULE_DELAY,
        time_scale,
    };
    Harness {
        controller: Arc::new(SessionController::new(
            factory,
            resolver,
            capabilities,
            options,
        )),
        applied,
        connector,
        outbound,
    }
}

fn baseline(controller: &SessionController<CountingFactory>) -> Vec<u8> {
    controller.default_settings("baseline").unwrap()
}

/// Start an async run in the background and wait until it is running.
async fn spawn_run(
    controller: &Arc<SessionController<CountingFactory>>,
    policy: PolicyMode,
) -> tokio::task::JoinHandle<Result<bool, SessionError>> {
    let bytes = baseline(controller);
    let mut status = controller.subscribe_status();
    let runner = Arc::clone(controller);
    let handle = tokio::spawn(async move { runner.start_async(&bytes, policy).await });
    status
        .wait_for(|s| s.as_ref().is_some_and(|s| s.state == SessionState::Running))
        .await
        .unwrap();
    handle
}

// ---------------------------------------------------------------------------
// Schedule ingestion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn schedule_is_applied_no_earlier_than_the_delay() {
    let h = harness(1.0);
    let run = spawn_run(&h.controller, PolicyMode::External).await;

    let received = tokio::time::Instant::now();
    let outcome = h
        .controller
        .on_schedule_message(br#"{"sequence_nr": 1, "moves": []}"#)
        .await;
    assert_eq!(outcome, IngestOutcome::Applied);
    assert!(received.elapsed() >= Duration::from_millis(200));
    assert_eq!(h.applied.load(Ordering::SeqCst), 1);

    assert!(h.controller.stop_async().await);
    assert!(!run.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn garbage_schedule_is_never_applied() {
    let h = harness(1.0);
    let run = spawn_run(&h.controller, PolicyMode::External).await;

    let outcome = h.controller.on_schedule_message(b"\x00\x01garbage").await;
    assert_eq!(outcome, IngestOutcome::Malformed);
    assert_eq!(h.applied.load(Ordering::SeqCst), 0);

    h.controller.stop_async().await;
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn corrupt_schedule_does_not_disturb_the_run() {
    let h = harness(600.0);
    let run = spawn_run(&h.controller, PolicyMode::RuleBased).await;

    let outcome = h.controller.on_schedule_message(b"{\"sequence_nr\":").await;
    assert_eq!(outcome, IngestOutcome::Malformed);
    assert_eq!(
        h.controller.status().unwrap().state,
        SessionState::Running
    );

    assert!(run.await.unwrap().unwrap());
}

#[tokio::test]
async fn schedule_without_session_is_dropped() {
    let h = harness(0.0);
    let outcome = h
        .controller
        .on_schedule_message(br#"{"sequence_nr": 1, "moves": []}"#)
        .await;
    assert_eq!(outcome, IngestOutcome::NoSession);
    assert_eq!(h.applied.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Async runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_run_publishes_world_snapshots() {
    let mut h = harness(0.0);
    let bytes = baseline(&h.controller);
    assert!(
        h.controller
            .start_async(&bytes, PolicyMode::RuleBased)
            .await
            .unwrap()
    );

    let first = h.outbound.try_recv().unwrap();
    assert_eq!(first.topic, "world");
    let world: World = serde_json::from_slice(&first.payload).unwrap();
    assert_eq!(world.buffers.len(), 3);

    let status = h.controller.status().unwrap();
    assert_eq!(status.state, SessionState::Completed);
    assert_eq!(
        status.mode,
        RunMode::Async {
            policy: PolicyMode::RuleBased
        }
    );
}

#[tokio::test(start_paused = true)]
async fn stopped_run_reports_not_completed() {
    let h = harness(1.0);
    let run = spawn_run(&h.controller, PolicyMode::RuleBased).await;

    assert!(h.controller.stop_async().await);
    assert!(!run.await.unwrap().unwrap());

    let status = h.controller.status().unwrap();
    assert_eq!(status.state, SessionState::Aborted);
    assert!(status.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_refused_while_running() {
    let h = harness(1.0);
    let run = spawn_run(&h.controller, PolicyMode::External).await;
    let active = h.controller.status().unwrap().session_id;

    let bytes = baseline(&h.controller);
    let err = h
        .controller
        .start_async(&bytes, PolicyMode::RuleBased)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive { session_id } if session_id == active));

    h.controller.stop_async().await;
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_after_completion_is_a_no_op() {
    let h = harness(0.0);
    let bytes = baseline(&h.controller);
    assert!(
        h.controller
            .start_async(&bytes, PolicyMode::Automatic)
            .await
            .unwrap()
    );

    assert!(!h.controller.stop_async().await);
    assert_eq!(
        h.controller.status().unwrap().state,
        SessionState::Completed
    );
}

#[tokio::test]
async fn new_session_may_start_after_the_previous_one_ended() {
    let h = harness(0.0);
    let bytes = baseline(&h.controller);
    assert!(
        h.controller
            .start_async(&bytes, PolicyMode::RuleBased)
            .await
            .unwrap()
    );
    let first = h.controller.status().unwrap().session_id;

    assert!(
        h.controller
            .start_async(&bytes, PolicyMode::Automatic)
            .await
            .unwrap()
    );
    assert_ne!(h.controller.status().unwrap().session_id, first);
}

// ---------------------------------------------------------------------------
// Synchronous runs
// ---------------------------------------------------------------------------

#[test]
fn synchronous_run_with_integrated_policy_completes() {
    let h = harness(0.0);
    let bytes = baseline(&h.controller);
    let session_id = SessionId::new();

    assert!(
        h.controller
            .start_synchronous(&bytes, "", session_id, false, true)
            .unwrap()
    );
    assert!(h.connector.requests.lock().unwrap().is_empty());

    let status = h.controller.status().unwrap();
    assert_eq!(status.session_id, session_id);
    assert_eq!(status.state, SessionState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synchronous_run_connects_to_the_remote_policy() {
    let h = harness(0.0);
    let bytes = baseline(&h.controller);
    let session_id = SessionId::new();

    let controller = Arc::clone(&h.controller);
    let completed = tokio::task::spawn_blocking(move || {
        controller.start_synchronous(&bytes, "nats://policy:4222", session_id, false, false)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(completed);

    let requests = h.connector.requests.lock().unwrap();
    assert_eq!(
        requests.as_slice(),
        &[(String::from("nats://policy:4222"), session_id)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_synchronous_run_reports_not_completed() {
    let h = harness(1.0);
    let bytes = baseline(&h.controller);
    let mut status = h.controller.subscribe_status();

    let controller = Arc::clone(&h.controller);
    let run = tokio::task::spawn_blocking(move || {
        controller.start_synchronous(&bytes, "", SessionId::new(), true, true)
    });
    status
        .wait_for(|s| s.as_ref().is_some_and(|s| s.state == SessionState::Running))
        .await
        .unwrap();

    assert!(h.controller.stop_async().await);
    assert!(!run.await.unwrap().unwrap());

    let status = h.controller.status().unwrap();
    assert_eq!(status.state, SessionState::Aborted);
    assert!(matches!(
        status.mode,
        RunMode::Synchronous {
            simulate_async: true,
            integrated_policy: true,
            ..
        }
    ));
}
