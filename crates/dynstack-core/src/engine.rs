//! Engine contract and the reference yard engine.
//!
//! The host drives any engine through [`SimulationEngine`]: it runs the
//! simulation, injects crane schedules, halts it on request, and receives
//! a synchronous change notification (via [`WorldListener`]) after every
//! processed event. Listeners read the state through [`WorldSource`].
//!
//! [`YardSimulation`] is the in-process implementation. Its state sits
//! behind a mutex that is never held while listeners run or while a
//! policy is consulted, so publishing and schedule ingestion never wait
//! on each other.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dynstack_types::{CraneSchedule, Settings, World};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::clock::Pacing;
use crate::policy::CranePolicy;
use crate::settings::{self, SettingsViolation};
use crate::yard::Yard;

/// Longest single sleep of a blocking run, so stop and schedule
/// injection are noticed promptly.
const BLOCKING_SLICE: Duration = Duration::from_millis(50);

/// Errors reported by a simulation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `run` was called on an engine that has already been run.
    #[error("simulation has already been started")]
    AlreadyStarted,

    /// A schedule arrived after the run ended.
    #[error("simulation has finished")]
    Finished,

    /// A schedule older than the last accepted one.
    #[error("stale crane schedule: sequence {received} is older than {current}")]
    StaleSchedule {
        /// Sequence number of the refused schedule.
        received: u64,
        /// Sequence number of the last accepted schedule.
        current: u64,
    },

    /// The settings describe a yard that cannot be simulated.
    #[error("invalid settings: {source}")]
    InvalidSettings {
        /// The underlying violation.
        #[from]
        source: SettingsViolation,
    },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The simulation reached the end of its horizon.
    Completed,
    /// The run was halted through [`SimulationEngine::stop`].
    Stopped,
}

/// Read access to the current world.
pub trait WorldSource {
    /// A snapshot of the world at the current simulated time.
    fn snapshot(&self) -> World;
}

/// Receiver of engine change notifications.
///
/// Called synchronously on the engine's thread, once per processed event
/// and in event order. Implementations must not block.
pub trait WorldListener: Send + Sync {
    /// The world changed; `source` yields the new state.
    fn on_world_changed(&self, source: &dyn WorldSource);
}

/// A discrete-event simulation the host can run and steer.
pub trait SimulationEngine: WorldSource + Send + Sync + 'static {
    /// Run to completion on the async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] if the engine already ran.
    fn run(&self) -> impl Future<Output = Result<RunOutcome, EngineError>> + Send;

    /// Run to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] if the engine already ran.
    fn run_blocking(&self) -> Result<RunOutcome, EngineError>;

    /// Signal the run to halt. Resolves once the signal is issued.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Inject a crane schedule into the running simulation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StaleSchedule`] for an outdated sequence
    /// number and [`EngineError::Finished`] once the run has ended.
    fn apply_schedule(
        &self,
        schedule: CraneSchedule,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Register a listener for change notifications.
    fn subscribe(&self, listener: Arc<dyn WorldListener>);
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The reference hot-storage yard engine.
pub struct YardSimulation {
    yard: Mutex<Yard>,
    policy: Mutex<Option<Box<dyn CranePolicy>>>,
    listeners: Mutex<Vec<Arc<dyn WorldListener>>>,
    pacing: Pacing,
    horizon: Duration,
    started: AtomicBool,
    finished: AtomicBool,
    stop_requested: AtomicBool,
    /// Bumped on every stop or injected schedule; a blocking run watches it
    /// to cut its sleep short.
    revision: AtomicU64,
    wake: Notify,
}

impl core::fmt::Debug for YardSimulation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("YardSimulation")
            .field("pacing", &self.pacing)
            .field("horizon", &self.horizon)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl YardSimulation {
    /// Build an engine for `settings`.
    ///
    /// `policy` is consulted whenever the crane is idle; pass `None` when
    /// schedules come from an external agent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] if the settings fail
    /// validation.
    pub fn new(
        settings: Settings,
        policy: Option<Box<dyn CranePolicy>>,
        pacing: Pacing,
    ) -> Result<Self, EngineError> {
        settings::validate(&settings)?;
        let horizon = settings.simulation_duration;
        Ok(Self {
            yard: Mutex::new(Yard::new(settings)),
            policy: Mutex::new(policy),
            listeners: Mutex::new(Vec::new()),
            pacing,
            horizon,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            revision: AtomicU64::new(0),
            wake: Notify::new(),
        })
    }

    fn begin(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyStarted);
        }
        info!(
            pacing = ?self.pacing,
            horizon_secs = self.horizon.as_secs_f64(),
            "Simulation starting"
        );
        self.plan_if_idle();
        self.notify_listeners();
        Ok(())
    }

    fn finish(&self, outcome: RunOutcome) {
        self.finished.store(true, Ordering::Release);
        let world = self.snapshot();
        info!(
            ?outcome,
            sim_time_secs = world.now.as_secs_f64(),
            delivered = world.kpis.delivered_blocks,
            on_time = world.kpis.total_blocks_on_time,
            invalid_moves = world.kpis.invalid_moves,
            "Simulation finished"
        );
    }

    fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Time of the next event inside the horizon.
    fn next_due(&self) -> Option<Duration> {
        lock(&self.yard)
            .next_event_at()
            .filter(|at| *at <= self.horizon)
    }

    /// Process one event, consult the policy if the crane went idle, then
    /// notify listeners.
    fn step(&self) {
        let needs_plan = {
            let mut yard = lock(&self.yard);
            if let Some(event) = yard.advance() {
                debug!(?event, now_secs = yard.now().as_secs_f64(), "Yard event");
            }
            yard.needs_plan()
        };
        if needs_plan {
            self.plan_if_idle();
        }
        self.notify_listeners();
    }

    fn plan_if_idle(&self) {
        let mut policy = lock(&self.policy);
        let Some(policy) = policy.as_mut() else {
            return;
        };
        let world = self.snapshot();
        if !world.crane_idle() || world.crane_schedule.is_some() {
            return;
        }
        let Some(schedule) = policy.plan(&world) else {
            return;
        };
        let mut yard = lock(&self.yard);
        match yard.set_schedule(schedule) {
            Ok(()) => yard.start_next_move(),
            Err(stale) => warn!(
                policy = policy.name(),
                received = stale.received,
                current = stale.current,
                "Policy produced a stale schedule"
            ),
        }
    }

    fn notify_listeners(&self) {
        let listeners = lock(&self.listeners).clone();
        for listener in &listeners {
            listener.on_world_changed(self);
        }
    }

    fn apply_now(&self, schedule: CraneSchedule) -> Result<(), EngineError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(EngineError::Finished);
        }
        {
            let mut yard = lock(&self.yard);
            yard.set_schedule(schedule)
                .map_err(|stale| EngineError::StaleSchedule {
                    received: stale.received,
                    current: stale.current,
                })?;
            yard.start_next_move();
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.wake.notify_one();
        Ok(())
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.wake.notify_one();
    }

    async fn run_async(&self) -> Result<RunOutcome, EngineError> {
        self.begin()?;
        let origin = tokio::time::Instant::now();

        let outcome = loop {
            if self.is_stop_requested() {
                break RunOutcome::Stopped;
            }
            let Some(at) = self.next_due() else {
                break RunOutcome::Completed;
            };
            match self.pacing.wall_offset(at) {
                Some(offset) => {
                    let deadline = origin.checked_add(offset).unwrap_or(origin);
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => {}
                        () = self.wake.notified() => continue,
                    }
                }
                None => tokio::task::yield_now().await,
            }
            self.step();
        };

        self.finish(outcome);
        Ok(outcome)
    }

    fn run_on_thread(&self) -> Result<RunOutcome, EngineError> {
        self.begin()?;
        let origin = std::time::Instant::now();

        let outcome = 'run: loop {
            if self.is_stop_requested() {
                break RunOutcome::Stopped;
            }
            let Some(at) = self.next_due() else {
                break RunOutcome::Completed;
            };
            if let Some(offset) = self.pacing.wall_offset(at) {
                let revision = self.revision.load(Ordering::Acquire);
                loop {
                    let remaining = offset.saturating_sub(origin.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    std::thread::sleep(remaining.min(BLOCKING_SLICE));
                    if self.revision.load(Ordering::Acquire) != revision {
                        continue 'run;
                    }
                }
            }
            self.step();
        };

        self.finish(outcome);
        Ok(outcome)
    }
}

impl WorldSource for YardSimulation {
    fn snapshot(&self) -> World {
        lock(&self.yard).world()
    }
}

impl SimulationEngine for YardSimulation {
    fn run(&self) -> impl Future<Output = Result<RunOutcome, EngineError>> + Send {
        self.run_async()
    }

    fn run_blocking(&self) -> Result<RunOutcome, EngineError> {
        self.run_on_thread()
    }

    fn stop(&self) -> impl Future<Output = ()> + Send {
        self.request_stop();
        std::future::ready(())
    }

    fn apply_schedule(
        &self,
        schedule: CraneSchedule,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        std::future::ready(self.apply_now(schedule))
    }

    fn subscribe(&self, listener: Arc<dyn WorldListener>) {
        lock(&self.listeners).push(listener);
    }
}
