//! Session lifecycle: one simulation run at a time.
//!
//! [`SessionController`] owns at most one active session. A start request
//! decodes the settings, builds an engine through the [`EngineFactory`],
//! wires a [`WorldPublisher`] and a [`ScheduleIngestor`] to it, and drives
//! the run to its end. The run's result is `true` only when the engine
//! reached the end of its horizon without an operator stop.
//!
//! A start request while a session is active is refused with
//! [`SessionError::AlreadyActive`].
//!
//! # Lifecycle
//!
//! `Created -> Running -> {Completed | Aborted | Failed}`. The latest
//! [`SessionStatus`] is kept in a `watch` channel; it stays readable after
//! the session ended until the next one starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dynstack_core::clock::Pacing;
use dynstack_core::engine::{EngineError, RunOutcome, SimulationEngine, YardSimulation};
use dynstack_core::policy::{self, CranePolicy, RuleBasedPolicy};
use dynstack_types::{PolicyMode, SessionId, SessionState, Settings};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::capabilities::HostCapabilities;
use crate::config::SessionConfig;
use crate::ingest::{IngestOutcome, ScheduleIngestor, DEFAULT_SCHEDULE_DELAY};
use crate::publisher::WorldPublisher;
use crate::resolver::{SettingsError, SettingsResolver};

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another session is still running.
    #[error("session {session_id} is already active")]
    AlreadyActive {
        /// The active session.
        session_id: SessionId,
    },

    /// The settings could not be resolved or decoded.
    #[error("settings error: {source}")]
    Settings {
        /// The underlying settings error.
        #[from]
        source: SettingsError,
    },

    /// The engine could not be built.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// The remote policy could not be reached.
    #[error("remote policy error: {message}")]
    RemotePolicy {
        /// Description of the failure.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Engine construction
// ---------------------------------------------------------------------------

/// Builds the engine for a new session.
pub trait EngineFactory: Send + Sync + 'static {
    /// The engine type produced.
    type Engine: SimulationEngine;

    /// Build an engine for `settings`, driven by `policy` (or by external
    /// schedules only, when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine cannot be built.
    fn create(
        &self,
        settings: Settings,
        policy: Option<Box<dyn CranePolicy>>,
        pacing: Pacing,
    ) -> Result<Self::Engine, EngineError>;
}

/// Factory for the reference [`YardSimulation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct YardEngineFactory;

impl EngineFactory for YardEngineFactory {
    type Engine = YardSimulation;

    fn create(
        &self,
        settings: Settings,
        policy: Option<Box<dyn CranePolicy>>,
        pacing: Pacing,
    ) -> Result<YardSimulation, EngineError> {
        YardSimulation::new(settings, policy, pacing)
    }
}

// ---------------------------------------------------------------------------
// Session records
// ---------------------------------------------------------------------------

/// How a session runs. Fixed at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunMode {
    /// Cooperative run on the async runtime.
    Async {
        /// Which decision maker drives the crane.
        policy: PolicyMode,
    },
    /// Lock-step run blocking the calling thread.
    Synchronous {
        /// Address of the remote policy.
        remote_address: String,
        /// Session id announced to the remote policy.
        session_id: SessionId,
        /// Pace simulated time against the wall clock.
        simulate_async: bool,
        /// Use the embedded rule-based policy instead of the remote one.
        integrated_policy: bool,
    },
}

/// Observable state of the current or most recent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Session identifier.
    pub session_id: SessionId,
    /// Execution mode.
    pub mode: RunMode,
    /// Lifecycle state.
    pub state: SessionState,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended, once it has.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Tunables shared by every session of a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Delay before an inbound schedule is decoded. The ingestor raises
    /// anything shorter than [`DEFAULT_SCHEDULE_DELAY`] to it.
    pub schedule_delay: Duration,
    /// Simulated seconds per wall second for paced runs.
    pub time_scale: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            schedule_delay: DEFAULT_SCHEDULE_DELAY,
            time_scale: 1.0,
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            schedule_delay: config.schedule_delay(),
            time_scale: config.time_scale,
        }
    }
}

/// The live parts of a running session.
struct ActiveSession<E> {
    id: SessionId,
    engine: Arc<E>,
    ingestor: Arc<ScheduleIngestor<E>>,
    aborted: Arc<AtomicBool>,
}

impl<E> Clone for ActiveSession<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            engine: Arc::clone(&self.engine),
            ingestor: Arc::clone(&self.ingestor),
            aborted: Arc::clone(&self.aborted),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Coordinates one simulation run at a time.
pub struct SessionController<F: EngineFactory> {
    factory: F,
    resolver: SettingsResolver,
    capabilities: HostCapabilities,
    options: SessionOptions,
    active: Mutex<Option<ActiveSession<F::Engine>>>,
    status: watch::Sender<Option<SessionStatus>>,
}

impl<F: EngineFactory> core::fmt::Debug for SessionController<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionController")
            .field("options", &self.options)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<F: EngineFactory> SessionController<F> {
    /// Create a controller.
    pub fn new(
        factory: F,
        resolver: SettingsResolver,
        capabilities: HostCapabilities,
        options: SessionOptions,
    ) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            factory,
            resolver,
            capabilities,
            options,
            active: Mutex::new(None),
            status,
        }
    }

    /// The settings resolver.
    pub const fn resolver(&self) -> &SettingsResolver {
        &self.resolver
    }

    /// Run a session on the async runtime until it ends.
    ///
    /// Returns `true` if the simulation reached its horizon, `false` if it
    /// was stopped or failed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Settings`] for undecodable settings,
    /// [`SessionError::AlreadyActive`] while another session runs, and
    /// [`SessionError::Engine`] if the engine cannot be built.
    pub async fn start_async(
        &self,
        settings_bytes: &[u8],
        policy_mode: PolicyMode,
    ) -> Result<bool, SessionError> {
        let settings = SettingsResolver::decode(settings_bytes)?;
        let session = self.open(
            SessionId::new(),
            RunMode::Async {
                policy: policy_mode,
            },
            settings,
            policy::embedded(policy_mode),
            Pacing::from_time_scale(self.options.time_scale),
        )?;

        let result = session.engine.run().await;
        if result.is_ok() {
            self.capabilities.logger.write_line("Run completed");
        }
        Ok(self.close(&session, result))
    }

    /// Run a lock-step session on the calling thread until it ends.
    ///
    /// The crane is driven by the embedded rule-based policy when
    /// `use_integrated_policy` is set, otherwise by the remote policy at
    /// `remote_address`. With `simulate_async` the run is paced against
    /// the wall clock; without it, it runs as fast as the policy answers.
    ///
    /// Must be called from a blocking context (`spawn_blocking` or a plain
    /// thread), never from an async task.
    ///
    /// # Errors
    ///
    /// As [`start_async`](Self::start_async), plus
    /// [`SessionError::RemotePolicy`] if the remote policy is unreachable.
    pub fn start_synchronous(
        &self,
        settings_bytes: &[u8],
        remote_address: &str,
        session_id: SessionId,
        simulate_async: bool,
        use_integrated_policy: bool,
    ) -> Result<bool, SessionError> {
        let settings = SettingsResolver::decode(settings_bytes)?;
        self.ensure_idle()?;

        let policy: Box<dyn CranePolicy> = if use_integrated_policy {
            Box::new(RuleBasedPolicy::new())
        } else {
            self.capabilities.remote.connect(remote_address, session_id)?
        };
        let pacing = if simulate_async {
            Pacing::from_time_scale(self.options.time_scale)
        } else {
            Pacing::Unpaced
        };

        let session = self.open(
            session_id,
            RunMode::Synchronous {
                remote_address: remote_address.to_owned(),
                session_id,
                simulate_async,
                integrated_policy: use_integrated_policy,
            },
            settings,
            Some(policy),
            pacing,
        )?;

        self.capabilities.logger.write_line("Starting sim");
        let result = session.engine.run_blocking();
        Ok(self.close(&session, result))
    }

    /// Signal the active run to halt.
    ///
    /// Returns once the signal is issued, `false` if no run was active.
    pub async fn stop_async(&self) -> bool {
        let engine = {
            let active = lock(&self.active);
            let Some(session) = active.as_ref() else {
                debug!("Stop requested with no active session");
                return false;
            };
            session.aborted.store(true, Ordering::Release);
            info!(session_id = %session.id, "Stopping session");
            Arc::clone(&session.engine)
        };
        engine.stop().await;
        true
    }

    /// Encoded settings for a preset.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PresetNotFound`] for unknown ids.
    pub fn default_settings(&self, preset: &str) -> Result<Vec<u8>, SettingsError> {
        self.resolver.default_settings(preset)
    }

    /// Route an inbound schedule message to the active session.
    pub async fn on_schedule_message(&self, payload: &[u8]) -> IngestOutcome {
        let ingestor = lock(&self.active)
            .as_ref()
            .map(|session| Arc::clone(&session.ingestor));
        match ingestor {
            Some(ingestor) => ingestor.on_schedule_message(payload).await,
            None => {
                debug!(bytes = payload.len(), "No active session, dropping schedule");
                IngestOutcome::NoSession
            }
        }
    }

    /// Status of the current or most recent session.
    pub fn status(&self) -> Option<SessionStatus> {
        self.status.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<Option<SessionStatus>> {
        self.status.subscribe()
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match lock(&self.active).as_ref() {
            Some(session) => Err(SessionError::AlreadyActive {
                session_id: session.id,
            }),
            None => Ok(()),
        }
    }

    /// Claim the session slot and wire a fresh engine.
    fn open(
        &self,
        session_id: SessionId,
        mode: RunMode,
        settings: Settings,
        policy: Option<Box<dyn CranePolicy>>,
        pacing: Pacing,
    ) -> Result<ActiveSession<F::Engine>, SessionError> {
        let mut active = lock(&self.active);
        if let Some(session) = active.as_ref() {
            return Err(SessionError::AlreadyActive {
                session_id: session.id,
            });
        }

        let engine = Arc::new(self.factory.create(settings, policy, pacing)?);
        engine.subscribe(Arc::new(WorldPublisher::new(Arc::clone(
            &self.capabilities.outbound,
        ))));
        let session = ActiveSession {
            id: session_id,
            ingestor: Arc::new(ScheduleIngestor::new(
                Arc::clone(&engine),
                self.options.schedule_delay,
            )),
            engine,
            aborted: Arc::new(AtomicBool::new(false)),
        };
        *active = Some(session.clone());
        drop(active);

        let started_at = Utc::now();
        self.status.send_replace(Some(SessionStatus {
            session_id,
            mode: mode.clone(),
            state: SessionState::Created,
            started_at,
            finished_at: None,
        }));
        info!(%session_id, ?mode, ?pacing, "Session created");
        self.set_state(SessionState::Running);
        Ok(session)
    }

    /// Release the session slot and record the final state.
    fn close(
        &self,
        session: &ActiveSession<F::Engine>,
        result: Result<RunOutcome, EngineError>,
    ) -> bool {
        {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|current| current.id == session.id) {
                *active = None;
            }
        }

        let aborted = session.aborted.load(Ordering::Acquire);
        let state = match &result {
            Ok(RunOutcome::Completed) if !aborted => SessionState::Completed,
            Ok(_) => SessionState::Aborted,
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Simulation failed");
                SessionState::Failed
            }
        };
        self.status.send_modify(|status| {
            if let Some(status) = status.as_mut() {
                status.state = state;
                status.finished_at = Some(Utc::now());
            }
        });
        info!(session_id = %session.id, ?state, "Session finished");
        state == SessionState::Completed
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_modify(|status| {
            if let Some(status) = status.as_mut() {
                status.state = state;
            }
        });
    }
}
