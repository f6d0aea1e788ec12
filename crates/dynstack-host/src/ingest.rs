//! Inbound crane schedule ingestion.
//!
//! Every inbound message waits a fixed delay (200ms by default, never
//! less) before it is decoded, mirroring the latency of the benchmark's reference host.
//! Decoded schedules are applied one at a time; malformed payloads and
//! engine rejections are logged and dropped. Nothing is ever reported
//! back to the sender.

use std::sync::Arc;
use std::time::Duration;

use dynstack_core::engine::SimulationEngine;
use dynstack_types::CraneSchedule;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default, and minimum, delay between receipt and application of a
/// schedule.
pub const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_millis(200);

/// What happened to one inbound schedule message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The schedule was handed to the engine and accepted.
    Applied,
    /// The payload did not decode; nothing was applied.
    Malformed,
    /// The engine refused the schedule (stale or run finished).
    Rejected,
    /// No session was active; the message was dropped.
    NoSession,
}

/// Decodes inbound schedules and forwards them to one engine.
pub struct ScheduleIngestor<E> {
    engine: Arc<E>,
    delay: Duration,
    /// Serializes applies so at most one is in flight.
    apply_lock: Mutex<()>,
}

impl<E> core::fmt::Debug for ScheduleIngestor<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScheduleIngestor")
            .field("delay_ms", &self.delay.as_millis())
            .finish_non_exhaustive()
    }
}

impl<E: SimulationEngine> ScheduleIngestor<E> {
    /// Create an ingestor for `engine`. A `delay` shorter than
    /// [`DEFAULT_SCHEDULE_DELAY`] is raised to it.
    pub fn new(engine: Arc<E>, delay: Duration) -> Self {
        Self {
            engine,
            delay: delay.max(DEFAULT_SCHEDULE_DELAY),
            apply_lock: Mutex::new(()),
        }
    }

    /// Handle one inbound message.
    ///
    /// Sleeps for the configured delay, decodes the payload, and applies
    /// it. Never fails: every problem is logged and reflected in the
    /// returned [`IngestOutcome`].
    pub async fn on_schedule_message(&self, payload: &[u8]) -> IngestOutcome {
        tokio::time::sleep(self.delay).await;

        let schedule = match serde_json::from_slice::<CraneSchedule>(payload) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(
                    error = %e,
                    bytes = payload.len(),
                    "Dropping malformed crane schedule"
                );
                return IngestOutcome::Malformed;
            }
        };

        let sequence_nr = schedule.sequence_nr;
        let moves = schedule.moves.len();
        let _in_flight = self.apply_lock.lock().await;
        match self.engine.apply_schedule(schedule).await {
            Ok(()) => {
                debug!(sequence_nr, moves, "Crane schedule applied");
                IngestOutcome::Applied
            }
            Err(e) => {
                warn!(sequence_nr, error = %e, "Engine rejected crane schedule");
                IngestOutcome::Rejected
            }
        }
    }
}
