//! Wall-clock pacing of simulated time.
//!
//! A paced run waits until `origin + sim_time / time_scale` before each
//! event; an unpaced run processes events back to back.

use std::time::Duration;

/// How simulated time relates to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Process events as fast as possible.
    Unpaced,
    /// Advance simulated time proportionally to wall-clock time.
    RealTime {
        /// Simulated seconds per wall-clock second (`1.0` is real time).
        time_scale: f64,
    },
}

impl Pacing {
    /// Pacing for a time scale; zero, negative or non-finite scales run
    /// unpaced.
    pub fn from_time_scale(time_scale: f64) -> Self {
        if time_scale.is_finite() && time_scale > 0.0 {
            Self::RealTime { time_scale }
        } else {
            Self::Unpaced
        }
    }

    /// Wall-clock offset from the run origin at which the event at simulated
    /// time `sim` is due, or `None` when unpaced.
    pub fn wall_offset(self, sim: Duration) -> Option<Duration> {
        match self {
            Self::Unpaced => None,
            Self::RealTime { time_scale } => {
                Duration::try_from_secs_f64(sim.as_secs_f64() / time_scale).ok()
            }
        }
    }
}
