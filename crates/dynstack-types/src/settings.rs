//! Immutable run parameters for one simulation session.
//!
//! A [`Settings`] value is resolved once per session (either decoded from
//! a start request or looked up from a named preset) and never mutated
//! after the session starts. All time quantities are stored as
//! [`Duration`] and travel on the wire as fractional seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Geometry, stochastic timing and bounds of a hot-storage yard run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum number of blocks on the production stack.
    pub production_max_height: u32,
    /// Maximum number of blocks on each buffer stack.
    pub buffer_max_height: u32,
    /// Number of buffer stacks between production and handover.
    pub buffer_count: u32,

    /// Mean crane travel time per stack position.
    #[serde(with = "crate::seconds")]
    pub crane_move_time_mean: Duration,
    /// Standard deviation of the crane travel time.
    #[serde(with = "crate::seconds")]
    pub crane_move_time_std: Duration,
    /// Mean hoist (pick or drop) time.
    #[serde(with = "crate::seconds")]
    pub hoist_move_time_mean: Duration,
    /// Standard deviation of the hoist time.
    #[serde(with = "crate::seconds")]
    pub hoist_move_time_std: Duration,

    /// Mean time from arrival until a block is due at the handover.
    #[serde(with = "crate::seconds")]
    pub due_time_mean: Duration,
    /// Standard deviation of the due time.
    #[serde(with = "crate::seconds")]
    pub due_time_std: Duration,
    /// Lower bound on the due time of any block.
    #[serde(with = "crate::seconds")]
    pub due_time_min: Duration,

    /// Mean inter-arrival time of new blocks at production.
    #[serde(with = "crate::seconds")]
    pub arrival_time_mean: Duration,
    /// Standard deviation of the inter-arrival time.
    #[serde(with = "crate::seconds")]
    pub arrival_time_std: Duration,

    /// Mean time for the handover to become ready again after a clear.
    #[serde(with = "crate::seconds")]
    pub handover_time_mean: Duration,
    /// Standard deviation of the handover ready time.
    #[serde(with = "crate::seconds")]
    pub handover_time_std: Duration,
    /// Minimum time a delivered block occupies the handover.
    #[serde(with = "crate::seconds")]
    pub min_clear_time: Duration,
    /// Maximum time a delivered block occupies the handover.
    #[serde(with = "crate::seconds")]
    pub max_clear_time: Duration,

    /// Lower bound of the share of the due window after which a block is ready.
    pub ready_factor_min: f64,
    /// Upper bound of the share of the due window after which a block is ready.
    pub ready_factor_max: f64,

    /// Number of blocks placed in the yard before the run starts.
    pub initial_number_of_blocks: u32,
    /// Seed for the pseudo-random number generator.
    pub seed: u64,
    /// Interval of the periodic world check (and world publication).
    #[serde(with = "crate::seconds")]
    pub check_interval: Duration,
    /// Total simulated duration of the run.
    #[serde(with = "crate::seconds")]
    pub simulation_duration: Duration,
}

impl Settings {
    /// Stack id of the handover point (buffers occupy `1..=buffer_count`).
    pub const fn handover_id(&self) -> u32 {
        self.buffer_count.saturating_add(1)
    }
}
