//! Settings shared by the unit tests of this crate.

use std::time::Duration;

use dynstack_types::Settings;

/// A small yard that completes quickly: 3 buffers, 6 initial blocks,
/// ten simulated minutes.
pub(crate) fn small_yard() -> Settings {
    Settings {
        production_max_height: 4,
        buffer_max_height: 8,
        buffer_count: 3,
        crane_move_time_mean: Duration::from_millis(1500),
        crane_move_time_std: Duration::from_millis(300),
        hoist_move_time_mean: Duration::from_millis(250),
        hoist_move_time_std: Duration::from_millis(50),
        due_time_mean: Duration::from_secs(120),
        due_time_std: Duration::from_secs(20),
        due_time_min: Duration::from_secs(30),
        arrival_time_mean: Duration::from_secs(12),
        arrival_time_std: Duration::from_secs(2),
        handover_time_mean: Duration::from_secs(4),
        handover_time_std: Duration::from_secs(1),
        min_clear_time: Duration::ZERO,
        max_clear_time: Duration::from_secs(1),
        ready_factor_min: 0.1,
        ready_factor_max: 0.2,
        initial_number_of_blocks: 6,
        seed: 7,
        check_interval: Duration::from_secs(1),
        simulation_duration: Duration::from_secs(600),
    }
}
