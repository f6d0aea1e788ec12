//! Crane move instructions produced by a policy.
//!
//! The host treats a [`CraneSchedule`] as an opaque payload; only the
//! engine judges whether a move is executable.

use serde::{Deserialize, Serialize};

/// One crane instruction: carry `block_id` from `source_id` to `target_id`.
///
/// Stack ids follow the yard layout: production is `0`, buffers are
/// `1..=buffer_count`, and the handover is `buffer_count + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CraneMove {
    /// The block expected on top of the source stack.
    pub block_id: u32,
    /// Stack the block is picked from.
    pub source_id: u32,
    /// Stack (or handover) the block is dropped onto.
    pub target_id: u32,
}

/// An ordered sequence of crane moves.
///
/// `sequence_nr` increases with every schedule a policy emits; the
/// engine ignores schedules older than the last one it accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraneSchedule {
    /// Monotonic sequence number assigned by the policy.
    pub sequence_nr: u64,
    /// Moves in execution order.
    #[serde(default)]
    pub moves: Vec<CraneMove>,
}

impl CraneSchedule {
    /// Build a schedule containing a single move.
    pub fn single(sequence_nr: u64, crane_move: CraneMove) -> Self {
        Self {
            sequence_nr,
            moves: vec![crane_move],
        }
    }
}
