//! Point-in-time snapshot of the hot-storage yard.
//!
//! A [`World`] is produced by the engine on every change notification and
//! is read-only for everyone else. Stacks list their blocks bottom first,
//! so the last element is the one the crane can reach.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schedule::{CraneMove, CraneSchedule};

/// Stack id of the production stack.
pub const PRODUCTION_ID: u32 = 0;

/// A material block moving through the yard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier, unique within a run.
    pub id: u32,
    /// Simulated time the block arrived at production.
    #[serde(with = "crate::seconds")]
    pub arrival: Duration,
    /// Simulated time from which the block may be delivered.
    #[serde(with = "crate::seconds")]
    pub ready_at: Duration,
    /// Simulated time the block is due at the handover.
    #[serde(with = "crate::seconds")]
    pub due: Duration,
    /// Whether the block was ready when the snapshot was taken.
    pub ready: bool,
}

/// A stack of blocks (production or buffer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack id (`0` for production, `1..=n` for buffers).
    pub id: u32,
    /// Maximum number of blocks the stack can hold.
    pub max_height: u32,
    /// Blocks, bottom first.
    pub blocks: Vec<Block>,
}

impl Stack {
    /// The block on top of the stack, if any.
    pub fn top(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Whether another block fits on the stack.
    pub fn has_room(&self) -> bool {
        u32::try_from(self.blocks.len()).is_ok_and(|len| len < self.max_height)
    }

    /// Number of free slots left on the stack.
    pub fn free_slots(&self) -> u32 {
        let len = u32::try_from(self.blocks.len()).unwrap_or(u32::MAX);
        self.max_height.saturating_sub(len)
    }
}

/// The handover point where ready blocks leave the yard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handover {
    /// Stack id of the handover (`buffer_count + 1`).
    pub id: u32,
    /// Whether the handover accepts a block.
    pub ready: bool,
    /// Block currently being cleared, if any.
    pub block: Option<Block>,
}

impl Handover {
    /// Whether a block can be dropped on the handover right now.
    pub const fn accepts_block(&self) -> bool {
        self.ready && self.block.is_none()
    }
}

/// The crane serving all stacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crane {
    /// Stack id the crane is positioned over.
    pub position: u32,
    /// Block hanging from the hoist, if any.
    pub load: Option<Block>,
    /// Move currently being executed, if any.
    pub active_move: Option<CraneMove>,
}

/// Key performance indicators accumulated over the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Number of completed crane moves.
    pub crane_manipulations: u64,
    /// Number of blocks that arrived at production (initial blocks excluded).
    pub blocks_arrived: u64,
    /// Number of blocks cleared from the handover.
    pub delivered_blocks: u64,
    /// Number of delivered blocks that were on time.
    pub total_blocks_on_time: u64,
    /// Share of delivered blocks that were on time.
    pub service_level_mean: f64,
    /// Mean time from arrival to delivery.
    #[serde(with = "crate::seconds")]
    pub lead_time_mean: Duration,
    /// Sum of lateness over all late deliveries.
    #[serde(with = "crate::seconds")]
    pub tardiness_sum: Duration,
    /// Total time arrivals were blocked by a full production stack.
    #[serde(with = "crate::seconds")]
    pub production_blocked_time: Duration,
    /// Number of scheduled moves the engine refused to execute.
    pub invalid_moves: u64,
}

/// A snapshot of the whole yard at simulated time `now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// Simulated time of the snapshot.
    #[serde(with = "crate::seconds")]
    pub now: Duration,
    /// The production stack (id `0`).
    pub production: Stack,
    /// Buffer stacks (ids `1..=n`).
    pub buffers: Vec<Stack>,
    /// The handover point.
    pub handover: Handover,
    /// The crane.
    pub crane: Crane,
    /// Moves still queued for the crane, if any.
    pub crane_schedule: Option<CraneSchedule>,
    /// Accumulated performance indicators.
    pub kpis: Performance,
}

impl World {
    /// Look up a production or buffer stack by id.
    pub fn stack(&self, id: u32) -> Option<&Stack> {
        if id == PRODUCTION_ID {
            Some(&self.production)
        } else {
            self.buffers.iter().find(|b| b.id == id)
        }
    }

    /// Production followed by all buffers.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        core::iter::once(&self.production).chain(self.buffers.iter())
    }

    /// Whether the crane is neither moving nor carrying a block.
    pub const fn crane_idle(&self) -> bool {
        self.crane.active_move.is_none() && self.crane.load.is_none()
    }
}
