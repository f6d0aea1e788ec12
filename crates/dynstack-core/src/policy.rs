//! Crane policies embedded in the engine.
//!
//! A [`CranePolicy`] is consulted whenever the crane is idle and has no
//! queued moves. It looks at the current [`World`] and may answer with a
//! fresh [`CraneSchedule`]. External agents take the same role over the
//! transport; the embedded policies exist so a run can be driven without
//! one.
//!
//! Neither policy aims for good KPIs. They keep the yard moving with a
//! handful of obvious rules.

use dynstack_types::{CraneMove, CraneSchedule, PolicyMode, Stack, World, PRODUCTION_ID};

/// A source of crane schedules consulted by the engine.
pub trait CranePolicy: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Plan the next moves for `world`, or `None` to leave the crane idle.
    fn plan(&mut self, world: &World) -> Option<CraneSchedule>;
}

/// The embedded policy for a [`PolicyMode`], or `None` for
/// [`PolicyMode::External`].
pub fn embedded(mode: PolicyMode) -> Option<Box<dyn CranePolicy>> {
    match mode {
        PolicyMode::Automatic => Some(Box::new(AutomaticPolicy::new())),
        PolicyMode::RuleBased => Some(Box::new(RuleBasedPolicy::new())),
        PolicyMode::External => None,
    }
}

// ---------------------------------------------------------------------------
// Sequence numbering
// ---------------------------------------------------------------------------

/// Monotonic schedule counter shared by the embedded policies.
#[derive(Debug, Clone, Default)]
struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    fn single(&mut self, crane_move: CraneMove) -> CraneSchedule {
        self.next = self.next.saturating_add(1);
        CraneSchedule::single(self.next, crane_move)
    }
}

// ---------------------------------------------------------------------------
// Automatic policy
// ---------------------------------------------------------------------------

/// Delivers any ready top block, otherwise clears production onto the
/// emptiest buffer.
#[derive(Debug, Clone, Default)]
pub struct AutomaticPolicy {
    sequence: SequenceCounter,
}

impl AutomaticPolicy {
    /// Create a new automatic policy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CranePolicy for AutomaticPolicy {
    fn name(&self) -> &'static str {
        "automatic"
    }

    fn plan(&mut self, world: &World) -> Option<CraneSchedule> {
        if world.handover.accepts_block() {
            let delivery = world.stacks().find_map(|stack| {
                stack
                    .top()
                    .filter(|block| block.ready)
                    .map(|block| CraneMove {
                        block_id: block.id,
                        source_id: stack.id,
                        target_id: world.handover.id,
                    })
            });
            if let Some(crane_move) = delivery {
                return Some(self.sequence.single(crane_move));
            }
        }

        let block = world.production.top()?;
        let target = world
            .buffers
            .iter()
            .filter(|buffer| buffer.has_room())
            .max_by_key(|buffer| buffer.free_slots())?;
        Some(self.sequence.single(CraneMove {
            block_id: block.id,
            source_id: PRODUCTION_ID,
            target_id: target.id,
        }))
    }
}

// ---------------------------------------------------------------------------
// Rule-based policy
// ---------------------------------------------------------------------------

/// Priority rules in order:
///
/// 1. Deliver the ready top block with the earliest due time.
/// 2. Dig out the ready block with the fewest blocks on top of it, moving
///    the covering block to a buffer that holds no ready block.
/// 3. Clear production onto a buffer whose top is due no earlier than the
///    moved block, else onto an empty buffer, else onto the lowest buffer.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedPolicy {
    sequence: SequenceCounter,
}

impl RuleBasedPolicy {
    /// Create a new rule-based policy.
    pub fn new() -> Self {
        Self::default()
    }

    fn deliver(world: &World) -> Option<CraneMove> {
        if !world.handover.accepts_block() {
            return None;
        }
        world
            .stacks()
            .filter_map(|stack| {
                stack
                    .top()
                    .filter(|block| block.ready)
                    .map(|block| (stack.id, block))
            })
            .min_by_key(|(_, block)| block.due)
            .map(|(source_id, block)| CraneMove {
                block_id: block.id,
                source_id,
                target_id: world.handover.id,
            })
    }

    fn dig(world: &World) -> Option<CraneMove> {
        let (source, _depth) = world
            .buffers
            .iter()
            .filter_map(|buffer| buried_ready_depth(buffer).map(|depth| (buffer, depth)))
            .min_by_key(|(_, depth)| *depth)?;
        let covering = source.top()?;
        let target = world
            .buffers
            .iter()
            .filter(|buffer| buffer.id != source.id && buffer.has_room())
            .filter(|buffer| !buffer.blocks.iter().any(|block| block.ready))
            .max_by_key(|buffer| buffer.free_slots())?;
        Some(CraneMove {
            block_id: covering.id,
            source_id: source.id,
            target_id: target.id,
        })
    }

    fn clear_production(world: &World) -> Option<CraneMove> {
        let block = world.production.top()?;
        let open = || world.buffers.iter().filter(|buffer| buffer.has_room());

        let fitting = open()
            .filter_map(|buffer| buffer.top().map(|top| (buffer, top.due)))
            .filter(|(_, due)| *due >= block.due)
            .min_by_key(|(_, due)| *due)
            .map(|(buffer, _)| buffer);
        let target = fitting
            .or_else(|| open().find(|buffer| buffer.blocks.is_empty()))
            .or_else(|| open().max_by_key(|buffer| buffer.free_slots()))?;

        Some(CraneMove {
            block_id: block.id,
            source_id: PRODUCTION_ID,
            target_id: target.id,
        })
    }
}

/// Number of blocks above the topmost ready block, if that block is buried.
fn buried_ready_depth(stack: &Stack) -> Option<usize> {
    let from_top = stack.blocks.iter().rev().position(|block| block.ready)?;
    (from_top > 0).then_some(from_top)
}

impl CranePolicy for RuleBasedPolicy {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn plan(&mut self, world: &World) -> Option<CraneSchedule> {
        let crane_move = Self::deliver(world)
            .or_else(|| Self::dig(world))
            .or_else(|| Self::clear_production(world))?;
        Some(self.sequence.single(crane_move))
    }
}
