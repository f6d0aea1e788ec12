//! Mutable yard state and the discrete-event agenda.
//!
//! [`Yard`] knows nothing about pacing, locking or listeners. The engine
//! pops one event at a time with [`Yard::advance`] and decides when to
//! consult a policy.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use dynstack_types::{
    Block, Crane, CraneMove, CraneSchedule, Handover, Performance, Settings, Stack, World,
    PRODUCTION_ID,
};
use tracing::{debug, warn};

use crate::sampling::Sampler;

/// Every crane move takes at least this much simulated time, so a policy
/// can never stall the clock with zero-length moves.
const MIN_MOVE_TIME: Duration = Duration::from_millis(1);

/// Kinds of scheduled yard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum YardEvent {
    /// Periodic world check.
    Check,
    /// A new block arrives at production.
    Arrival,
    /// The crane finishes its active move.
    CraneArrived,
    /// The block on the handover has been taken away.
    HandoverCleared,
    /// The handover accepts blocks again.
    HandoverReady,
}

/// An agenda entry. Ordered by time, then by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    at: Duration,
    seq: u64,
    event: YardEvent,
}

/// An arrival that could not be placed because production was full.
#[derive(Debug, Clone, Copy)]
struct HeldArrival {
    block: Block,
    blocked_since: Duration,
}

/// Reasons a schedule is refused by the yard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StaleSequence {
    pub(crate) received: u64,
    pub(crate) current: u64,
}

/// Complete state of one yard run.
#[derive(Debug)]
pub(crate) struct Yard {
    settings: Settings,
    sampler: Sampler,
    now: Duration,
    agenda: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    next_block_id: u32,
    production: Stack,
    buffers: Vec<Stack>,
    handover: Handover,
    crane: Crane,
    pending: VecDeque<CraneMove>,
    last_sequence: Option<u64>,
    held: Option<HeldArrival>,
    kpis: Performance,
    lead_time_total: Duration,
}

impl Yard {
    /// Build the initial yard: stacks filled with the initial blocks, first
    /// check and first arrival scheduled.
    pub(crate) fn new(settings: Settings) -> Self {
        let production = Stack {
            id: PRODUCTION_ID,
            max_height: settings.production_max_height,
            blocks: Vec::new(),
        };
        let buffers = (1..=settings.buffer_count)
            .map(|id| Stack {
                id,
                max_height: settings.buffer_max_height,
                blocks: Vec::new(),
            })
            .collect();
        let handover = Handover {
            id: settings.handover_id(),
            ready: true,
            block: None,
        };

        let mut yard = Self {
            sampler: Sampler::seeded(settings.seed),
            now: Duration::ZERO,
            agenda: BinaryHeap::new(),
            next_seq: 0,
            next_block_id: 1,
            production,
            buffers,
            handover,
            crane: Crane {
                position: PRODUCTION_ID,
                load: None,
                active_move: None,
            },
            pending: VecDeque::new(),
            last_sequence: None,
            held: None,
            kpis: Performance::default(),
            lead_time_total: Duration::ZERO,
            settings,
        };

        yard.place_initial_blocks();
        yard.schedule(yard.settings.check_interval, YardEvent::Check);
        yard.schedule_next_arrival();
        yard
    }

    /// Current simulated time.
    pub(crate) const fn now(&self) -> Duration {
        self.now
    }

    /// Time of the next scheduled event.
    pub(crate) fn next_event_at(&self) -> Option<Duration> {
        self.agenda.peek().map(|Reverse(entry)| entry.at)
    }

    /// Pop and process the next event. Returns the processed kind.
    pub(crate) fn advance(&mut self) -> Option<YardEvent> {
        let Reverse(entry) = self.agenda.pop()?;
        self.now = entry.at;
        match entry.event {
            YardEvent::Check => {
                self.schedule(self.settings.check_interval, YardEvent::Check);
            }
            YardEvent::Arrival => self.on_arrival(),
            YardEvent::CraneArrived => self.on_crane_arrived(),
            YardEvent::HandoverCleared => self.on_handover_cleared(),
            YardEvent::HandoverReady => self.handover.ready = true,
        }
        self.refresh_ready();
        self.release_held_arrival();
        self.start_next_move();
        Some(entry.event)
    }

    /// Whether the crane is idle with nothing queued.
    pub(crate) fn needs_plan(&self) -> bool {
        self.crane.active_move.is_none() && self.crane.load.is_none() && self.pending.is_empty()
    }

    /// Replace the queued moves with `schedule`.
    pub(crate) fn set_schedule(&mut self, schedule: CraneSchedule) -> Result<(), StaleSequence> {
        if let Some(current) = self
            .last_sequence
            .filter(|current| schedule.sequence_nr < *current)
        {
            return Err(StaleSequence {
                received: schedule.sequence_nr,
                current,
            });
        }
        self.last_sequence = Some(schedule.sequence_nr);
        self.pending = schedule.moves.into();
        Ok(())
    }

    /// Start the first executable queued move if the crane is free.
    ///
    /// Moves that cannot be executed in the current state are dropped and
    /// counted as invalid.
    pub(crate) fn start_next_move(&mut self) {
        if self.crane.active_move.is_some() || self.crane.load.is_some() {
            return;
        }
        while let Some(crane_move) = self.pending.pop_front() {
            if let Err(reason) = self.check_move(&crane_move) {
                self.kpis.invalid_moves = self.kpis.invalid_moves.saturating_add(1);
                debug!(
                    block_id = crane_move.block_id,
                    source_id = crane_move.source_id,
                    target_id = crane_move.target_id,
                    reason,
                    "Skipping invalid crane move"
                );
                continue;
            }

            let Some(block) = self
                .stack_mut(crane_move.source_id)
                .and_then(|stack| stack.blocks.pop())
            else {
                continue;
            };

            let duration = self.move_duration(&crane_move);
            self.crane.load = Some(block);
            self.crane.active_move = Some(crane_move);
            self.schedule(duration, YardEvent::CraneArrived);
            return;
        }
    }

    /// Snapshot of the yard at the current time.
    pub(crate) fn world(&self) -> World {
        let crane_schedule = (!self.pending.is_empty()).then(|| CraneSchedule {
            sequence_nr: self.last_sequence.unwrap_or_default(),
            moves: self.pending.iter().copied().collect(),
        });
        World {
            now: self.now,
            production: self.production.clone(),
            buffers: self.buffers.clone(),
            handover: self.handover.clone(),
            crane: self.crane.clone(),
            crane_schedule,
            kpis: self.kpis.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    fn on_arrival(&mut self) {
        let block = self.new_block();
        self.kpis.blocks_arrived = self.kpis.blocks_arrived.saturating_add(1);
        if self.production.has_room() {
            self.production.blocks.push(block);
            self.schedule_next_arrival();
        } else {
            debug!(block_id = block.id, "Production full, arrival blocked");
            self.held = Some(HeldArrival {
                block,
                blocked_since: self.now,
            });
        }
    }

    fn on_crane_arrived(&mut self) {
        let Some(crane_move) = self.crane.active_move.take() else {
            return;
        };
        let Some(block) = self.crane.load.take() else {
            return;
        };
        self.crane.position = crane_move.target_id;
        self.kpis.crane_manipulations = self.kpis.crane_manipulations.saturating_add(1);

        if crane_move.target_id == self.handover.id {
            self.handover.block = Some(block);
            let clear = self
                .sampler
                .uniform(self.settings.min_clear_time, self.settings.max_clear_time);
            self.schedule(clear, YardEvent::HandoverCleared);
        } else if let Some(target) = self.stack_mut(crane_move.target_id) {
            target.blocks.push(block);
        } else {
            warn!(
                target_id = crane_move.target_id,
                "Crane target vanished, dropping block"
            );
        }
    }

    fn on_handover_cleared(&mut self) {
        let Some(block) = self.handover.block.take() else {
            return;
        };
        let kpis = &mut self.kpis;
        kpis.delivered_blocks = kpis.delivered_blocks.saturating_add(1);
        if self.now <= block.due {
            kpis.total_blocks_on_time = kpis.total_blocks_on_time.saturating_add(1);
        } else {
            kpis.tardiness_sum = kpis
                .tardiness_sum
                .saturating_add(self.now.saturating_sub(block.due));
        }
        self.lead_time_total = self
            .lead_time_total
            .saturating_add(self.now.saturating_sub(block.arrival));

        let delivered = u32::try_from(kpis.delivered_blocks).unwrap_or(u32::MAX);
        kpis.lead_time_mean = self
            .lead_time_total
            .checked_div(delivered)
            .unwrap_or_default();
        kpis.service_level_mean = ratio(kpis.total_blocks_on_time, kpis.delivered_blocks);

        self.handover.ready = false;
        let ready_in = self.sampler.normal(
            self.settings.handover_time_mean,
            self.settings.handover_time_std,
        );
        self.schedule(ready_in, YardEvent::HandoverReady);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn schedule(&mut self, after: Duration, event: YardEvent) {
        let at = self.now.saturating_add(after);
        self.next_seq = self.next_seq.saturating_add(1);
        self.agenda.push(Reverse(Scheduled {
            at,
            seq: self.next_seq,
            event,
        }));
    }

    fn schedule_next_arrival(&mut self) {
        let gap = self.sampler.normal(
            self.settings.arrival_time_mean,
            self.settings.arrival_time_std,
        );
        self.schedule(gap, YardEvent::Arrival);
    }

    fn new_block(&mut self) -> Block {
        let id = self.next_block_id;
        self.next_block_id = self.next_block_id.saturating_add(1);

        let window = self
            .sampler
            .normal(self.settings.due_time_mean, self.settings.due_time_std)
            .max(self.settings.due_time_min);
        let factor = self
            .sampler
            .uniform_f64(self.settings.ready_factor_min, self.settings.ready_factor_max);
        let ready_after =
            Duration::try_from_secs_f64(window.as_secs_f64() * factor).unwrap_or(window);

        let ready_at = self.now.saturating_add(ready_after);
        Block {
            id,
            arrival: self.now,
            ready_at,
            due: self.now.saturating_add(window),
            ready: ready_at <= self.now,
        }
    }

    fn place_initial_blocks(&mut self) {
        let mut remaining = self.settings.initial_number_of_blocks;
        while remaining > 0 {
            let block = self.new_block();
            let slot = self
                .buffers
                .iter_mut()
                .filter(|buffer| buffer.has_room())
                .min_by_key(|buffer| buffer.blocks.len());
            if let Some(buffer) = slot {
                buffer.blocks.push(block);
            } else if self.production.has_room() {
                self.production.blocks.push(block);
            } else {
                warn!(
                    dropped = remaining,
                    "Yard full, dropping remaining initial blocks"
                );
                break;
            }
            remaining = remaining.saturating_sub(1);
        }
    }

    fn release_held_arrival(&mut self) {
        if !self.production.has_room() {
            return;
        }
        let Some(held) = self.held.take() else {
            return;
        };
        self.kpis.production_blocked_time = self
            .kpis
            .production_blocked_time
            .saturating_add(self.now.saturating_sub(held.blocked_since));
        self.production.blocks.push(held.block);
        self.schedule_next_arrival();
    }

    fn refresh_ready(&mut self) {
        let now = self.now;
        let blocks = self
            .production
            .blocks
            .iter_mut()
            .chain(self.buffers.iter_mut().flat_map(|b| b.blocks.iter_mut()))
            .chain(self.crane.load.iter_mut())
            .chain(self.handover.block.iter_mut());
        for block in blocks {
            block.ready = block.ready_at <= now;
        }
    }

    fn stack(&self, id: u32) -> Option<&Stack> {
        if id == PRODUCTION_ID {
            Some(&self.production)
        } else {
            self.buffers.iter().find(|b| b.id == id)
        }
    }

    fn stack_mut(&mut self, id: u32) -> Option<&mut Stack> {
        if id == PRODUCTION_ID {
            Some(&mut self.production)
        } else {
            self.buffers.iter_mut().find(|b| b.id == id)
        }
    }

    fn check_move(&self, crane_move: &CraneMove) -> Result<(), &'static str> {
        let source = self.stack(crane_move.source_id).ok_or("unknown source")?;
        let block = source.top().ok_or("source stack is empty")?;
        if block.id != crane_move.block_id {
            return Err("block is not on top of source");
        }
        if crane_move.target_id == crane_move.source_id {
            return Err("source and target are the same");
        }
        if crane_move.target_id == self.handover.id {
            if !self.handover.accepts_block() {
                return Err("handover not ready");
            }
            if !block.ready {
                return Err("block not ready");
            }
            return Ok(());
        }
        if crane_move.target_id == PRODUCTION_ID {
            return Err("production is not a target");
        }
        let target = self.stack(crane_move.target_id).ok_or("unknown target")?;
        if !target.has_room() {
            return Err("target stack is full");
        }
        Ok(())
    }

    fn move_duration(&mut self, crane_move: &CraneMove) -> Duration {
        let empty = self.travel(self.crane.position, crane_move.source_id);
        let pick = self.hoist();
        let loaded = self.travel(crane_move.source_id, crane_move.target_id);
        let drop = self.hoist();
        empty
            .saturating_add(pick)
            .saturating_add(loaded)
            .saturating_add(drop)
            .max(MIN_MOVE_TIME)
    }

    fn travel(&mut self, from: u32, to: u32) -> Duration {
        let per_position = self.sampler.normal(
            self.settings.crane_move_time_mean,
            self.settings.crane_move_time_std,
        );
        let distance = f64::from(from.abs_diff(to));
        Duration::try_from_secs_f64(per_position.as_secs_f64() * distance).unwrap_or(per_position)
    }

    fn hoist(&mut self) -> Duration {
        self.sampler.normal(
            self.settings.hoist_move_time_mean,
            self.settings.hoist_move_time_std,
        )
    }
}

/// `part / whole`, or zero when nothing has been counted yet.
#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::fixtures::small_yard;

    /// Advance until the crane has finished whatever it is doing.
    fn settle_crane(yard: &mut Yard) {
        while yard.crane.active_move.is_some() {
            yard.advance().unwrap();
        }
    }

    #[test]
    fn initial_blocks_are_spread_over_buffers() {
        let yard = Yard::new(small_yard());
        let heights: Vec<usize> = yard.buffers.iter().map(|b| b.blocks.len()).collect();
        assert_eq!(heights, vec![2, 2, 2]);
        assert!(yard.production.blocks.is_empty());
    }

    #[test]
    fn overflowing_initial_blocks_fill_production_then_drop() {
        let mut settings = small_yard();
        settings.buffer_max_height = 1;
        settings.initial_number_of_blocks = 20;
        let yard = Yard::new(settings);
        assert!(yard.buffers.iter().all(|b| b.blocks.len() == 1));
        assert_eq!(yard.production.blocks.len(), 4);
    }

    #[test]
    fn events_come_out_in_time_order() {
        let mut yard = Yard::new(small_yard());
        let mut last = Duration::ZERO;
        for _ in 0..200 {
            yard.advance().unwrap();
            assert!(yard.now() >= last);
            last = yard.now();
        }
    }

    #[test]
    fn stale_schedule_is_refused() {
        let mut yard = Yard::new(small_yard());
        yard.set_schedule(CraneSchedule {
            sequence_nr: 5,
            moves: vec![],
        })
        .unwrap();
        let err = yard
            .set_schedule(CraneSchedule {
                sequence_nr: 4,
                moves: vec![],
            })
            .unwrap_err();
        assert_eq!(
            err,
            StaleSequence {
                received: 4,
                current: 5
            }
        );
    }

    #[test]
    fn invalid_move_is_counted_and_skipped() {
        let mut yard = Yard::new(small_yard());
        yard.set_schedule(CraneSchedule::single(
            1,
            CraneMove {
                block_id: 999,
                source_id: 1,
                target_id: 2,
            },
        ))
        .unwrap();
        yard.start_next_move();
        assert_eq!(yard.kpis.invalid_moves, 1);
        assert!(yard.crane.active_move.is_none());
        assert!(yard.needs_plan());
    }

    #[test]
    fn relocation_moves_the_block() {
        let mut yard = Yard::new(small_yard());
        let top = yard.buffers[0].top().unwrap().id;
        yard.set_schedule(CraneSchedule::single(
            1,
            CraneMove {
                block_id: top,
                source_id: 1,
                target_id: 3,
            },
        ))
        .unwrap();
        yard.start_next_move();
        assert_eq!(yard.crane.load.map(|b| b.id), Some(top));
        assert_eq!(yard.buffers[0].blocks.len(), 1);

        settle_crane(&mut yard);
        assert_eq!(yard.buffers[2].top().map(|b| b.id), Some(top));
        assert_eq!(yard.crane.position, 3);
        assert_eq!(yard.kpis.crane_manipulations, 1);
    }

    #[test]
    fn delivery_is_cleared_and_counted() {
        let mut settings = small_yard();
        settings.ready_factor_min = 0.0;
        settings.ready_factor_max = 0.0;
        let mut yard = Yard::new(settings);
        let top = yard.buffers[1].top().unwrap().id;
        yard.set_schedule(CraneSchedule::single(
            1,
            CraneMove {
                block_id: top,
                source_id: 2,
                target_id: 4,
            },
        ))
        .unwrap();
        yard.start_next_move();
        settle_crane(&mut yard);
        assert_eq!(yard.handover.block.map(|b| b.id), Some(top));

        while yard.handover.block.is_some() {
            yard.advance().unwrap();
        }
        assert_eq!(yard.kpis.delivered_blocks, 1);
        assert_eq!(yard.kpis.total_blocks_on_time, 1);
        assert!(!yard.handover.ready);
    }

    #[test]
    fn full_production_blocks_arrivals() {
        let mut settings = small_yard();
        settings.production_max_height = 1;
        settings.initial_number_of_blocks = 0;
        let mut yard = Yard::new(settings);
        while yard.kpis.blocks_arrived < 2 {
            yard.advance().unwrap();
        }
        assert_eq!(yard.production.blocks.len(), 1);
        assert!(yard.held.is_some());

        // Free production; the held block is placed on the next event.
        let top = yard.production.top().unwrap().id;
        yard.set_schedule(CraneSchedule::single(
            1,
            CraneMove {
                block_id: top,
                source_id: PRODUCTION_ID,
                target_id: 1,
            },
        ))
        .unwrap();
        yard.start_next_move();
        yard.advance().unwrap();
        assert!(yard.held.is_none());
        assert!(yard.kpis.production_blocked_time > Duration::ZERO);
    }

    #[test]
    fn snapshot_lists_queued_moves() {
        let mut yard = Yard::new(small_yard());
        let moves = vec![
            CraneMove {
                block_id: 1,
                source_id: 1,
                target_id: 2,
            };
            2
        ];
        yard.set_schedule(CraneSchedule {
            sequence_nr: 3,
            moves,
        })
        .unwrap();
        let world = yard.world();
        assert_eq!(world.crane_schedule.map(|s| s.moves.len()), Some(2));
        assert_eq!(world.buffers.len(), 3);
        assert_eq!(world.handover.id, 4);
    }
}
