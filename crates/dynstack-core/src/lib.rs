//! Reference simulation engine for the DynStack hot-storage yard.
//!
//! The yard is a discrete-event model: blocks arrive on a production
//! stack, a single crane relocates them across buffer stacks, and ready
//! blocks leave through a handover point. The host only ever talks to
//! the engine through the traits in [`engine`], so any engine honoring
//! that contract can replace [`YardSimulation`].
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock pacing of simulated time.
//! - [`engine`] -- [`SimulationEngine`], [`WorldSource`], [`WorldListener`]
//!   and the [`YardSimulation`] implementation.
//! - [`policy`] -- [`CranePolicy`] trait with the embedded automatic and
//!   rule-based policies.
//! - [`sampling`] -- Seeded samplers for stochastic timings.
//! - [`settings`] -- Validation of run settings.
//!
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`WorldSource`]: engine::WorldSource
//! [`WorldListener`]: engine::WorldListener
//! [`YardSimulation`]: engine::YardSimulation
//! [`CranePolicy`]: policy::CranePolicy

pub mod clock;
pub mod engine;
pub mod policy;
pub mod sampling;
pub mod settings;

mod yard;

#[cfg(test)]
mod fixtures;
