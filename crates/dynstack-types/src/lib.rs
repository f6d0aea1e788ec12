//! Shared type definitions for the DynStack hot-storage simulation.
//!
//! This crate is the single source of truth for the payloads exchanged
//! between the session host, the simulation engine, and external policy
//! agents. Everything here is plain data with `serde` derives; behavior
//! lives in `dynstack-core` and `dynstack-host`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers ([`SessionId`])
//! - [`enums`] -- Policy modes and session states
//! - [`settings`] -- Immutable run parameters ([`Settings`])
//! - [`schedule`] -- Crane move instructions ([`CraneSchedule`])
//! - [`world`] -- Point-in-time yard snapshots ([`World`])
//! - [`seconds`] -- Serde helper that writes durations as seconds

pub mod enums;
pub mod ids;
pub mod schedule;
pub mod seconds;
pub mod settings;
pub mod world;

// Re-export all public types at crate root for convenience.
pub use enums::{PolicyMode, SessionState};
pub use ids::SessionId;
pub use schedule::{CraneMove, CraneSchedule};
pub use settings::Settings;
pub use world::{Block, Crane, Handover, Performance, Stack, World, PRODUCTION_ID};
