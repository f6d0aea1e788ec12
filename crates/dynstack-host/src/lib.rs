//! Session host for the DynStack hot-storage simulation.
//!
//! The host runs one simulation session at a time and connects it to the
//! outside world:
//!
//! - **Sessions** ([`session`]): start, stop and observe runs, either
//!   cooperatively on the async runtime or lock-step on a blocking thread
//! - **Schedule ingestion** ([`ingest`]): decode crane schedules arriving
//!   on the bus and apply them to the running engine in receipt order
//! - **World publishing** ([`publisher`]): serialize every world change and
//!   enqueue it on the outbound queue under the `world` topic
//! - **Settings** ([`resolver`]): the preset catalog and settings codec
//! - **Control API** ([`control`], [`router`], [`server`]): HTTP endpoints
//!   for operators
//!
//! # Architecture
//!
//! The controller never talks to NATS directly. It is handed a set of
//! [`HostCapabilities`]; [`transport`] owns the tasks that pump the
//! outbound queue onto the bus and feed inbound schedules back in.
//!
//! [`HostCapabilities`]: capabilities::HostCapabilities

pub mod capabilities;
pub mod config;
pub mod control;
pub mod error;
pub mod ingest;
pub mod publisher;
pub mod remote_policy;
pub mod resolver;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub use router::build_router;
pub use server::{ServerError, start_server};
pub use session::{SessionController, SessionError, SessionStatus};
