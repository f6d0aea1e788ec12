//! Capabilities injected into the session host.
//!
//! The controller never reaches for a global socket or logger. It is
//! handed an [`OutboundSink`] for publishing, a [`SessionLogger`] for the
//! lines an operator expects to see per run, and a
//! [`RemotePolicyConnector`] for synchronous runs driven by a remote
//! policy. Tests substitute each of them.

use std::sync::Arc;

use dynstack_core::policy::CranePolicy;
use dynstack_types::SessionId;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::session::SessionError;

/// A tagged message waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Topic tag (`"world"` for snapshots).
    pub topic: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
}

/// Append-only, thread-safe outbound queue.
pub trait OutboundSink: Send + Sync {
    /// Enqueue a message. Never blocks and never fails the caller.
    fn enqueue(&self, message: OutboundMessage);
}

/// Receiving half of an [`OutboundQueue`].
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// [`OutboundSink`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl OutboundQueue {
    /// Create a queue and the receiver that drains it.
    pub fn new() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutboundSink for OutboundQueue {
    fn enqueue(&self, message: OutboundMessage) {
        if self.tx.send(message).is_err() {
            warn!("Outbound queue closed, dropping message");
        }
    }
}

/// Sink for the per-run log lines ("Starting sim", "Run completed").
pub trait SessionLogger: Send + Sync {
    /// Write one line.
    fn write_line(&self, line: &str);
}

/// [`SessionLogger`] that forwards to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSessionLogger;

impl SessionLogger for TracingSessionLogger {
    fn write_line(&self, line: &str) {
        info!(target: "dynstack_host::session_log", "{line}");
    }
}

/// Builds the synchronous adapter to a remote policy.
pub trait RemotePolicyConnector: Send + Sync {
    /// Connect to the policy at `address` for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemotePolicy`] if the policy cannot be
    /// reached.
    fn connect(
        &self,
        address: &str,
        session_id: SessionId,
    ) -> Result<Box<dyn CranePolicy>, SessionError>;
}

/// The full set of capabilities handed to a
/// [`SessionController`](crate::session::SessionController).
#[derive(Clone)]
pub struct HostCapabilities {
    /// Where world snapshots are enqueued.
    pub outbound: Arc<dyn OutboundSink>,
    /// Per-run log lines.
    pub logger: Arc<dyn SessionLogger>,
    /// Remote policy factory for synchronous runs.
    pub remote: Arc<dyn RemotePolicyConnector>,
}

impl core::fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostCapabilities").finish_non_exhaustive()
    }
}
