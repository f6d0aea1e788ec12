//! World snapshot publishing.
//!
//! [`WorldPublisher`] is registered as an engine listener. On every change
//! notification it serializes the current world and enqueues it under the
//! `"world"` topic. Fire-and-forget: a failed serialization is logged and
//! the snapshot skipped.

use std::sync::Arc;

use dynstack_core::engine::{WorldListener, WorldSource};
use tracing::warn;

use crate::capabilities::{OutboundMessage, OutboundSink};

/// Topic tag of world snapshot messages.
pub const WORLD_TOPIC: &str = "world";

/// Engine listener that enqueues one world message per notification.
pub struct WorldPublisher {
    sink: Arc<dyn OutboundSink>,
}

impl core::fmt::Debug for WorldPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorldPublisher").finish_non_exhaustive()
    }
}

impl WorldPublisher {
    /// Create a publisher writing to `sink`.
    pub fn new(sink: Arc<dyn OutboundSink>) -> Self {
        Self { sink }
    }
}

impl WorldListener for WorldPublisher {
    fn on_world_changed(&self, source: &dyn WorldSource) {
        let world = source.snapshot();
        match serde_json::to_vec(&world) {
            Ok(payload) => self.sink.enqueue(OutboundMessage {
                topic: String::from(WORLD_TOPIC),
                payload,
            }),
            Err(e) => warn!(error = %e, "Failed to serialize world snapshot"),
        }
    }
}
