//! Synchronous adapter to a remote crane policy over NATS request/reply.
//!
//! In lock-step mode the engine asks the policy for a schedule whenever the
//! crane falls idle and waits for the answer before simulating further.
//! [`NatsRemotePolicy`] turns that call into a NATS request on
//! `{prefix}.policy.{session_id}` carrying the serialized world.
//!
//! # Sync/Async Bridge
//!
//! [`CranePolicy::plan`] is synchronous and runs on the thread executing
//! the blocking run (a `spawn_blocking` worker). The adapter keeps a
//! [`Handle`] to the host runtime and uses [`Handle::block_on`] from that
//! thread.

use std::time::Duration;

use dynstack_core::policy::CranePolicy;
use dynstack_types::{CraneSchedule, SessionId, World};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::capabilities::RemotePolicyConnector;
use crate::session::SessionError;

/// A [`CranePolicy`] answered by a remote agent.
pub struct NatsRemotePolicy {
    client: async_nats::Client,
    subject: String,
    timeout: Duration,
    handle: Handle,
}

impl core::fmt::Debug for NatsRemotePolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NatsRemotePolicy")
            .field("subject", &self.subject)
            .field("timeout_ms", &self.timeout.as_millis())
            .finish_non_exhaustive()
    }
}

impl NatsRemotePolicy {
    /// Create an adapter from a connected client.
    pub const fn new(
        client: async_nats::Client,
        subject: String,
        timeout: Duration,
        handle: Handle,
    ) -> Self {
        Self {
            client,
            subject,
            timeout,
            handle,
        }
    }

    async fn request(&self, world: &World) -> Option<CraneSchedule> {
        let payload = match serde_json::to_vec(world) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize world for remote policy");
                return None;
            }
        };

        let reply = tokio::time::timeout(
            self.timeout,
            self.client.request(self.subject.clone(), payload.into()),
        )
        .await;

        match reply {
            Ok(Ok(message)) if message.payload.is_empty() => None,
            Ok(Ok(message)) => match serde_json::from_slice::<CraneSchedule>(&message.payload) {
                Ok(schedule) => {
                    debug!(
                        sequence_nr = schedule.sequence_nr,
                        moves = schedule.moves.len(),
                        "Remote policy answered"
                    );
                    Some(schedule)
                }
                Err(e) => {
                    warn!(subject = %self.subject, error = %e, "Malformed remote policy reply");
                    None
                }
            },
            Ok(Err(e)) => {
                warn!(subject = %self.subject, error = %e, "Remote policy request failed");
                None
            }
            Err(_elapsed) => {
                warn!(
                    subject = %self.subject,
                    timeout_ms = self.timeout.as_millis(),
                    "Remote policy did not answer in time"
                );
                None
            }
        }
    }
}

impl CranePolicy for NatsRemotePolicy {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn plan(&mut self, world: &World) -> Option<CraneSchedule> {
        self.handle.block_on(self.request(world))
    }
}

/// Connects [`NatsRemotePolicy`] adapters for synchronous runs.
#[derive(Debug, Clone)]
pub struct NatsPolicyConnector {
    subject_prefix: String,
    timeout: Duration,
    handle: Handle,
}

impl NatsPolicyConnector {
    /// Create a connector that bridges into the runtime behind `handle`.
    pub const fn new(subject_prefix: String, timeout: Duration, handle: Handle) -> Self {
        Self {
            subject_prefix,
            timeout,
            handle,
        }
    }

    /// Request subject for a session.
    pub fn subject(&self, session_id: SessionId) -> String {
        format!("{}.policy.{session_id}", self.subject_prefix)
    }
}

impl RemotePolicyConnector for NatsPolicyConnector {
    fn connect(
        &self,
        address: &str,
        session_id: SessionId,
    ) -> Result<Box<dyn CranePolicy>, SessionError> {
        info!(address, %session_id, "Connecting to remote policy");
        let client = self
            .handle
            .block_on(async_nats::connect(address))
            .map_err(|e| SessionError::RemotePolicy {
                message: format!("failed to connect to {address}: {e}"),
            })?;
        Ok(Box::new(NatsRemotePolicy::new(
            client,
            self.subject(session_id),
            self.timeout,
            self.handle.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subject_is_scoped_to_the_session() {
        let connector = NatsPolicyConnector::new(
            String::from("dynstack"),
            Duration::from_secs(1),
            Handle::current(),
        );
        let id = SessionId::new();
        assert_eq!(connector.subject(id), format!("dynstack.policy.{id}"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_policy_is_a_session_error() {
        let connector = NatsPolicyConnector::new(
            String::from("dynstack"),
            Duration::from_millis(100),
            Handle::current(),
        );
        let result = tokio::task::spawn_blocking(move || {
            connector
                .connect("nats://127.0.0.1:1", SessionId::new())
                .map(|_| ())
        })
        .await;
        assert!(matches!(
            result,
            Ok(Err(SessionError::RemotePolicy { .. }))
        ));
    }
}
