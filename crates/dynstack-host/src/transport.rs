//! NATS transport for the session host.
//!
//! Two long-lived tasks connect the controller to the message bus:
//!
//! - the outbound pump drains the [`OutboundQueue`] and publishes each
//!   message on `{prefix}.{topic}`;
//! - the schedule listener reads `{prefix}.{schedule_topic}` and hands each
//!   payload to [`SessionController::on_schedule_message`], awaiting it
//!   before reading the next one so schedules apply in receipt order.
//!
//! [`OutboundQueue`]: crate::capabilities::OutboundQueue

use std::sync::Arc;

use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capabilities::OutboundReceiver;
use crate::session::{EngineFactory, SessionController};

/// Errors raised while setting up the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to or subscribe on the NATS server.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the failure.
        message: String,
    },
}

/// Connect to a NATS server.
///
/// # Errors
///
/// Returns [`TransportError::Nats`] if the connection cannot be established.
pub async fn connect(url: &str) -> Result<async_nats::Client, TransportError> {
    info!(url, "Connecting to NATS server");
    let client = async_nats::connect(url)
        .await
        .map_err(|e| TransportError::Nats {
            message: format!("failed to connect to {url}: {e}"),
        })?;
    info!("NATS connection established");
    Ok(client)
}

/// Spawn the task publishing queued messages on `{prefix}.{topic}`.
///
/// Publishing is fire-and-forget: failures are logged and the message is
/// dropped. The task ends when every queue sender is gone.
pub fn spawn_outbound_pump(
    client: async_nats::Client,
    subject_prefix: String,
    mut rx: OutboundReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let subject = format!("{subject_prefix}.{}", message.topic);
            if let Err(e) = client.publish(subject.clone(), message.payload.into()).await {
                warn!(subject, error = %e, "Failed to publish outbound message");
            }
        }
        debug!("Outbound queue closed, pump exiting");
    })
}

/// Subscribe to the schedule subject.
///
/// # Errors
///
/// Returns [`TransportError::Nats`] if the subscription fails.
pub async fn subscribe_schedules(
    client: &async_nats::Client,
    subject: String,
) -> Result<async_nats::Subscriber, TransportError> {
    let subscriber = client
        .subscribe(subject.clone())
        .await
        .map_err(|e| TransportError::Nats {
            message: format!("failed to subscribe to {subject}: {e}"),
        })?;
    info!(subject, "Subscribed to crane schedules");
    Ok(subscriber)
}

/// Spawn the task feeding inbound schedules to the controller.
pub fn spawn_schedule_listener<F: EngineFactory>(
    controller: Arc<SessionController<F>>,
    mut subscriber: async_nats::Subscriber,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = subscriber.next().await {
            let outcome = controller.on_schedule_message(&message.payload).await;
            debug!(subject = %message.subject, ?outcome, "Schedule message handled");
        }
        warn!("Schedule subscription closed");
    })
}
