//! Control API server lifecycle.
//!
//! Start requests hold their connection open until the run ends, so a
//! plain graceful shutdown would wait out a whole session. When the
//! shutdown signal fires the server first stops the active session; the
//! pending start request then answers `Run aborted` and the server drains.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ControlConfig;
use crate::control::ControlState;
use crate::router::build_router;

/// Errors that can occur when starting or running the control server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Serve the control API until `shutdown` resolves.
///
/// On shutdown the active session, if any, is stopped before in-flight
/// requests are drained.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server<S>(
    config: &ControlConfig,
    state: ControlState,
    shutdown: S,
) -> Result<(), ServerError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    info!(%addr, "Control API listening");

    let controller = Arc::clone(&state.controller);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            if controller.stop_async().await {
                info!("Active session stopped for shutdown");
            }
        })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!("Control API stopped");
    Ok(())
}
