//! Control API handlers for starting, stopping and inspecting sessions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/session/start` | Run a session, respond when it ends |
//! | `POST` | `/api/session/start-sync` | Run a lock-step session on a blocking thread |
//! | `POST` | `/api/session/stop` | Signal the active session to halt |
//! | `GET` | `/api/session/status` | Current or most recent session status |
//! | `GET` | `/api/settings` | List preset ids |
//! | `GET` | `/api/settings/{preset}` | Encoded settings for a preset |
//!
//! Start requests take the encoded settings as the request body, or a
//! `preset` query parameter naming a catalog entry.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use dynstack_types::{PolicyMode, SessionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ControlError;
use crate::session::{SessionController, SessionStatus, YardEngineFactory};

/// The controller type served by the host binary.
pub type HostController = SessionController<YardEngineFactory>;

/// Shared state of the control API.
#[derive(Debug, Clone)]
pub struct ControlState {
    /// The session controller.
    pub controller: Arc<HostController>,
}

impl ControlState {
    /// Wrap a controller.
    pub const fn new(controller: Arc<HostController>) -> Self {
        Self { controller }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query of `POST /api/session/start`.
#[derive(Debug, Deserialize)]
pub struct StartQuery {
    /// Decision maker (default: `external`).
    #[serde(default = "default_policy")]
    pub policy: PolicyMode,
    /// Run a catalog preset instead of the request body.
    pub preset: Option<String>,
}

const fn default_policy() -> PolicyMode {
    PolicyMode::External
}

/// Query of `POST /api/session/start-sync`.
#[derive(Debug, Deserialize)]
pub struct StartSyncQuery {
    /// Address of the remote policy.
    #[serde(default)]
    pub remote_address: String,
    /// Session id announced to the remote policy (generated when absent).
    pub session_id: Option<Uuid>,
    /// Pace the run against the wall clock.
    #[serde(default)]
    pub simulate_async: bool,
    /// Use the embedded rule-based policy.
    #[serde(default)]
    pub use_integrated_policy: bool,
    /// Run a catalog preset instead of the request body.
    pub preset: Option<String>,
}

/// Result of a finished run.
#[derive(Debug, Serialize)]
struct RunResponse {
    /// Whether the simulation reached its horizon.
    completed: bool,
    /// Human-readable message.
    message: &'static str,
}

impl RunResponse {
    const fn from_completed(completed: bool) -> Self {
        Self {
            completed,
            message: if completed {
                "Run completed"
            } else {
                "Run aborted"
            },
        }
    }
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
struct ControlResponse {
    ok: bool,
    message: &'static str,
}

/// Body of `GET /api/session/status`.
#[derive(Debug, Serialize)]
struct StatusResponse {
    /// Whether a session is running right now.
    active: bool,
    /// Current or most recent session.
    session: Option<SessionStatus>,
}

/// Body of `GET /api/settings`.
#[derive(Debug, Serialize)]
struct PresetList {
    presets: Vec<String>,
    default: &'static str,
}

fn settings_bytes(
    controller: &HostController,
    preset: Option<&str>,
    body: Bytes,
) -> Result<Vec<u8>, ControlError> {
    match preset {
        Some(preset) => Ok(controller.default_settings(preset)?),
        None if body.is_empty() => Err(ControlError::BadRequest(
            "request body must carry encoded settings, or name a preset".to_owned(),
        )),
        None => Ok(body.to_vec()),
    }
}

// ---------------------------------------------------------------------------
// POST /api/session/start
// ---------------------------------------------------------------------------

/// Run a session on the async runtime and respond once it has ended.
pub async fn start(
    State(state): State<ControlState>,
    Query(query): Query<StartQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ControlError> {
    let bytes = settings_bytes(&state.controller, query.preset.as_deref(), body)?;
    let completed = state.controller.start_async(&bytes, query.policy).await?;
    Ok(Json(RunResponse::from_completed(completed)))
}

// ---------------------------------------------------------------------------
// POST /api/session/start-sync
// ---------------------------------------------------------------------------

/// Run a lock-step session on a blocking worker and respond once it has
/// ended.
pub async fn start_sync(
    State(state): State<ControlState>,
    Query(query): Query<StartSyncQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ControlError> {
    let bytes = settings_bytes(&state.controller, query.preset.as_deref(), body)?;
    if !query.use_integrated_policy && query.remote_address.is_empty() {
        return Err(ControlError::BadRequest(
            "remote_address is required without use_integrated_policy".to_owned(),
        ));
    }
    let session_id = query.session_id.map_or_else(SessionId::new, SessionId::from);

    let controller = Arc::clone(&state.controller);
    let completed = tokio::task::spawn_blocking(move || {
        controller.start_synchronous(
            &bytes,
            &query.remote_address,
            session_id,
            query.simulate_async,
            query.use_integrated_policy,
        )
    })
    .await
    .map_err(|e| ControlError::Internal(format!("synchronous run panicked: {e}")))??;

    Ok(Json(RunResponse::from_completed(completed)))
}

// ---------------------------------------------------------------------------
// POST /api/session/stop
// ---------------------------------------------------------------------------

/// Signal the active session to halt. Does not wait for the run to end.
pub async fn stop(State(state): State<ControlState>) -> impl IntoResponse {
    let stopped = state.controller.stop_async().await;
    Json(ControlResponse {
        ok: stopped,
        message: if stopped {
            "Stop signal sent"
        } else {
            "No active session"
        },
    })
}

// ---------------------------------------------------------------------------
// GET /api/session/status
// ---------------------------------------------------------------------------

/// Current or most recent session status.
pub async fn status(State(state): State<ControlState>) -> impl IntoResponse {
    let session = state.controller.status();
    Json(StatusResponse {
        active: session.as_ref().is_some_and(|s| !s.state.is_terminal()),
        session,
    })
}

// ---------------------------------------------------------------------------
// GET /api/settings
// ---------------------------------------------------------------------------

/// List the preset catalog.
pub async fn list_presets(State(state): State<ControlState>) -> impl IntoResponse {
    Json(PresetList {
        presets: state
            .controller
            .resolver()
            .store()
            .ids()
            .map(str::to_owned)
            .collect(),
        default: crate::resolver::DEFAULT_PRESET,
    })
}

// ---------------------------------------------------------------------------
// GET /api/settings/{preset}
// ---------------------------------------------------------------------------

/// Encoded settings for a preset.
pub async fn get_preset(
    State(state): State<ControlState>,
    Path(preset): Path<String>,
) -> Result<impl IntoResponse, ControlError> {
    let bytes = state.controller.default_settings(&preset)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}
