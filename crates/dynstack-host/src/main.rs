//! DynStack session host binary.
//!
//! Wires the session controller to NATS and serves the control API.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `dynstack-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Load the preset catalog
//! 4. Connect to NATS and start the outbound pump
//! 5. Build the session controller and its capabilities
//! 6. Subscribe to crane schedules
//! 7. Start the configured autostart run, if any
//! 8. Serve the control API until ctrl-c, stopping any active session

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use dynstack_host::capabilities::{HostCapabilities, OutboundQueue, TracingSessionLogger};
use dynstack_host::config::HostConfig;
use dynstack_host::control::ControlState;
use dynstack_host::remote_policy::NatsPolicyConnector;
use dynstack_host::resolver::{PresetStore, SettingsResolver};
use dynstack_host::session::{SessionController, SessionOptions, YardEngineFactory};
use dynstack_host::{server, transport};
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "dynstack-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        nats_url = config.transport.nats_url,
        subject_prefix = config.transport.subject_prefix,
        control_port = config.control.port,
        time_scale = config.session.time_scale,
        "dynstack-host starting"
    );

    // 3. Load the preset catalog.
    let store = match &config.session.presets_file {
        Some(path) => PresetStore::from_file(path)
            .with_context(|| format!("loading presets from {}", path.display()))?,
        None => PresetStore::builtin().context("loading built-in presets")?,
    };
    info!(presets = store.len(), "Preset catalog loaded");
    let resolver = SettingsResolver::new(store);

    // 4. Connect to NATS and start the outbound pump.
    let client = transport::connect(&config.transport.nats_url).await?;
    let (queue, outbound_rx) = OutboundQueue::new();
    let _pump = transport::spawn_outbound_pump(
        client.clone(),
        config.transport.subject_prefix.clone(),
        outbound_rx,
    );

    // 5. Build the session controller.
    let capabilities = HostCapabilities {
        outbound: Arc::new(queue),
        logger: Arc::new(TracingSessionLogger),
        remote: Arc::new(NatsPolicyConnector::new(
            config.transport.subject_prefix.clone(),
            config.session.remote_policy_timeout(),
            Handle::current(),
        )),
    };
    let controller = Arc::new(SessionController::new(
        YardEngineFactory,
        resolver,
        capabilities,
        SessionOptions::from(&config.session),
    ));

    // 6. Subscribe to crane schedules.
    let schedule_subject = config.transport.subject(&config.transport.schedule_topic);
    let subscriber = transport::subscribe_schedules(&client, schedule_subject).await?;
    let _listener = transport::spawn_schedule_listener(Arc::clone(&controller), subscriber);

    // 7. Autostart.
    if let Some(autostart) = config.session.autostart.clone() {
        let bytes = controller
            .default_settings(&autostart.preset)
            .with_context(|| format!("resolving autostart preset {}", autostart.preset))?;
        let autostart_controller = Arc::clone(&controller);
        tokio::spawn(async move {
            info!(preset = autostart.preset, policy = %autostart.policy, "Autostarting run");
            match autostart_controller
                .start_async(&bytes, autostart.policy)
                .await
            {
                Ok(completed) => info!(completed, "Autostart run ended"),
                Err(e) => error!(error = %e, "Autostart run failed"),
            }
        });
    }

    // 8. Serve the control API until ctrl-c.
    let state = ControlState::new(Arc::clone(&controller));
    server::start_server(&config.control, state, shutdown_signal())
        .await
        .context("control API server")?;

    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS client on shutdown");
    }
    info!("dynstack-host stopped");
    Ok(())
}

/// Resolves on ctrl-c. A failure to install the handler is logged and
/// treated as a shutdown request.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for ctrl-c, shutting down"),
    }
}

/// Load `dynstack-config.yaml` from the working directory, falling back to
/// defaults, then apply environment overrides.
fn load_config() -> anyhow::Result<HostConfig> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        return HostConfig::from_file(path).with_context(|| format!("loading {CONFIG_FILE}"));
    }
    let mut config = HostConfig::default();
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    Ok(config)
}
