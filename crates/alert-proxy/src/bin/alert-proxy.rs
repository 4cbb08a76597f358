//! Alert-proxy service binary: init tracing, load config and the initial
//! target registry snapshot, build the router, bind and serve. Mirrors the
//! teacher's `integrations::bin::linear` bootstrap shape.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alert_proxy::config::{Config, ConfigOverrides};
use alert_proxy::server::{build_router, AppState};
use alert_proxy::targets::TargetRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("alert_proxy=info".parse()?))
        .init();

    info!("Starting alert-proxy service...");

    let mut config = Config::default();
    if let Ok(path) = std::env::var("ALERT_PROXY_CONFIG_FILE") {
        match ConfigOverrides::load_from_file(&path) {
            Ok(overrides) => {
                info!(path = %path, "Applying configuration file overrides");
                config.apply_overrides(&overrides);
            }
            Err(e) => {
                error!(error = %e, path = %path, "Failed to load configuration file");
            }
        }
    }
    config.validate().context("Invalid configuration")?;

    let registry = match &config.targets_file {
        Some(path) => TargetRegistry::load_from_file(path)
            .with_context(|| format!("Failed to load target registry from {path}"))?,
        None => {
            warn!("No ALERT_PROXY_TARGETS_FILE configured; starting with an empty target registry");
            TargetRegistry::empty()
        }
    };

    info!(
        targets = registry.all_targets().len(),
        "Target registry loaded"
    );

    let state = Arc::new(AppState::new(config.clone(), registry));
    state.mark_ready();

    if let Some(path) = state.config.targets_file.clone() {
        let reload_registry = state.registry.clone();
        let interval = state.config.targets_reload_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = reload_registry.reload_from_file(&path) {
                    warn!(error = %e, path = %path, "best-effort target registry reload failed, keeping previous snapshot");
                }
            }
        });
    }

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(port = config.port, "alert-proxy listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
