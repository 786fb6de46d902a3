mod bootstrap;
mod health;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mostrador_agent::SessionRegistry;
use mostrador_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use mostrador_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    spawn_session_sweeper(
        app.sessions.clone(),
        Duration::from_secs(app.config.sessions.idle_timeout_secs),
        Duration::from_secs(app.config.sessions.sweep_interval_secs),
    );

    if let Some(runner) = app.channel_runner {
        tokio::spawn(async move {
            if let Err(error) = runner.start().await {
                tracing::error!(
                    event_name = "system.channel.terminated",
                    error = %error,
                    "channel runner terminated unexpectedly"
                );
            }
        });
    }

    let state = routes::AppState {
        orchestrator: app.orchestrator.clone(),
        assistant: app.assistant.clone(),
    };
    let router = routes::router(state, app.customers.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "mostrador server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "mostrador server stopping");

    Ok(())
}

/// Periodically drops sessions that have been idle past the configured
/// timeout, so threads for inactive phones do not accumulate forever.
fn spawn_session_sweeper(sessions: Arc<SessionRegistry>, idle: Duration, sweep: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(idle).await;
            if evicted > 0 {
                tracing::debug!(event_name = "session.sweep", evicted, "idle sessions evicted");
            }
        }
    });
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.shutdown.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}
