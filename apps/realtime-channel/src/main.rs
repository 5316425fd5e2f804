//! Realtime Channel Binary
//!
//! Connects to the realtime endpoint, subscribes to the configured symbols
//! and logs every update it receives.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin realtime-channel
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `REALTIME_WS_URL`: realtime endpoint (`ws://` or `wss://`)
//!
//! ## Optional
//! - `REALTIME_AUTH_TOKEN`: session token sent after connecting
//! - `REALTIME_SYMBOLS`: comma-separated symbols to subscribe to
//! - `REALTIME_HEALTH_PORT`: health check HTTP port (default: 8082)
//! - `REALTIME_FLASH_WINDOW_MS`: price flash duration (default: 500)
//! - `REALTIME_RECONNECT_*`, `REALTIME_HEARTBEAT_*`: transport tuning
//! - `OTEL_ENABLED`: enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: service name (default: realtime-channel)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use realtime_channel::infrastructure::health::{HealthServer, HealthServerState};
use realtime_channel::infrastructure::notify::TracingNotifier;
use realtime_channel::infrastructure::telemetry;
use realtime_channel::{
    ChallengeEvent, ChannelConfig, ChannelEvent, ListenerCategory, PriceEvent, PriceFlashTracker,
    RealtimeChannel, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Realtime Channel");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = ChannelConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let channel = Arc::new(RealtimeChannel::new(
        config.clone(),
        Arc::new(TracingNotifier),
    ));

    // Log every delivered event, price ticks with their flash direction
    let flash = PriceFlashTracker::new(config.flash_window);
    channel
        .add_listener(ListenerCategory::Price, move |event| {
            log_price_event(event, &flash);
        })
        .detach();
    channel
        .add_listener(ListenerCategory::Trade, |event| {
            if let ChannelEvent::Trade { payload } = event {
                tracing::info!(%payload, "Trade update");
            }
        })
        .detach();
    channel
        .add_listener(ListenerCategory::Challenge, log_challenge_event)
        .detach();

    // Subscribe the configured symbols
    let consumer = channel.register_consumer();
    let changes = channel.subscribe(consumer, &config.symbols);
    tracing::info!(symbols = changes.subscribe.len(), "Initial subscriptions registered");

    channel.start();

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&channel),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Realtime channel ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, channel.stop())
        .await
        .is_err()
    {
        tracing::warn!("Realtime channel did not stop in time");
    }
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, health_task).await;

    tracing::info!("Realtime channel stopped");
    Ok(())
}

fn log_price_event(event: &ChannelEvent, flash: &PriceFlashTracker) {
    let Some(prices) = event.as_price() else {
        return;
    };
    if matches!(prices, PriceEvent::Cleared) {
        flash.clear();
        tracing::info!("Price book cleared after reconnect");
        return;
    }
    for quote in prices.quotes() {
        let direction = flash.observe(quote);
        tracing::info!(
            symbol = %quote.symbol,
            price = %quote.price,
            change = %quote.change,
            change_percent = %quote.change_percent,
            flash = ?direction,
            "Price update"
        );
    }
}

fn log_challenge_event(event: &ChannelEvent) {
    match event.as_challenge() {
        Some(ChallengeEvent::Status(update)) => {
            tracing::info!(status = %update.challenge.status, "Challenge status");
        }
        Some(ChallengeEvent::Warning(warning)) => {
            tracing::warn!(kind = %warning.kind, message = %warning.message, "Challenge warning");
        }
        None => {}
    }
}

/// Log the parsed configuration.
fn log_config(config: &ChannelConfig) {
    tracing::info!(
        url = %config.url,
        authenticated = config.auth_token.is_some(),
        symbols = config.symbols.len(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        connect_timeout_secs = config.websocket.connect_timeout.as_secs(),
        heartbeat_interval_secs = config.websocket.heartbeat_interval.as_secs(),
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        "Transport settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
