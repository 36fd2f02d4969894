use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waitline_api::background::Sweeper;
use waitline_api::config::ServerConfig;
use waitline_api::notifications::NotificationDispatcher;
use waitline_api::router::build_app_router;
use waitline_api::state::AppState;
use waitline_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waitline_api=debug,waitline_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Engine wiring ---
    let state = AppState::from_config(config.clone());
    tracing::info!(
        queues = config.queue.seed_queue_ids.len(),
        "Queue engine initialised"
    );

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&state.connections));

    // --- Notification dispatcher ---
    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.connections),
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run(state.bus.subscribe()));

    // --- Sweeper ---
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweeper = Sweeper::new(
        Arc::clone(&state.store),
        Arc::clone(&state.registry),
        Arc::clone(&state.idle),
        config.queue.sweep_interval,
    );
    let sweeper_cancel_clone = sweep_cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel_clone).await;
    });

    tracing::info!("Background services started (heartbeat, dispatcher, sweeper)");

    // --- Router ---
    let connections = Arc::clone(&state.connections);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the sweeper.
    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Sweeper stopped");

    // Close remaining live channels, then stop the delivery side.
    let ws_count = connections.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    connections.shutdown_all().await;

    dispatcher_handle.abort();
    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
