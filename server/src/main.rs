use std::net::SocketAddr;
use std::sync::Arc;

use arena_server::config::ServerConfig;
use arena_server::dispatch::GameBroadcast;
use arena_server::game_loop::{run_game_loop, GameCommand};
use arena_server::status::status_handler;
use arena_server::ws::{ws_handler, AppState};
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(config.command_queue);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(config.broadcast_capacity);

    // Axum app
    let app_state = AppState {
        game_tx,
        broadcast_tx: broadcast_tx.clone(),
        connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
        trust_forwarded_for: config.trust_forwarded_for,
        max_message_bytes: config.max_message_bytes,
        max_protocol_errors: config.max_protocol_errors,
    };

    // Spawn game loop
    tokio::spawn(async move {
        run_game_loop(game_rx, broadcast_tx, config).await;
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/status", get(status_handler))
        .route("/health", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Arena server listening on {}", listen_addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}
