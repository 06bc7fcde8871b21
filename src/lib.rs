//! Real-time broadcast chat.
//!
//! `POST /messages` validates a submission and broadcasts it as a
//! `MessageSent` event on the public `messages` channel; clients hold a
//! WebSocket on `/ws` and subscribe to channels to receive those events. The
//! [`client`] module is the subscriber side.

pub mod broadcast;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod message;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::ServerConfig, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/messages",
            get(routes::message_history).post(routes::send_message),
        )
        .route("/ws", get(ws::handle_websocket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Serves the chat on an already bound listener until the process is interrupted.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub async fn run_server(config: &ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.channel_capacity);
    let listener = TcpListener::bind(config.addr()).await?;

    info!("chat server listening on http://{}", listener.local_addr()?);
    serve(listener, state).await?;
    info!("chat server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
