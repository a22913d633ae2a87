//! Webhook receiver mode
//!
//! Accepts update JSON from Telegram over HTTP and feeds it to the same
//! dispatcher the polling loop uses, via an mpsc channel.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::telegram::Update;

/// Serve the webhook endpoint until the process exits.
pub async fn serve(
    host: &str,
    port: u16,
    updates: mpsc::Sender<Update>,
) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/webhook", post(receive_update))
        .with_state(updates);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!("Webhook listening on {host}:{port}");
    axum::serve(listener, app).await
}

async fn health_check() -> &'static str {
    "OK"
}

async fn receive_update(
    State(updates): State<mpsc::Sender<Update>>,
    Json(update): Json<Update>,
) -> StatusCode {
    if updates.send(update).await.is_err() {
        warn!("Update channel closed, dropping webhook delivery");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
