//! Health-check web server.
//!
//! Hosting platforms ping `/` to decide whether the process is alive. The
//! server shares no state with the bot dispatcher and runs as its own task.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Body returned by `GET /`.
pub const RUNNING_BODY: &str = "Bot is running!";

/// Routes served by the health server.
pub fn health_router() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Bind on all interfaces and serve until the task is dropped.
pub async fn start_health_server(port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;

    log::info!("Starting health server on http://{}", addr);
    log::info!("  /        - Liveness text");
    log::info!("  /health  - Health check");

    serve_health(listener).await
}

/// Serve the health routes on an already bound listener.
pub async fn serve_health(listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    axum::serve(listener, health_router()).await?;
    Ok(())
}

/// GET /: static liveness text.
async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, RUNNING_BODY)
}

/// GET /health: simple health check.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
