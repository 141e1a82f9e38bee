pub mod api;
pub mod automation;
pub mod config;
pub mod error;
pub mod groups;
pub mod logbook;
pub mod models;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::automation::Orchestrator;

/// Bind the HTTP command surface and serve until the process exits.
pub async fn run_server(orchestrator: Arc<Orchestrator>, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/api/groups", get(api::get_groups))
        .route("/api/post", post(api::post_post))
        .route("/api/status", get(api::get_status))
        .route(
            "/api/logs",
            get(api::get_logs)
                .post(api::post_log)
                .delete(api::delete_logs),
        )
        .layer(CorsLayer::permissive())
        .with_state(orchestrator);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await
}
