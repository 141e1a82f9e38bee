use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::automation::Orchestrator;
use crate::models::{
    GroupsResponse, LogEntry, LogRequest, LogStatus, PageStatus, PostRequest, PostResponse,
};

pub async fn get_groups(State(orch): State<Arc<Orchestrator>>) -> Json<GroupsResponse> {
    Json(orch.fetch_groups().await)
}

pub async fn post_post(
    State(orch): State<Arc<Orchestrator>>,
    Json(request): Json<PostRequest>,
) -> Json<PostResponse> {
    info!(mode = ?request.mode, target = ?request.target_group_id, "post requested");
    Json(orch.test_post(request).await)
}

pub async fn get_status(State(orch): State<Arc<Orchestrator>>) -> Json<PageStatus> {
    Json(orch.check_status().await)
}

pub async fn get_logs(State(orch): State<Arc<Orchestrator>>) -> Json<Vec<LogEntry>> {
    Json(orch.logbook().list())
}

/// Clients report their own activity here so one log covers both sides.
pub async fn post_log(
    State(orch): State<Arc<Orchestrator>>,
    Json(request): Json<LogRequest>,
) -> Json<Value> {
    orch.logbook()
        .append(&request.action, request.status, &request.details);
    Json(json!({ "status": "ok" }))
}

pub async fn delete_logs(State(orch): State<Arc<Orchestrator>>) -> Json<Value> {
    orch.logbook().clear();
    orch.logbook().append("log", LogStatus::Info, "log cleared");
    Json(json!({ "status": "ok" }))
}
