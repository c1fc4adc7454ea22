//! JSON REST handlers and the router.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::server::DashboardServer;
use crate::board::{AgentSummary, DispatchOutcome, SessionView};
use crate::error::{ApiError, ApiResult};
use crate::gateway::HistoryMessage;
use crate::reconcile::ReconcileReport;
use crate::types::{
    ActivityEvent, ActivityQuery, ChatRequest, DispatchRequest, HitlRequest, HitlResponse,
    HitlStatus, MoveRequest, NewActivity, NewHitlRequest, NewTask, Task, TaskStatus, TaskUpdate,
};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Default, Deserialize)]
struct StatusFilter {
    #[serde(default)]
    status: Option<String>,
}

fn parse_task_status(raw: Option<&str>) -> ApiResult<Option<TaskStatus>> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => TaskStatus::from_str(s)
            .map(Some)
            .ok_or_else(|| ApiError::invalid_value("status", &format!("unknown task status '{}'", s))),
    }
}

fn parse_hitl_status(raw: Option<&str>) -> ApiResult<Option<HitlStatus>> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => HitlStatus::from_str(s)
            .map(Some)
            .ok_or_else(|| ApiError::invalid_value("status", &format!("unknown HITL status '{}'", s))),
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(state): State<DashboardServer>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Vec<Task>>> {
    let status = parse_task_status(filter.status.as_deref())?;
    Ok(Json(state.board().list_tasks(status)?))
}

async fn create_task(
    State(state): State<DashboardServer>,
    Json(input): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.board().create_task(input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.board().get_task(&task_id)?))
}

async fn update_task(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.board().update_task(&task_id, update)?))
}

async fn delete_task(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.board().delete_task(&task_id)?;
    Ok(Json(json!({ "success": true })))
}

async fn move_task(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.board().move_task(&task_id, request)?))
}

async fn dispatch_task(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    body: Option<Json<DispatchRequest>>,
) -> ApiResult<Json<DispatchOutcome>> {
    let agent_id = body.and_then(|Json(req)| req.agent_id);
    Ok(Json(state.board().dispatch(&task_id, agent_id).await?))
}

#[derive(Serialize)]
struct ChatHistory {
    messages: Vec<HistoryMessage>,
}

#[derive(Serialize)]
struct ChatReply {
    reply: String,
}

async fn chat_history(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ChatHistory>> {
    let messages = state.board().chat_history(&task_id).await?;
    Ok(Json(ChatHistory { messages }))
}

async fn chat_send(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state.board().chat(&task_id, &request.message).await?;
    Ok(Json(ChatReply { reply }))
}

async fn session_view(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.board().session_view(&task_id).await?))
}

async fn sync_tasks(State(state): State<DashboardServer>) -> ApiResult<Json<ReconcileReport>> {
    Ok(Json(state.engine().run().await?))
}

// ---------------------------------------------------------------------------
// Activity, HITL, agents
// ---------------------------------------------------------------------------

async fn list_activity(
    State(state): State<DashboardServer>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<ActivityEvent>>> {
    Ok(Json(state.board().list_activity(&query)?))
}

async fn record_activity(
    State(state): State<DashboardServer>,
    Json(input): Json<NewActivity>,
) -> ApiResult<(StatusCode, Json<ActivityEvent>)> {
    let event = state.board().record_activity(input)?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn list_hitl(
    State(state): State<DashboardServer>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Vec<HitlRequest>>> {
    let status = parse_hitl_status(filter.status.as_deref())?;
    Ok(Json(state.board().list_hitl(status)?))
}

async fn create_hitl(
    State(state): State<DashboardServer>,
    Json(input): Json<NewHitlRequest>,
) -> ApiResult<(StatusCode, Json<HitlRequest>)> {
    let request = state.board().create_hitl(input)?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_hitl(
    State(state): State<DashboardServer>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<HitlRequest>> {
    Ok(Json(state.board().get_hitl(&request_id)?))
}

async fn respond_hitl(
    State(state): State<DashboardServer>,
    Path(request_id): Path<String>,
    Json(answer): Json<HitlResponse>,
) -> ApiResult<Json<HitlRequest>> {
    Ok(Json(state.board().respond_hitl(&request_id, answer)?))
}

async fn list_agents(State(state): State<DashboardServer>) -> ApiResult<Json<Vec<AgentSummary>>> {
    Ok(Json(state.board().agents().await?))
}

/// Build the router with all routes.
pub fn build_router(state: DashboardServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/sync", post(sync_tasks))
        .route(
            "/api/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{task_id}/move", patch(move_task))
        .route("/api/tasks/{task_id}/dispatch", post(dispatch_task))
        .route("/api/tasks/{task_id}/chat", get(chat_history).post(chat_send))
        .route("/api/tasks/{task_id}/session", get(session_view))
        .route("/api/activity", get(list_activity).post(record_activity))
        .route("/api/hitl", get(list_hitl).post(create_hitl))
        .route("/api/hitl/{request_id}", get(get_hitl).put(respond_hitl))
        .route("/api/agents", get(list_agents))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
