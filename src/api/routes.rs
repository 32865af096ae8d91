//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::error::EngineError;
use crate::tasks::NewTask;

/// Default and maximum size of a result page.
const DEFAULT_RESULT_LIMIT: usize = 50;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}/pause", post(pause_task))
        .route("/tasks/{id}/resume", post(resume_task))
        .route("/tasks/{id}", delete(delete_task))
        .route("/results", get(list_results))
        .route("/check-robots", post(check_robots))
        .route("/analyze", post(analyze))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

fn error_response(e: EngineError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        EngineError::InvalidInput(_) | EngineError::InvalidCron { .. } => StatusCode::BAD_REQUEST,
        EngineError::ScrapingDisallowed(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Fetch(_)
        | EngineError::Extraction(_)
        | EngineError::Summarization(_) => StatusCode::BAD_GATEWAY,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": { "code": e.code(), "message": e.to_string() }
        })),
    )
}

async fn health() -> Json<Value> {
    envelope(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<NewTask>,
) -> ApiResult {
    let task = state
        .registry
        .create_task(body)
        .await
        .map_err(error_response)?;
    Ok(envelope(json!({
        "task_id": task.id,
        "next_execution": task.next_execution,
    })))
}

async fn list_tasks(State(state): State<AppState>) -> ApiResult {
    let tasks = state.registry.list_tasks().map_err(error_response)?;
    let total = tasks.len();
    Ok(envelope(json!({ "tasks": tasks, "total": total })))
}

async fn pause_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.registry.pause_task(&id).map_err(error_response)?;
    Ok(envelope(json!({ "task_id": id, "status": "paused" })))
}

async fn resume_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.registry.resume_task(&id).map_err(error_response)?;
    Ok(envelope(json!({ "task_id": id, "status": "active" })))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let removed = state.registry.delete_task(&id).map_err(error_response)?;
    Ok(envelope(json!({ "task_id": id, "results_removed": removed })))
}

#[derive(Deserialize)]
struct ResultsQuery {
    task_id: Option<String>,
    limit: Option<usize>,
}

async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RESULT_LIMIT)
        .min(DEFAULT_RESULT_LIMIT * 10);
    let results = state
        .registry
        .list_results(query.task_id.as_deref(), limit)
        .map_err(error_response)?;
    let total = results.len();
    Ok(envelope(json!({ "results": results, "total": total })))
}

#[derive(Deserialize)]
struct UrlBody {
    url: String,
}

async fn check_robots(State(state): State<AppState>, Json(body): Json<UrlBody>) -> ApiResult {
    let decision = state.registry.check_consent(&body.url).await;
    Ok(envelope(serde_json::to_value(decision).unwrap_or(Value::Null)))
}

#[derive(Deserialize)]
struct AnalyzeBody {
    url: String,
    query: String,
    api_key: String,
}

async fn analyze(State(state): State<AppState>, Json(body): Json<AnalyzeBody>) -> ApiResult {
    let outcome = state
        .registry
        .analyze_now(&body.url, &body.query, &body.api_key)
        .await
        .map_err(error_response)?;
    Ok(envelope(json!({
        "analysis": outcome.summary.analysis,
        "page_title": outcome.page_title,
        "site_name": outcome.site_name,
        "generated_at": outcome.summary.generated_at,
    })))
}
