use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use udisk_backup::{BackupTarget, HistoryEntry, TransferPlan};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/targets", get(list_targets))
        .route("/plan", get(plan_backup))
        .route("/start", post(start_backup))
        .route("/stop", post(stop_backup))
        .route("/status", get(get_status))
        .route("/log", get(get_log))
        .route("/log/download", get(download_log))
        .route("/history", get(get_history))
}

async fn list_targets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BackupTarget>>, AppError> {
    let resolver = state.resolver.clone();
    let targets = tokio::task::spawn_blocking(move || resolver.find_eligible())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(Json(targets))
}

#[derive(Deserialize)]
pub struct PlanQuery {
    pub mount: Option<String>,
    pub source: Option<String>,
}

async fn plan_backup(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<TransferPlan>, AppError> {
    let mount = query
        .mount
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("mount is required".into()))?;
    let source = query.source.filter(|s| !s.is_empty()).map(PathBuf::from);

    let plan = state.planner.plan(Path::new(&mount), source.as_deref()).await?;
    Ok(Json(plan))
}

#[derive(Deserialize)]
pub struct StartBody {
    pub mount: String,
}

async fn start_backup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.mount.is_empty() {
        return Err(AppError::BadRequest("mount is required".into()));
    }
    let operation_id = state.supervisor.start(Path::new(&body.mount))?;
    tracing::info!(operation_id = %operation_id, mount = %body.mount, "Backup requested");
    Ok(Json(json!({ "operationId": operation_id })))
}

async fn stop_backup(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stopped = state.supervisor.stop();
    Json(json!({ "stopped": stopped }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let status = match state.supervisor.current_state() {
        Some(run) => serde_json::to_value(run).map_err(anyhow::Error::from)?,
        None => json!({ "phase": "Idle" }),
    };
    Ok(Json(status))
}

async fn get_log(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.supervisor.live_log(),
    )
}

async fn download_log(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let name = state
        .supervisor
        .current_state()
        .map(|run| format!("udisk-backup-{}.log", run.operation_id))
        .unwrap_or_else(|| "udisk-backup.log".to_string());
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
        ],
        state.supervisor.live_log(),
    )
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub mount: Option<String>,
    pub limit: Option<usize>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let mount = query.mount.filter(|m| !m.is_empty()).map(PathBuf::from);
    if let Some(m) = &mount {
        if !m.is_absolute() {
            return Err(AppError::BadRequest("mount must be an absolute path".into()));
        }
    }
    let limit = query.limit.unwrap_or(state.config.core.backup.history_limit);

    let recorder = state.recorder.clone();
    let history = tokio::task::spawn_blocking(move || recorder.list_history(mount.as_deref(), limit))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(Json(history))
}
