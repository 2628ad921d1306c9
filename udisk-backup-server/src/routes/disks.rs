use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use udisk_backup::inventory::Disk;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_disks))
}

async fn list_disks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Disk>>, AppError> {
    let inventory = state.inventory.clone();
    let disks = tokio::task::spawn_blocking(move || inventory.list_disks())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(Json(disks))
}
