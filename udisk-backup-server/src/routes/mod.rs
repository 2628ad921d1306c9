pub mod backup;
pub mod disks;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/disks", disks::router())
        .nest("/api/backup", backup::router())
        .route("/ws", axum::routing::get(crate::ws::ui::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;
    use udisk_backup::inventory::{Disk, Partition, StaticInventory};
    use udisk_backup::Config;

    struct Fixture {
        root: tempfile::TempDir,
        mount: PathBuf,
        state: Arc<AppState>,
    }

    /// `<root>/media/usb` is mounted, labeled and allowed; rsync is a
    /// shell script that sleeps until killed.
    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let mount = root.path().join("media/usb");
        let source = root.path().join("home");
        std::fs::create_dir_all(&mount).unwrap();
        std::fs::create_dir_all(&source).unwrap();

        let rsync = root.path().join("fake-rsync");
        std::fs::write(&rsync, "#!/bin/sh\necho 'sending incremental file list'\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&rsync, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut core = Config::default();
        core.backup.source_path = source;
        core.backup.allowed_mount_roots = vec![root.path().join("media")];
        core.backup.rsync_binary = rsync;
        let config = AppConfig {
            port: 0,
            log_level: "info".into(),
            core,
        };

        let inventory = StaticInventory::new(vec![Disk {
            path: "/dev/sdb".into(),
            transport: Some("usb".into()),
            partitions: vec![Partition {
                path: "/dev/sdb1".into(),
                fs_type: Some("ext4".into()),
                label: Some("USB_BACKUP".into()),
                mount_point: mount.to_str().map(Into::into),
                ..Default::default()
            }],
            ..Default::default()
        }]);

        let state = Arc::new(AppState::with_inventory(config, Arc::new(inventory)));
        Fixture { root, mount, state }
    }

    async fn call(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let (status, body) = call(state, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post_json(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = call(state, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn wait_idle(state: &Arc<AppState>) {
        for _ in 0..400 {
            if !state.supervisor.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("backup did not stop");
    }

    #[tokio::test]
    async fn test_list_disks_and_targets() {
        let f = fixture();
        let (status, disks) = get_json(&f.state, "/api/disks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disks[0]["path"], "/dev/sdb");
        assert_eq!(disks[0]["partitions"][0]["label"], "USB_BACKUP");

        let (status, targets) = get_json(&f.state, "/api/backup/targets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(targets.as_array().unwrap().len(), 1);
        assert_eq!(targets[0]["mountPoint"], f.mount.to_str().unwrap());
        assert_eq!(targets[0]["device"], "/dev/sdb1");
    }

    #[tokio::test]
    async fn test_idle_status_and_log() {
        let f = fixture();
        let (status, body) = get_json(&f.state, "/api/backup/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "phase": "Idle" }));

        let (status, body) = post_json(&f.state, "/api/backup/stop", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stopped"], false);

        let (status, log) =
            call(&f.state, Request::get("/api/backup/log").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_start_validation_statuses() {
        let f = fixture();
        let cases = [
            ("relative/mount".to_string(), StatusCode::BAD_REQUEST),
            (String::new(), StatusCode::BAD_REQUEST),
            (f.root.path().join("home").display().to_string(), StatusCode::FORBIDDEN),
            (
                f.root.path().join("media/absent").display().to_string(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (mount, expected) in cases {
            let (status, body) =
                post_json(&f.state, "/api/backup/start", serde_json::json!({ "mount": mount })).await;
            assert_eq!(status, expected, "mount {:?}", mount);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_plan_requires_mount() {
        let f = fixture();
        let (status, body) = get_json(&f.state, "/api/backup/plan").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "mount is required");
    }

    #[tokio::test]
    async fn test_start_conflict_and_stop() {
        let f = fixture();
        let mount = f.mount.display().to_string();

        let (status, body) =
            post_json(&f.state, "/api/backup/start", serde_json::json!({ "mount": mount })).await;
        assert_eq!(status, StatusCode::OK);
        let operation_id = body["operationId"].as_str().unwrap().to_string();

        let (status, body) =
            post_json(&f.state, "/api/backup/start", serde_json::json!({ "mount": mount })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains(&operation_id));

        let (_, status_body) = get_json(&f.state, "/api/backup/status").await;
        assert_eq!(status_body["operationId"], operation_id.as_str());

        let (status, body) = post_json(&f.state, "/api/backup/stop", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stopped"], true);
        wait_idle(&f.state).await;

        let (_, status_body) = get_json(&f.state, "/api/backup/status").await;
        assert_eq!(status_body["phase"], "Cancelled");

        let request = Request::get("/api/backup/log/download").body(Body::empty()).unwrap();
        let response = create_router(f.state.clone()).oneshot(request).await.unwrap();
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains(&operation_id));
    }

    #[tokio::test]
    async fn test_history_for_mount() {
        let f = fixture();
        let uri = format!("/api/backup/history?mount={}&limit=5", f.mount.display());
        let (status, body) = get_json(&f.state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (status, _) = get_json(&f.state, "/api/backup/history?mount=relative").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
