use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use udisk_backup::{BackupEvent, NotificationSink};

use crate::state::AppState;

const BROADCAST_CAPACITY: usize = 1024;
const MAX_QUEUE_PER_OPERATION: usize = 200;
/// Operations kept for replay; the least recently active is dropped first
const MAX_QUEUED_OPERATIONS: usize = 16;

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: i64,
    seq: u64,
}

impl QueuedMessage {
    fn to_json(&self) -> String {
        serde_json::json!({
            "type": self.event_type,
            "payload": self.payload,
        })
        .to_string()
    }
}

#[derive(Clone)]
pub struct UiBroadcaster {
    tx: broadcast::Sender<String>,
    queue: Arc<DashMap<String, VecDeque<QueuedMessage>>>,
    seq: Arc<AtomicU64>,
}

impl UiBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            queue: Arc::new(DashMap::new()),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn broadcast(&self, event_type: &str, payload: Value) {
        let msg = serde_json::json!({
            "type": event_type,
            "payload": payload,
        });
        let msg_str = msg.to_string();

        // Queue backup messages for replay
        if event_type.starts_with("backup:") {
            if let Some(operation_id) = payload.get("operationId").and_then(|v| v.as_str()) {
                if !self.queue.contains_key(operation_id) {
                    self.evict_stale_operations();
                }
                let mut entry = self
                    .queue
                    .entry(operation_id.to_string())
                    .or_insert_with(VecDeque::new);
                entry.push_back(QueuedMessage {
                    event_type: event_type.to_string(),
                    payload: payload.clone(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    seq: self.seq.fetch_add(1, Ordering::Relaxed),
                });
                if entry.len() > MAX_QUEUE_PER_OPERATION {
                    entry.pop_front();
                }
            }
        }

        // No subscribers is fine
        let _ = self.tx.send(msg_str);
    }

    /// Make room for one more operation.
    fn evict_stale_operations(&self) {
        while self.queue.len() >= MAX_QUEUED_OPERATIONS {
            let oldest = self
                .queue
                .iter()
                .min_by_key(|e| e.value().back().map(|m| m.seq).unwrap_or(0))
                .map(|e| e.key().clone());
            match oldest {
                Some(operation_id) => {
                    tracing::debug!(operation_id = %operation_id, "Dropping replay queue");
                    self.queue.remove(&operation_id);
                }
                None => break,
            }
        }
    }

    /// Queued messages of one operation newer than `since` (ms since epoch)
    pub fn get_queued_messages(&self, operation_id: &str, since: i64) -> Vec<QueuedMessage> {
        self.queue
            .get(operation_id)
            .map(|q| q.iter().filter(|m| m.timestamp > since).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for UiBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for UiBroadcaster {
    fn publish(&self, event: BackupEvent) {
        match serde_json::to_value(&event) {
            Ok(Value::Object(mut map)) => {
                let payload = map.remove("payload").unwrap_or(Value::Null);
                self.broadcast(event.event_type(), payload);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to serialize backup event: {}", e),
        }
    }
}

/// `{"type": "replay:request", "payload": {"operationId", "since"}}`
fn parse_replay_request(text: &str) -> Option<(String, i64)> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    if parsed.get("type").and_then(|t| t.as_str()) != Some("replay:request") {
        return None;
    }
    let payload = parsed.get("payload")?;
    let operation_id = payload.get("operationId")?.as_str()?.to_string();
    let since = payload.get("since").and_then(|v| v.as_i64()).unwrap_or(0);
    Some((operation_id, since))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ui_socket(socket, state))
}

async fn handle_ui_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ui.subscribe();
    // Replays go to the requesting client only
    let (replay_tx, mut replay_rx) = mpsc::unbounded_channel::<String>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "UI client lagging, messages dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(msg) = replay_rx.recv() => msg,
            };
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages from client (replay:request)
    let ui = state.ui.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Some((operation_id, since)) = parse_replay_request(&text) {
                    for m in ui.get_queued_messages(&operation_id, since) {
                        if replay_tx.send(m.to_json()).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udisk_backup::rsync::LineKind;
    use udisk_backup::RunPhase;

    #[tokio::test]
    async fn test_publish_broadcasts_wire_shape() {
        let ui = UiBroadcaster::new();
        let mut rx = ui.subscribe();
        ui.publish(BackupEvent::status("op-1", RunPhase::Running, "started"));

        let msg: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "backup:status");
        assert_eq!(msg["payload"]["operationId"], "op-1");
        assert_eq!(msg["payload"]["phase"], "Running");
    }

    #[test]
    fn test_queue_is_bounded_per_operation() {
        let ui = UiBroadcaster::new();
        for i in 0..250 {
            ui.publish(BackupEvent::log("op-1", LineKind::Info, format!("line {}", i)));
        }
        ui.publish(BackupEvent::log("op-2", LineKind::Info, "other"));

        let queued = ui.get_queued_messages("op-1", 0);
        assert_eq!(queued.len(), MAX_QUEUE_PER_OPERATION);
        assert_eq!(queued[0].payload["line"], "line 50");
        assert_eq!(ui.get_queued_messages("op-2", 0).len(), 1);
        assert!(ui.get_queued_messages("op-3", 0).is_empty());
    }

    #[test]
    fn test_least_recent_operations_are_evicted() {
        let ui = UiBroadcaster::new();
        for i in 0..MAX_QUEUED_OPERATIONS {
            ui.publish(BackupEvent::status(&format!("op-{}", i), RunPhase::Running, "started"));
        }
        // op-0 is active again, so op-1 is now the least recent
        ui.publish(BackupEvent::status("op-0", RunPhase::Completed, "done"));
        ui.publish(BackupEvent::status("op-new", RunPhase::Running, "started"));

        assert_eq!(ui.queue.len(), MAX_QUEUED_OPERATIONS);
        assert!(ui.get_queued_messages("op-1", 0).is_empty());
        assert_eq!(ui.get_queued_messages("op-0", 0).len(), 2);
        assert_eq!(ui.get_queued_messages("op-new", 0).len(), 1);
        assert_eq!(ui.get_queued_messages("op-2", 0).len(), 1);
    }

    #[test]
    fn test_since_filters_old_messages() {
        let ui = UiBroadcaster::new();
        ui.publish(BackupEvent::status("op-1", RunPhase::Running, "started"));
        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        assert!(ui.get_queued_messages("op-1", future).is_empty());
    }

    #[test]
    fn test_parse_replay_request() {
        assert_eq!(
            parse_replay_request(r#"{"type":"replay:request","payload":{"operationId":"op-1","since":42}}"#),
            Some(("op-1".to_string(), 42))
        );
        assert_eq!(
            parse_replay_request(r#"{"type":"replay:request","payload":{"operationId":"op-1"}}"#),
            Some(("op-1".to_string(), 0))
        );
        assert_eq!(parse_replay_request(r#"{"type":"ping"}"#), None);
        assert_eq!(parse_replay_request("not json"), None);
    }
}
