//! Push-channel contract for run status and live output.

use crate::rsync::LineKind;
use crate::supervisor::RunPhase;
use crate::transfer::progress::TransferProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Phase change of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub operation_id: String,
    pub phase: RunPhase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One classified output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    pub operation_id: String,
    pub kind: LineKind,
    pub line: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<TransferProgress>,
}

/// Serialized as `{"type": "backup:status" | "backup:log", "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BackupEvent {
    #[serde(rename = "backup:status")]
    Status(StatusPayload),
    #[serde(rename = "backup:log")]
    Log(LogPayload),
}

impl BackupEvent {
    pub fn status(operation_id: &str, phase: RunPhase, message: impl Into<String>) -> Self {
        BackupEvent::Status(StatusPayload {
            operation_id: operation_id.to_string(),
            phase,
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn log(operation_id: &str, kind: LineKind, line: impl Into<String>) -> Self {
        let line = line.into();
        let progress = match kind {
            LineKind::Progress => crate::transfer::progress::parse_progress_line(&line),
            _ => None,
        };
        BackupEvent::Log(LogPayload {
            operation_id: operation_id.to_string(),
            kind,
            line,
            timestamp: Utc::now(),
            progress,
        })
    }

    pub fn operation_id(&self) -> &str {
        match self {
            BackupEvent::Status(s) => &s.operation_id,
            BackupEvent::Log(l) => &l.operation_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            BackupEvent::Status(_) => "backup:status",
            BackupEvent::Log(_) => "backup:log",
        }
    }

    /// True for the last status a run publishes
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupEvent::Status(s) if s.phase.is_terminal())
    }
}

/// Receives every event the supervisor publishes.
///
/// Called from the run task, so implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: BackupEvent);
}

/// Sink that forwards into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BackupEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackupEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, event: BackupEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: BackupEvent) {}
}
