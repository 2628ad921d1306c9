//! Single-flight supervision of the live rsync transfer.
//!
//! At most one run exists at a time. `start` claims the flight, prepares the
//! run directories and hands off to a background task that owns the child
//! process, streams its output and records the outcome. The busy flag, the
//! run state and the live buffer share one mutex whose critical sections
//! never span an `.await`.

pub mod lines;
pub mod state;

pub use lines::OutputLineCodec;
pub use state::{LiveLog, RunPhase, RunState};

use crate::config::BackupSettings;
use crate::fs::{filesystem_space, measure_link_savings};
use crate::layout::BackupLayout;
use crate::notify::{BackupEvent, NotificationSink};
use crate::planner::check_absolute;
use crate::recorder::{BackupType, ExtendedMetadata, PersistedRun, RunRecorder, RunSummary};
use crate::rsync::{classify_line, parse_transfer_stats, transfer_args, LineKind, TransferMode};
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const LINE_CHANNEL_CAPACITY: usize = 1024;

struct FlightState {
    busy: bool,
    current: Option<RunState>,
    live_log: LiveLog,
    cancel: Option<CancellationToken>,
    pid: Option<u32>,
    // rsync is gone and the outcome is being recorded; too late to cancel
    finalizing: bool,
}

struct SupervisorInner {
    settings: BackupSettings,
    recorder: Arc<RunRecorder>,
    sink: Arc<dyn NotificationSink>,
    flight: Mutex<FlightState>,
}

impl SupervisorInner {
    fn lock(&self) -> MutexGuard<'_, FlightState> {
        // State stays consistent even if a holder panicked; keep going.
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the cancellation window once rsync is no longer running.
    ///
    /// Returns false when a stop already got in, in which case the run
    /// ends as cancelled.
    fn begin_finalizing(&self, cancel: &CancellationToken) -> bool {
        let mut flight = self.lock();
        flight.pid = None;
        if cancel.is_cancelled() {
            return false;
        }
        flight.finalizing = true;
        true
    }
}

/// Everything the run task needs about its run
struct RunContext {
    operation_id: String,
    layout: BackupLayout,
    baseline: Option<PathBuf>,
    source: PathBuf,
    started_at: DateTime<Utc>,
    free_bytes_before: Option<u64>,
    cancel: CancellationToken,
}

enum Outcome {
    Exited(i32),
    LaunchFailed(String),
    Cancelled,
}

/// Releases the flight when dropped, on every exit path of a run.
struct FlightGuard {
    inner: Arc<SupervisorInner>,
    released: bool,
}

impl FlightGuard {
    fn new(inner: Arc<SupervisorInner>) -> Self {
        Self {
            inner,
            released: false,
        }
    }

    /// Record the terminal state and free the flight in one step.
    fn finish(mut self, phase: RunPhase, message: &str) {
        let mut flight = self.inner.lock();
        if let Some(state) = flight.current.as_mut() {
            state.phase = phase;
            state.message = message.to_string();
        }
        release(&mut flight);
        self.released = true;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut flight = self.inner.lock();
        if let Some(state) = flight.current.as_mut() {
            if state.phase == RunPhase::Running {
                state.phase = RunPhase::Failed;
                state.message = "Backup aborted unexpectedly".to_string();
            }
        }
        release(&mut flight);
    }
}

fn release(flight: &mut FlightState) {
    flight.busy = false;
    flight.cancel = None;
    flight.pid = None;
    flight.finalizing = false;
}

/// Handle to the process-wide transfer supervisor. Cheap to clone.
#[derive(Clone)]
pub struct TransferSupervisor {
    inner: Arc<SupervisorInner>,
}

impl TransferSupervisor {
    pub fn new(
        settings: BackupSettings,
        recorder: Arc<RunRecorder>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let live_log = LiveLog::new(settings.live_log_max_lines);
        Self {
            inner: Arc::new(SupervisorInner {
                settings,
                recorder,
                sink,
                flight: Mutex::new(FlightState {
                    busy: false,
                    current: None,
                    live_log,
                    cancel: None,
                    pid: None,
                    finalizing: false,
                }),
            }),
        }
    }

    /// Check that `target` is a sane, allowed, existing mount point.
    pub fn validate_target(&self, target: &Path) -> Result<()> {
        check_absolute(target, "target mount")?;
        let roots = &self.inner.settings.allowed_mount_roots;
        if !roots.iter().any(|root| target.starts_with(root)) {
            return Err(BackupError::NotAllowed(format!(
                "{} is not under an allowed mount root",
                target.display()
            )));
        }
        if !target.is_dir() {
            return Err(BackupError::TargetUnavailable(format!(
                "{} does not exist",
                target.display()
            )));
        }
        Ok(())
    }

    /// Launch a backup to `target_mount` and return its operation id.
    ///
    /// Returns as soon as the transfer is running; progress and the final
    /// outcome arrive through the notification sink. Must be called from
    /// within a tokio runtime.
    pub fn start(&self, target_mount: &Path) -> Result<String> {
        self.validate_target(target_mount)?;

        {
            let mut flight = self.inner.lock();
            if flight.busy {
                let running = flight
                    .current
                    .as_ref()
                    .map(|s| s.operation_id.clone())
                    .unwrap_or_default();
                return Err(BackupError::AlreadyRunning(running));
            }
            flight.busy = true;
        }
        let guard = FlightGuard::new(self.inner.clone());

        let started_at = Utc::now();
        let layout = BackupLayout::new(target_mount, started_at);
        let baseline = layout.baseline();
        layout.create_run_dirs()?;

        let operation_id = Uuid::new_v4().to_string();
        let free_bytes_before = filesystem_space(target_mount).ok().map(|s| s.free_bytes);
        let cancel = CancellationToken::new();
        let message = format!("Backup to {} started", target_mount.display());

        {
            let mut flight = self.inner.lock();
            flight.current = Some(RunState {
                operation_id: operation_id.clone(),
                phase: RunPhase::Running,
                message: message.clone(),
                target_mount: target_mount.to_path_buf(),
                started_at,
            });
            flight.live_log.clear();
            flight.cancel = Some(cancel.clone());
            flight.pid = None;
            flight.finalizing = false;
        }

        tracing::info!(
            operation_id = %operation_id,
            target = %target_mount.display(),
            backup_type = %BackupType::from_baseline(baseline.as_deref()),
            "Backup started"
        );
        self.inner
            .sink
            .publish(BackupEvent::status(&operation_id, RunPhase::Running, message));

        let ctx = RunContext {
            operation_id: operation_id.clone(),
            layout,
            baseline,
            source: self.inner.settings.source_path.clone(),
            started_at,
            free_bytes_before,
            cancel,
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run(ctx, guard).await;
        });

        Ok(operation_id)
    }

    /// Request cancellation of the running transfer.
    ///
    /// Returns false when nothing is running, when cancellation was already
    /// requested, or when rsync has exited and the run is being recorded.
    pub fn stop(&self) -> bool {
        let mut flight = self.inner.lock();
        if !flight.busy || flight.finalizing {
            return false;
        }
        let Some(token) = flight.cancel.clone() else {
            return false;
        };
        if token.is_cancelled() {
            return false;
        }
        token.cancel();

        if let Some(pid) = flight.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(pid, "SIGTERM failed: {}", e);
            }
        }
        if let Some(state) = flight.current.as_mut() {
            state.phase = RunPhase::Cancelled;
            state.message = "Cancellation requested".to_string();
            tracing::info!(operation_id = %state.operation_id, "Backup cancellation requested");
        }
        true
    }

    /// Stop any running transfer and wait up to `timeout` for it to wind down.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        let deadline = tokio::time::Instant::now() + timeout;
        while self.is_busy() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    /// Snapshot of the current or most recent run; `None` before the first.
    pub fn current_state(&self) -> Option<RunState> {
        self.inner.lock().current.clone()
    }

    /// Buffered output of the current or most recent run
    pub fn live_log(&self) -> String {
        self.inner.lock().live_log.joined()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().busy
    }
}

impl SupervisorInner {
    async fn run(self: Arc<Self>, ctx: RunContext, guard: FlightGuard) {
        match self.execute(&ctx).await {
            Outcome::Cancelled => {
                let message = "Backup cancelled";
                tracing::info!(operation_id = %ctx.operation_id, "{}", message);
                guard.finish(RunPhase::Cancelled, message);
                self.sink
                    .publish(BackupEvent::status(&ctx.operation_id, RunPhase::Cancelled, message));
            }
            Outcome::Exited(code) => self.complete(ctx, code, guard).await,
            Outcome::LaunchFailed(reason) => {
                tracing::error!(operation_id = %ctx.operation_id, "{}", reason);
                self.handle_line(&ctx.operation_id, format!("rsync error: {}", reason));
                self.complete(ctx, -1, guard).await;
            }
        }
    }

    /// Run rsync to completion or cancellation, streaming its output.
    async fn execute(&self, ctx: &RunContext) -> Outcome {
        if ctx.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let args = transfer_args(
            &ctx.source,
            &ctx.layout,
            ctx.baseline.as_deref(),
            TransferMode::Live,
            &self.settings.extra_rsync_args,
        );
        tracing::debug!(operation_id = %ctx.operation_id, ?args, "Launching rsync");

        let mut child = match Command::new(&self.settings.rsync_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                if !self.begin_finalizing(&ctx.cancel) {
                    return Outcome::Cancelled;
                }
                return Outcome::LaunchFailed(format!(
                    "failed to launch {}: {}",
                    self.settings.rsync_binary.display(),
                    e
                ));
            }
        };
        self.lock().pid = child.id();

        let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_records(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_records(stderr, tx.clone()));
        }
        drop(tx);

        let status = loop {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(operation_id = %ctx.operation_id, "kill failed: {}", e);
                    }
                    let _ = child.wait().await;
                    self.lock().pid = None;
                    while let Ok(line) = rx.try_recv() {
                        self.handle_line(&ctx.operation_id, line);
                    }
                    return Outcome::Cancelled;
                }
                Some(line) = rx.recv() => self.handle_line(&ctx.operation_id, line),
                status = child.wait() => break status,
            }
        };

        if !self.begin_finalizing(&ctx.cancel) {
            while let Ok(line) = rx.try_recv() {
                self.handle_line(&ctx.operation_id, line);
            }
            return Outcome::Cancelled;
        }

        // Readers finish once the pipes hit EOF
        while let Some(line) = rx.recv().await {
            self.handle_line(&ctx.operation_id, line);
        }

        match status {
            Ok(status) => Outcome::Exited(status.code().unwrap_or(-1)),
            Err(e) => {
                tracing::warn!(operation_id = %ctx.operation_id, "Waiting for rsync failed: {}", e);
                Outcome::Exited(-1)
            }
        }
    }

    fn handle_line(&self, operation_id: &str, line: String) {
        let kind = classify_line(&line);
        if kind == LineKind::Error {
            tracing::warn!(operation_id, "rsync: {}", line);
        }
        self.lock().live_log.push(line.clone());
        self.sink.publish(BackupEvent::log(operation_id, kind, line));
    }

    /// Record a run that ended on its own, successfully or not.
    async fn complete(&self, ctx: RunContext, exit_code: i32, guard: FlightGuard) {
        let ended_at = Utc::now();
        let success = exit_code == 0;
        let free_bytes_after = filesystem_space(&ctx.layout.mount).ok().map(|s| s.free_bytes);
        let stats = parse_transfer_stats(&self.lock().live_log.joined());

        let summary = RunSummary {
            operation_id: ctx.operation_id.clone(),
            started_at: ctx.started_at,
            ended_at,
            duration_seconds: (ended_at - ctx.started_at).num_milliseconds().max(0) as f64 / 1000.0,
            source: ctx.source.clone(),
            target: ctx.layout.incremental_dir.clone(),
            deleted_dir: ctx.layout.deleted_dir.clone(),
            exit_code,
            success,
            free_bytes_before: ctx.free_bytes_before,
            free_bytes_after,
            file_counts: stats.files,
            byte_counts: stats.bytes,
        };

        let backup_type = BackupType::from_baseline(ctx.baseline.as_deref());
        let savings = if success && backup_type == BackupType::Incremental && self.settings.compute_savings
        {
            let dir = ctx.layout.incremental_dir.clone();
            match tokio::task::spawn_blocking(move || measure_link_savings(&dir)).await {
                Ok(Ok(savings)) => Some(savings),
                Ok(Err(e)) => {
                    tracing::debug!(operation_id = %ctx.operation_id, "Savings walk failed: {}", e);
                    None
                }
                Err(e) => {
                    tracing::debug!(operation_id = %ctx.operation_id, "Savings walk panicked: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let extended = ExtendedMetadata {
            operation_id: ctx.operation_id.clone(),
            backup_type,
            baseline: ctx.baseline.clone(),
            savings,
        };

        let planned = PersistedRun::planned(&ctx.layout, &ctx.operation_id);
        let recorder = self.recorder.clone();
        let layout = ctx.layout.clone();
        let report_path =
            match tokio::task::spawn_blocking(move || recorder.persist(&layout, &summary, &extended))
                .await
            {
                Ok(Ok(persisted)) => persisted.report_path,
                Ok(Err(e)) => {
                    tracing::error!(operation_id = %ctx.operation_id, "Failed to persist run: {}", e);
                    planned.report_path
                }
                Err(e) => {
                    tracing::error!(operation_id = %ctx.operation_id, "Persist task failed: {}", e);
                    planned.report_path
                }
            };

        if success {
            match ctx.layout.promote_current() {
                Ok(pointer) => {
                    tracing::debug!(operation_id = %ctx.operation_id, ?pointer, "Updated current pointer")
                }
                Err(e) => tracing::warn!(
                    operation_id = %ctx.operation_id,
                    "Failed to update {}: {}",
                    ctx.layout.current.display(),
                    e
                ),
            }
        }

        let (phase, message) = if success {
            (
                RunPhase::Completed,
                format!("Backup completed. Report: {}", report_path.display()),
            )
        } else {
            (
                RunPhase::Failed,
                format!(
                    "Backup failed with exit code {}. Report: {}",
                    exit_code,
                    report_path.display()
                ),
            )
        };
        tracing::info!(operation_id = %ctx.operation_id, exit_code, "{}", message);

        guard.finish(phase, &message);
        self.sink
            .publish(BackupEvent::status(&ctx.operation_id, phase, message));
    }
}

/// Single reader per stream: frame records and feed the shared channel.
async fn forward_records<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(stream, OutputLineCodec::new());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Output stream read failed: {}", e);
                break;
            }
        }
    }
}
