//! UDisk Backup - command line entry point
//!
//! Inspect drives, plan and run backups, and browse run history without the
//! HTTP server.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use udisk_backup::daemon::ShutdownCoordinator;
use udisk_backup::inventory::{DiskInventory, LsblkInventory};
use udisk_backup::notify::ChannelSink;
use udisk_backup::rsync::LineKind;
use udisk_backup::{
    utils, BackupEvent, Config, EligibilityResolver, RunPhase, RunRecorder, TransferPlanner,
    TransferSupervisor,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: $UDISK_BACKUP_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List block devices and partitions
    Disks,

    /// List mounted USB partitions carrying the backup label
    Targets,

    /// Estimate a backup with an rsync dry run
    Plan {
        /// Mount point of the target drive
        #[arg(long)]
        mount: PathBuf,

        /// Directory to back up (overrides config)
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Run a backup and follow it until it finishes (Ctrl-C cancels)
    Run {
        /// Mount point of the target drive
        #[arg(long)]
        mount: PathBuf,
    },

    /// Show past runs, newest first
    History {
        /// Only this mount point (default: every eligible target)
        #[arg(long)]
        mount: Option<PathBuf>,

        /// Maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init_cli(log_level)?;

    let inventory: Arc<dyn DiskInventory> = Arc::new(LsblkInventory::new());
    let resolver = Arc::new(EligibilityResolver::new(
        inventory.clone(),
        config.backup.marker_label.clone(),
    ));

    match args.command {
        Command::Disks => print_json(&inventory.list_disks()),
        Command::Targets => print_json(&resolver.find_eligible()),
        Command::Plan { mount, source } => {
            let planner = TransferPlanner::new(config.backup.clone());
            let plan = planner.plan(&mount, source.as_deref()).await?;
            print_json(&plan)
        }
        Command::Run { mount } => run_backup(&config, resolver, &mount).await,
        Command::History { mount, limit } => {
            let recorder = RunRecorder::new(resolver);
            let limit = limit.unwrap_or(config.backup.history_limit);
            print_json(&recorder.list_history(mount.as_deref(), limit))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("UDISK_BACKUP_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => Ok(Config::from_file(&path)?),
        None => Ok(Config::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_backup(config: &Config, resolver: Arc<EligibilityResolver>, mount: &Path) -> Result<()> {
    let (sink, mut events) = ChannelSink::new();
    let recorder = Arc::new(RunRecorder::new(resolver));
    let supervisor = TransferSupervisor::new(config.backup.clone(), recorder, Arc::new(sink));

    let operation_id = supervisor.start(mount)?;
    tracing::info!(operation_id = %operation_id, "Following backup");

    let shutdown = ShutdownCoordinator::new();
    let signal = shutdown.wait_for_signal();
    tokio::pin!(signal);
    let mut stopping = false;
    let mut stdout = std::io::stdout();

    let outcome = loop {
        tokio::select! {
            _ = &mut signal, if !stopping => {
                stopping = true;
                supervisor.stop();
            }
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Backup {} ended without a final status", operation_id);
                };
                match event {
                    BackupEvent::Log(log) if log.kind == LineKind::Progress => {
                        // Redraw in place like rsync does
                        match &log.progress {
                            Some(progress) => {
                                write!(stdout, "\r{}", progress.status_line())?;
                                if progress.is_complete() {
                                    writeln!(stdout)?;
                                }
                            }
                            None => write!(stdout, "\r{}", log.line)?,
                        }
                        stdout.flush()?;
                    }
                    BackupEvent::Log(log) => writeln!(stdout, "\r{}", log.line)?,
                    BackupEvent::Status(status) => {
                        writeln!(stdout)?;
                        eprintln!("[{:?}] {}", status.phase, status.message);
                        if status.phase.is_terminal() {
                            break status;
                        }
                    }
                }
            }
        }
    };

    match outcome.phase {
        RunPhase::Completed => Ok(()),
        phase => bail!("Backup {} ended as {:?}: {}", operation_id, phase, outcome.message),
    }
}
