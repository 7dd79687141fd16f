//! # taskfeed
//!
//! Command-line subscriber for background download tasks: follows a task's
//! progress channel, mirrors it into the task store and prints each change.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use taskfeed_client::{store_handlers, ConnectionManager, ManagerConfig, ProgressHandlers};
use taskfeed_core::{channel_url, DownloadTask, TaskId};
use taskfeed_settings::FeedSettings;
use taskfeed_store::{StoreConfig, StoreEvent, StoreSnapshot, TaskProgressStore};
use taskfeed_telemetry::{init_telemetry, TelemetryConfig};

/// Task progress subscriber.
#[derive(Parser, Debug)]
#[command(name = "taskfeed", about = "Follow background download tasks")]
struct Cli {
    /// Settings file (defaults to `~/.taskfeed/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// REST base URL (overrides settings).
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a task until it finishes.
    Watch {
        task_id: String,
        /// Name shown for the task.
        #[arg(long, default_value = "download")]
        filename: String,
    },
    /// Print the progress channel URL for a task.
    Url { task_id: String },
    /// Print the tasks recorded in the store snapshot.
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(taskfeed_settings::settings_path);
    let mut settings = taskfeed_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    if let Some(base_url) = cli.base_url {
        settings.api.base_url = base_url;
    }

    let _telemetry = init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));

    match cli.command {
        Command::Url { task_id } => {
            let task_id = parse_task_id(&task_id)?;
            println!("{}", channel_url(&settings.api.base_url, &task_id));
            Ok(())
        }
        Command::History => show_history(&settings),
        Command::Watch { task_id, filename } => {
            let task_id = parse_task_id(&task_id)?;
            watch(&settings, task_id, filename).await
        }
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId> {
    let task_id = TaskId::new(raw);
    if task_id.is_empty() {
        bail!("task id must not be empty");
    }
    Ok(task_id)
}

fn snapshot_path(settings: &FeedSettings) -> Option<PathBuf> {
    settings.store.snapshot_path.as_ref().map(PathBuf::from)
}

fn show_history(settings: &FeedSettings) -> Result<()> {
    let Some(path) = snapshot_path(settings) else {
        bail!("no snapshot path configured (store.snapshotPath or TASKFEED_SNAPSHOT_PATH)");
    };
    let snapshot = StoreSnapshot::read(&path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?
        .unwrap_or_default();

    if let Some(active) = &snapshot.active {
        println!("active:");
        println!("  {}", describe(active));
    }
    if snapshot.history.is_empty() {
        println!("history: empty");
    } else {
        println!("history:");
        for task in &snapshot.history {
            println!("  {}", describe(task));
        }
    }
    Ok(())
}

fn describe(task: &DownloadTask) -> String {
    let mut line = format!(
        "{} {} [{}] {:.1}% ({} rows)",
        task.task_id, task.filename, task.status, task.progress, task.downloaded_count
    );
    if let Some(error) = &task.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

fn save_snapshot(store: &TaskProgressStore, path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = store.save_to(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save store snapshot");
        }
    }
}

async fn watch(settings: &FeedSettings, task_id: TaskId, filename: String) -> Result<()> {
    let store = TaskProgressStore::new(StoreConfig {
        hide_panel_delay: settings.store.hide_panel_delay(),
        clear_active_delay: settings.store.clear_active_delay(),
    });
    let snapshot = snapshot_path(settings);
    if let Some(path) = &snapshot {
        store
            .restore_from(path)
            .with_context(|| format!("Failed to restore snapshot {}", path.display()))?;
    }

    let mut events = store.subscribe();
    store.start_download(task_id.clone(), filename);

    let printer = ProgressHandlers::new()
        .on_connected(|| println!("connected"))
        .on_progress(|p| {
            println!(
                "{:>5.1}%  {}  ({} rows)",
                p.progress, p.progress_message, p.downloaded_count
            );
        });
    let manager = ConnectionManager::with_websocket(ManagerConfig::from_settings(settings))
        .with_handlers(store_handlers(store.clone(), task_id.clone()).and_then(printer));

    tracing::info!(task_id = %task_id, url = ?manager.channel_url(), "watching task");
    manager.bind(Some(task_id.clone()), false);
    if !settings.connection.auto_connect {
        manager.connect();
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                store.cancel_download();
                break Err(anyhow::anyhow!("watch cancelled"));
            }
            event = events.recv() => match event {
                Ok(StoreEvent::Completed(id)) if id == task_id => {
                    let count = store.get_task(&id).map_or(0, |t| t.downloaded_count);
                    println!("complete: {count} rows");
                    break Ok(());
                }
                Ok(StoreEvent::Failed { task_id: id, error }) if id == task_id => {
                    break Err(anyhow::anyhow!("task failed: {error}"));
                }
                Ok(StoreEvent::Cancelled(id)) if id == task_id => {
                    break Err(anyhow::anyhow!("task cancelled"));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "store events lagged");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    manager.disconnect();
    save_snapshot(&store, snapshot.as_deref());
    outcome
}
