mod cli;
mod config;
mod display;
mod event;
mod focus;
mod hotkey;
mod launcher;
mod lights;
mod logging;
mod marquee;
mod paths;
mod process_table;
mod reset;
mod status;
mod terminator;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::display::actor::{self as display_actor, DisplayHandle, ProcessBackend};
use crate::display::DisplayRequest;
use crate::event::DaemonEvent;
use crate::launcher::{ChildHandle, ProcessTag};
use crate::process_table::SystemTable;
use crate::reset::Orchestrator;
use crate::status::{DaemonState, DaemonStatus};

fn main() -> ExitCode {
    let cli = Cli::parse_from(cli::strip_tag_args(std::env::args_os()));

    // Keeps the file writer flushing until exit.
    let _log_guard = match logging::init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging unavailable: {e:#}");
            None
        }
    };

    let config_path = cli.config.clone().unwrap_or_else(paths::config_file_path);
    let result = match cli.command() {
        // The window needs the main thread; no async runtime here.
        Command::ShowImage {
            image,
            color,
            monitor,
            seconds,
        } => show_image(image, &color, monitor, seconds),
        command => run_async(command, config_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn show_image(image: PathBuf, color: &str, monitor: i32, seconds: Option<u64>) -> Result<()> {
    let request = DisplayRequest::new(image, color, monitor);
    let close = seconds.map(|s| display::window::close_after(Duration::from_secs(s)));
    display::window::run(&request, close).context("Marquee display failed")
}

fn run_async(command: Command, config_path: PathBuf) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(async move {
        match command {
            Command::Reset => reset_once(&config_path).await,
            Command::KillAll => kill_all(&config_path).await,
            Command::Marquee => marquee_standalone(&config_path).await,
            Command::StartLights => start_lights(&config_path).await,
            _ => run_daemon(config_path).await,
        }
    })
}

// ── Shared wiring ─────────────────────────────────────────────────────────────

type SharedTable = Arc<Mutex<SystemTable>>;

fn start_display(table: &SharedTable, config: &Config) -> Result<(DisplayHandle, std::thread::JoinHandle<()>)> {
    let backend = ProcessBackend::new(Arc::clone(table), display::viewer_executable(config));
    display_actor::spawn(backend).context("Failed to start display actor")
}

/// Waits for the display actor to finish its queue and exit.
async fn join_display(thread: std::thread::JoinHandle<()>) {
    if let Ok(Err(_)) = tokio::task::spawn_blocking(move || thread.join()).await {
        tracing::error!("Display actor panicked");
    }
}

/// Returns a stop receiver that flips to true on Ctrl+C.
fn stop_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
            let _ = tx.send(true);
            // Keep the sender alive so receivers see `true`, not a closed channel.
            std::future::pending::<()>().await;
        }
    });
    rx
}

fn spawn_monitor(
    config: &Config,
    display: &DisplayHandle,
    events: &mpsc::Sender<DaemonEvent>,
) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(marquee::run(
        config.clone(),
        display.clone(),
        Some(events.clone()),
        stop_rx,
    ));
    (stop_tx, task)
}

async fn stop_monitor(monitor: (watch::Sender<bool>, JoinHandle<()>)) {
    let (stop_tx, task) = monitor;
    let _ = stop_tx.send(true);
    if let Err(e) = task.await {
        tracing::error!("Marquee monitor task failed: {e}");
    }
}

// ── One-shot commands ─────────────────────────────────────────────────────────

async fn reset_once(config_path: &Path) -> Result<()> {
    let config = config::load_or_warn(config_path);
    let table: SharedTable = Arc::new(Mutex::new(SystemTable::new()));
    let (display, display_thread) = start_display(&table, &config)?;
    let orchestrator = Orchestrator::new(Arc::clone(&table), display);

    let mut stop = stop_on_ctrl_c();
    let report = orchestrator.reset(&config, &mut stop).await;
    tracing::info!("{report:?}");

    drop(orchestrator);
    join_display(display_thread).await;
    Ok(())
}

async fn kill_all(config_path: &Path) -> Result<()> {
    let config = config::load_or_warn(config_path);
    let table: SharedTable = Arc::new(Mutex::new(SystemTable::new()));
    let (display, display_thread) = start_display(&table, &config)?;
    let orchestrator = Orchestrator::new(table, display);

    let report = orchestrator.kill_all(&config).await;
    tracing::info!(killed = report.killed.len(), "kill-all finished");
    if !report.failed.is_empty() {
        tracing::warn!("kill-all could not terminate: {:?}", report.failed);
    }

    drop(orchestrator);
    join_display(display_thread).await;
    Ok(())
}

async fn marquee_standalone(config_path: &Path) -> Result<()> {
    let config = config::load_or_warn(config_path);
    let table: SharedTable = Arc::new(Mutex::new(SystemTable::new()));
    let (display, display_thread) = start_display(&table, &config)?;

    marquee::run(config, display, None, stop_on_ctrl_c()).await;
    join_display(display_thread).await;
    Ok(())
}

async fn start_lights(config_path: &Path) -> Result<()> {
    let config = config::load_or_warn(config_path);
    let handle = tokio::task::spawn_blocking(move || {
        // One helper at a time.
        terminator::kill_by_identifier(&mut SystemTable::new(), &ProcessTag::mame_lights());
        lights::start_mame_lights(&config.lighting)
    })
    .await
    .context("Lights task failed")?;

    match handle {
        ChildHandle::Spawned(child) => tracing::info!(pid = child.id(), "mame-lights started"),
        ChildHandle::Failed(reason) => tracing::warn!("mame-lights not started: {reason}"),
    }
    Ok(())
}

// ── Daemon ────────────────────────────────────────────────────────────────────

async fn run_daemon(config_path: PathBuf) -> Result<()> {
    let app_dir = paths::app_data_dir();
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create app data directory {}", app_dir.display()))?;

    let mut config = config::load_or_warn(&config_path);

    let status_path = paths::status_file_path();
    let mut current_status = DaemonStatus::new();
    current_status.state = DaemonStatus::resting_state(config.dynamic_marquee.enabled);
    status::write_status(&status_path, &current_status);

    let table: SharedTable = Arc::new(Mutex::new(SystemTable::new()));
    let (display, display_thread) = start_display(&table, &config)?;
    let orchestrator = Orchestrator::new(Arc::clone(&table), display.clone());

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);
    let shutdown = stop_on_ctrl_c();

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path.clone(), event_tx.clone()));
    let mut monitor = spawn_monitor(&config, &display, &event_tx);

    let hotkey_handle = match hotkey::start(&config.hotkey.reset, event_tx.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Reset hotkey unavailable: {e:#}");
            None
        }
    };

    {
        let tx = event_tx.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            if shutdown.wait_for(|stop| *stop).await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    tracing::info!(
        config = %config_path.display(),
        "cabinet-daemon v{} started",
        env!("CARGO_PKG_VERSION")
    );

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::ResetRequested => {
                tracing::info!("Reset requested");
                current_status.state = DaemonState::Resetting;
                status::write_status(&status_path, &current_status);

                let mut stop = shutdown.clone();
                let report = orchestrator.reset(&config, &mut stop).await;

                let failed = report.processes.failed.len()
                    + report.light_testers.failed.len()
                    + report.frontend_killed.failed.len();
                current_status.error =
                    (failed > 0).then(|| format!("Reset could not kill {failed} process(es)"));
                if report.default_image_shown == Some(true) {
                    current_status.current_banner = marquee::monitor::default_image(&config);
                }
                current_status.mark_reset();
                current_status.state = DaemonStatus::resting_state(config.dynamic_marquee.enabled);
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::MarqueeUpdated { event_type, banner } => {
                current_status.last_event = Some(event_type);
                current_status.current_banner = banner;
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::ConfigReloaded(new_config) => {
                tracing::info!("Config reloaded");
                if let Some(handle) = &hotkey_handle {
                    handle.update_key(&new_config.hotkey.reset);
                }
                stop_monitor(monitor).await;
                config = new_config;
                monitor = spawn_monitor(&config, &display, &event_tx);

                current_status.state = DaemonStatus::resting_state(config.dynamic_marquee.enabled);
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::Shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    stop_monitor(monitor).await;
    if let Some(handle) = hotkey_handle {
        handle.stop();
    }
    drop(orchestrator);
    drop(display);
    join_display(display_thread).await;

    current_status.state = DaemonState::Idle;
    current_status.error = None;
    status::write_status(&status_path, &current_status);
    Ok(())
}
