//! Lighting controller calls. Both executables are opaque: the reset tool is
//! run to completion (bounded by a grace period), the mame-lights tool is
//! started detached and left running.
use std::path::Path;
use std::process::ExitStatus;

use tokio::process::Command;
use tokio::sync::watch;

use crate::config::LightingConfig;
use crate::launcher::{self, ChildHandle, ProcessTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightResetOutcome {
    /// Lighting disabled or no reset executable configured.
    Skipped,
    Completed,
    /// Exited on its own with a failure code.
    ExitedWithError(Option<i32>),
    /// Still running after the grace period; killed.
    TimedOut,
    /// The stop signal fired while waiting; killed.
    Cancelled,
    Failed(String),
}

enum Wait {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            if *stop.borrow() {
                return;
            }
            // Nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the configured light reset executable and waits at most the grace
/// period for it, killing it afterwards.
pub async fn reset_lights(
    config: &LightingConfig,
    stop: &mut watch::Receiver<bool>,
) -> LightResetOutcome {
    if !config.enabled {
        return LightResetOutcome::Skipped;
    }
    let Some(exe) = config.reset_executable.as_deref().filter(|p| !p.trim().is_empty()) else {
        tracing::warn!("Lighting enabled but no reset_executable configured");
        return LightResetOutcome::Skipped;
    };
    let exe = Path::new(exe);
    if !exe.exists() {
        let reason = format!("light reset executable not found: {}", exe.display());
        tracing::warn!("{reason}");
        return LightResetOutcome::Failed(reason);
    }

    let argv = launcher::build_argv(exe, None, &[]);
    let mut cmd = Command::from(launcher::hidden_command(exe, &argv));
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let reason = format!("failed to start {}: {e}", exe.display());
            tracing::error!("{reason}");
            return LightResetOutcome::Failed(reason);
        }
    };
    tracing::info!(pid = child.id(), "Resetting lights via {}", exe.display());

    let waited = tokio::select! {
        status = child.wait() => Wait::Exited(status),
        _ = tokio::time::sleep(config.grace_period()) => Wait::TimedOut,
        _ = stop_requested(stop) => Wait::Cancelled,
    };

    match waited {
        Wait::Exited(Ok(status)) if status.success() => LightResetOutcome::Completed,
        Wait::Exited(Ok(status)) => {
            tracing::warn!("Light reset exited with {status}");
            LightResetOutcome::ExitedWithError(status.code())
        }
        Wait::Exited(Err(e)) => LightResetOutcome::Failed(format!("wait failed: {e}")),
        Wait::TimedOut => {
            tracing::warn!(
                grace_ms = config.grace_period_ms,
                "Light reset still running after grace period, killing it"
            );
            let _ = child.kill().await;
            LightResetOutcome::TimedOut
        }
        Wait::Cancelled => {
            let _ = child.kill().await;
            LightResetOutcome::Cancelled
        }
    }
}

/// Starts the mame-lights helper detached, tagged `mame_lights`.
pub fn start_mame_lights(config: &LightingConfig) -> ChildHandle {
    match config.mame_lights_executable.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(exe) => launcher::launch(Path::new(exe), Some(&ProcessTag::mame_lights()), &[]),
        None => {
            let reason = "no mame_lights_executable configured".to_string();
            tracing::warn!("{reason}");
            ChildHandle::Failed(reason)
        }
    }
}
