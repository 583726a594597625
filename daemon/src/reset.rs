//! Return-to-menu sequence.
//!
//! 1. kill everything on the kill list
//! 2. reset the lights (time-boxed)
//! 3. kill lighting test tools
//! 4. clear the marquee and kill the frontend
//! 5. show the default marquee image (dynamic marquee only)
//! 6. relaunch the frontend
//!
//! Every step is best-effort: a failing step is logged and recorded in the
//! [`ResetReport`], and the sequence carries on. Nothing is rolled back.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::config::Config;
use crate::display::actor::DisplayHandle;
use crate::display::DisplayRequest;
use crate::launcher::{self, ProcessRegistry, ProcessTag};
use crate::lights::{self, LightResetOutcome};
use crate::marquee::monitor::default_image;
use crate::process_table::ProcessTable;
use crate::terminator::{self, KillList, KillReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub processes: KillReport,
    pub lights: LightResetOutcome,
    pub light_testers: KillReport,
    pub marquee_cleared: bool,
    pub frontend_killed: KillReport,
    /// `None` when the step did not apply; otherwise whether a display started.
    pub default_image_shown: Option<bool>,
    pub frontend_pid: Option<u32>,
}

/// Every process name `kill-all` targets: the kill list plus lighting test tools.
pub fn sweep_names(config: &Config) -> Vec<String> {
    let mut names = config.kill_list.processes.clone();
    names.extend(config.lighting.test_processes.iter().cloned());
    names
}

pub struct Orchestrator<T: ProcessTable + Send + 'static> {
    table: Arc<Mutex<T>>,
    registry: Arc<Mutex<ProcessRegistry>>,
    display: DisplayHandle,
}

impl<T: ProcessTable + Send + 'static> Orchestrator<T> {
    pub fn new(table: Arc<Mutex<T>>, display: DisplayHandle) -> Self {
        Self {
            table,
            registry: Arc::new(Mutex::new(ProcessRegistry::new())),
            display,
        }
    }

    /// Runs `f` against the process table on the blocking pool.
    async fn with_table<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T, &mut ProcessRegistry) -> R + Send + 'static,
    {
        let table = Arc::clone(&self.table);
        let registry = Arc::clone(&self.registry);
        let joined = tokio::task::spawn_blocking(move || {
            let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *table, &mut *registry)
        })
        .await;
        match joined {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::error!("Process table task failed: {e}");
                None
            }
        }
    }

    async fn kill_names(&self, names: Vec<String>) -> KillReport {
        let list = KillList::new(&names);
        if list.is_empty() {
            return KillReport::default();
        }
        self.with_table(move |table, _| terminator::kill_by_name(table, &list))
            .await
            .unwrap_or_default()
    }

    /// Kills the kill list and the lighting test tools in one sweep.
    pub async fn kill_all(&self, config: &Config) -> KillReport {
        self.kill_names(sweep_names(config)).await
    }

    /// Runs the full return-to-menu sequence. `stop` only cuts the light
    /// reset wait short; every other step still runs.
    pub async fn reset(&self, config: &Config, stop: &mut watch::Receiver<bool>) -> ResetReport {
        tracing::info!("Reset: killing {} listed process name(s)", config.kill_list.processes.len());
        let processes = self.kill_names(config.kill_list.processes.clone()).await;

        let lights = lights::reset_lights(&config.lighting, stop).await;
        tracing::info!("Reset: lights {lights:?}");

        let light_testers = if config.lighting.enabled {
            self.kill_names(config.lighting.test_processes.clone()).await
        } else {
            KillReport::default()
        };

        let marquee_cleared = self.display.clear_and_wait().await;
        if !marquee_cleared {
            tracing::warn!("Reset: display actor unavailable, marquee not cleared");
        }
        let frontend_killed = self
            .with_table(|table, registry| {
                terminator::kill_role(table, registry, &ProcessTag::frontend())
            })
            .await
            .unwrap_or_default();

        let default_image_shown = if config.dynamic_marquee.enabled {
            Some(self.show_default(config).await)
        } else {
            None
        };

        let frontend_pid = self.launch_frontend(config).await;

        let report = ResetReport {
            processes,
            lights,
            light_testers,
            marquee_cleared,
            frontend_killed,
            default_image_shown,
            frontend_pid,
        };
        tracing::info!(
            killed = report.processes.killed.len() + report.light_testers.killed.len(),
            frontend = ?report.frontend_pid,
            "Reset complete"
        );
        report
    }

    async fn show_default(&self, config: &Config) -> bool {
        let Some(image) = default_image(config) else {
            tracing::info!("Reset: no default marquee image configured");
            return false;
        };
        let request = DisplayRequest::from_config(PathBuf::from(image), config);
        self.display.show_and_wait(request, None).await
    }

    async fn launch_frontend(&self, config: &Config) -> Option<u32> {
        let Some(exe) = config.frontend.executable.clone().filter(|e| !e.trim().is_empty()) else {
            tracing::warn!("Reset: no frontend executable configured");
            return None;
        };
        let args = config.frontend.args.clone();
        self.with_table(move |_, registry| {
            let handle = launcher::launch(Path::new(&exe), Some(&ProcessTag::frontend()), &args);
            registry.insert(&ProcessTag::frontend(), handle)
        })
        .await
        .flatten()
    }
}
