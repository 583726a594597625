//! The marquee monitor loop.
//!
//! `WATCHING -> EVENT_DETECTED -> DISPLAY_UPDATED -> WATCHING` until the stop
//! signal fires. Wake-ups come from native file notifications with a slow
//! safety tick, or from a fixed poll interval in `poll` mode.
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::parser::{parse_event_block, MarqueeEvent};
use super::watcher::{LogFileWatchState, Poll};
use crate::config::{Config, WatchMode};
use crate::display::actor::{DisplayHandle, Refocus};
use crate::display::DisplayRequest;
use crate::event::DaemonEvent;

/// Tick used alongside native notifications, in case an event is missed.
const SAFETY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Image for events that carry no banner of their own.
pub fn default_image(config: &Config) -> Option<String> {
    config
        .dynamic_marquee
        .banner_path
        .clone()
        .or_else(|| config.display.default_image.clone())
}

fn spawn_watcher(path: &Path, wake: mpsc::Sender<()>) -> notify::Result<RecommendedWatcher> {
    let file_name = path.file_name().map(|n| n.to_os_string());
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                {
                    // A full channel already holds a pending wake-up.
                    let _ = wake.try_send(());
                }
            }
        },
        NotifyConfig::default(),
    )?;

    // Watch the directory so truncate-and-rewrite and delete-recreate are seen.
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

struct MarqueeMonitor {
    config: Config,
    state: LogFileWatchState,
    display: DisplayHandle,
    events: Option<mpsc::Sender<DaemonEvent>>,
}

impl MarqueeMonitor {
    async fn cycle(&mut self) {
        let (content, stamp) = match self.state.poll() {
            Ok(Poll::Changed { content, stamp }) => (content, stamp),
            Ok(Poll::Unchanged) | Ok(Poll::Recreated) => return,
            Err(e) => {
                tracing::warn!("Cannot read marquee log {}: {e}", self.state.path().display());
                return;
            }
        };

        let base = self.config.dynamic_marquee.base_path.as_deref();
        match parse_event_block(&content, base) {
            Ok(None) => self.state.commit(stamp),
            Ok(Some(event)) => {
                self.state.commit(stamp);
                self.apply(event).await;
            }
            // Left uncommitted so the block is re-read once the game finishes it.
            Err(e) => tracing::debug!("Incomplete marquee block, retrying: {e}"),
        }
    }

    async fn apply(&self, event: MarqueeEvent) {
        tracing::info!(event = %event.event_type, "Marquee event detected");

        let image = if event.is_chosen() {
            event.banner_path.clone()
        } else {
            default_image(&self.config)
        };
        let Some(image) = image else {
            tracing::info!("No image configured for '{}' events", event.event_type);
            return;
        };

        let request = DisplayRequest::from_config(PathBuf::from(&image), &self.config);
        let marquee = &self.config.dynamic_marquee;
        let refocus = marquee
            .focus_window_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .map(|title| Refocus {
                title,
                delay: marquee.refocus_delay(),
            });

        if !self.display.show_and_wait(request, refocus).await {
            tracing::warn!("Marquee not updated for '{}' event", event.event_type);
            return;
        }
        if let Some(tx) = &self.events {
            let _ = tx
                .send(DaemonEvent::MarqueeUpdated {
                    event_type: event.event_type,
                    banner: Some(image),
                })
                .await;
        }
    }
}

/// Runs the marquee monitor until `stop` becomes true or its sender is dropped.
///
/// Returns immediately, without touching any file, when the dynamic marquee
/// is disabled or has no log file configured.
pub async fn run(
    config: Config,
    display: DisplayHandle,
    events: Option<mpsc::Sender<DaemonEvent>>,
    mut stop: watch::Receiver<bool>,
) {
    let marquee = &config.dynamic_marquee;
    if !marquee.enabled {
        tracing::info!("Dynamic marquee disabled");
        return;
    }
    let Some(log_file) = marquee.log_file.clone().filter(|p| !p.trim().is_empty()) else {
        tracing::warn!("Dynamic marquee enabled but no log_file configured");
        return;
    };
    if *stop.borrow() {
        return;
    }

    let mut state = LogFileWatchState::new(&log_file);
    state.prime();

    let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
    let watcher = match marquee.watch_mode {
        WatchMode::Poll => None,
        WatchMode::Auto => match spawn_watcher(state.path(), wake_tx) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!("File notifications unavailable, polling instead: {e}");
                None
            }
        },
    };
    let tick = if watcher.is_some() {
        SAFETY_POLL_INTERVAL.max(marquee.poll_interval())
    } else {
        marquee.poll_interval()
    };
    tracing::info!(
        notify = watcher.is_some(),
        tick_ms = tick.as_millis() as u64,
        "Watching marquee log {log_file}"
    );

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut monitor = MarqueeMonitor {
        config,
        state,
        display,
        events,
    };

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
            Some(()) = wake_rx.recv() => {}
        }
        monitor.cycle().await;
    }

    drop(watcher);
    tracing::info!("Marquee monitor stopped");
}
