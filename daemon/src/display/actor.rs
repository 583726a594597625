//! Serializes marquee transitions.
//!
//! The reset path and the marquee monitor both want "kill the old banner,
//! show a new one". Both go through one queue drained by a single thread, so
//! two triggers can never interleave their kill and show steps.
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::DisplayRequest;
use crate::focus;
use crate::launcher::{ProcessRegistry, ProcessTag};
use crate::process_table::ProcessTable;
use crate::terminator;

const QUEUE_DEPTH: usize = 16;

/// Window to bring back to the foreground after a banner is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refocus {
    pub title: String,
    pub delay: Duration,
}

pub enum DisplayCommand {
    /// Kill the current banner, then show `request`.
    Show {
        request: DisplayRequest,
        refocus: Option<Refocus>,
        done: oneshot::Sender<bool>,
    },
    /// Kill the current banner and leave the marquee empty.
    Clear { done: oneshot::Sender<()> },
}

/// The side effects the actor drives. Swapped for a recorder in tests.
pub trait DisplayBackend: Send + 'static {
    fn clear(&mut self);
    /// Returns true if a display process was started.
    fn show(&mut self, request: &DisplayRequest) -> bool;
    fn refocus(&mut self, title: &str);
}

/// Cloneable sender side of the display actor.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::Sender<DisplayCommand>,
}

impl DisplayHandle {
    pub fn from_sender(tx: mpsc::Sender<DisplayCommand>) -> Self {
        Self { tx }
    }

    /// Queues a transition and waits until it has run. Returns whether a
    /// display process was started.
    pub async fn show_and_wait(&self, request: DisplayRequest, refocus: Option<Refocus>) -> bool {
        let (done, rx) = oneshot::channel();
        let cmd = DisplayCommand::Show {
            request,
            refocus,
            done,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Kills the current banner and waits for it. False if the actor is gone.
    pub async fn clear_and_wait(&self) -> bool {
        let (done, rx) = oneshot::channel();
        if self.tx.send(DisplayCommand::Clear { done }).await.is_err() {
            return false;
        }
        rx.await.is_ok()
    }
}

/// Starts the actor thread. It exits once every [`DisplayHandle`] is dropped.
pub fn spawn<B: DisplayBackend>(
    backend: B,
) -> std::io::Result<(DisplayHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let thread = thread::Builder::new()
        .name("display-actor".into())
        .spawn(move || run(backend, rx))?;
    Ok((DisplayHandle::from_sender(tx), thread))
}

fn run<B: DisplayBackend>(mut backend: B, mut rx: mpsc::Receiver<DisplayCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DisplayCommand::Show {
                request,
                refocus,
                done,
            } => {
                let shown = transition(&mut backend, &request, refocus.as_ref());
                let _ = done.send(shown);
            }
            DisplayCommand::Clear { done } => {
                backend.clear();
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Display actor stopped");
}

fn transition<B: DisplayBackend>(
    backend: &mut B,
    request: &DisplayRequest,
    refocus: Option<&Refocus>,
) -> bool {
    // Keep the current banner rather than blanking the marquee for nothing.
    if !request.image_path.exists() {
        tracing::warn!(
            "Marquee image not found, keeping current banner: {}",
            request.image_path.display()
        );
        return false;
    }
    backend.clear();
    let shown = backend.show(request);
    if shown {
        if let Some(refocus) = refocus {
            thread::sleep(refocus.delay);
            backend.refocus(&refocus.title);
        }
    }
    shown
}

// ── Process backend ───────────────────────────────────────────────────────────

/// Real backend: display processes of this binary, killed by identifier.
pub struct ProcessBackend<T: ProcessTable + Send + 'static> {
    table: Arc<Mutex<T>>,
    registry: ProcessRegistry,
    viewer: PathBuf,
}

impl<T: ProcessTable + Send + 'static> ProcessBackend<T> {
    pub fn new(table: Arc<Mutex<T>>, viewer: PathBuf) -> Self {
        Self {
            table,
            registry: ProcessRegistry::new(),
            viewer,
        }
    }
}

impl<T: ProcessTable + Send + 'static> DisplayBackend for ProcessBackend<T> {
    fn clear(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        terminator::kill_role(&mut *table, &mut self.registry, &ProcessTag::marquee());
    }

    fn show(&mut self, request: &DisplayRequest) -> bool {
        let handle = super::show(&self.viewer, request);
        self.registry.insert(&ProcessTag::marquee(), handle).is_some()
    }

    fn refocus(&mut self, title: &str) {
        focus::focus_window(title);
    }
}

#[cfg(test)]
pub mod fake {
    //! Recording backend for tests.
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Clear,
        Show(PathBuf),
        Refocus(String),
    }

    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingBackend {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DisplayBackend for RecordingBackend {
        fn clear(&mut self) {
            self.calls.lock().unwrap().push(Call::Clear);
        }

        fn show(&mut self, request: &DisplayRequest) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Show(request.image_path.clone()));
            true
        }

        fn refocus(&mut self, title: &str) {
            self.calls.lock().unwrap().push(Call::Refocus(title.to_string()));
        }
    }
}
