//! Read/kill access to the live OS process table.
//!
//! [`ProcessTable`] is the seam the terminator works against; [`SystemTable`]
//! implements it with `sysinfo`, tests use an in-memory table.
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    /// Process name as reported by the OS (may be truncated on Linux).
    pub name: String,
    /// File name of the executable, when readable.
    pub exe_name: Option<String>,
    /// Full command line, arguments joined with spaces.
    pub command_line: String,
}

/// Outcome of a single kill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    /// The process was already gone; treated as success.
    AlreadyExited,
    /// The OS refused (permissions, protected process).
    Refused,
}

pub trait ProcessTable {
    /// Enumerates live processes, command lines included.
    fn snapshot(&mut self) -> Vec<ProcessEntry>;

    /// Forcibly terminates `pid`.
    fn kill(&mut self, pid: u32) -> KillOutcome;

    /// Waits up to `timeout` for `pid` to disappear. Returns true once it has.
    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool;
}

/// [`ProcessTable`] over the real OS process list.
pub struct SystemTable {
    sys: System,
}

impl SystemTable {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    fn refresh_all(&mut self) {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );
    }

    fn is_alive(&mut self, pid: Pid) -> bool {
        self.sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.sys.process(pid) {
            // A zombie has exited; only its parent's bookkeeping is left.
            Some(p) => !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }
}

impl Default for SystemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemTable {
    fn snapshot(&mut self) -> Vec<ProcessEntry> {
        self.refresh_all();
        self.sys
            .processes()
            .values()
            // Linux lists every thread as a row of its own, parented to the process.
            .filter(|p| p.thread_kind().is_none())
            .filter(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                parent: p.parent().map(|pp| pp.as_u32()),
                name: p.name().to_string_lossy().into_owned(),
                exe_name: p
                    .exe()
                    .and_then(|exe| exe.file_name())
                    .map(|n| n.to_string_lossy().into_owned()),
                command_line: p
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect()
    }

    fn kill(&mut self, pid: u32) -> KillOutcome {
        let pid = Pid::from_u32(pid);
        if !self.is_alive(pid) {
            return KillOutcome::AlreadyExited;
        }
        let signalled = match self.sys.process(pid) {
            Some(process) => process.kill(),
            None => return KillOutcome::AlreadyExited,
        };
        if signalled {
            KillOutcome::Killed
        } else if self.is_alive(pid) {
            KillOutcome::Refused
        } else {
            // Lost a race with a normal exit.
            KillOutcome::AlreadyExited
        }
    }

    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool {
        let pid = Pid::from_u32(pid);
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}
