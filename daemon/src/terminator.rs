//! Process termination by name list and by identifier tag.
//!
//! Both sweeps are best-effort and idempotent: a process that is already gone
//! counts as handled, a process that refuses to die is logged and skipped, and
//! finding nothing to kill is not an error.
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::launcher::{self, ProcessRegistry, ProcessTag};
use crate::process_table::{KillOutcome, ProcessEntry, ProcessTable};

/// How long a tagged process gets to disappear after being killed.
pub const EXIT_WAIT: Duration = Duration::from_secs(2);

const EXE_SUFFIX: &str = ".exe";

/// Lower-cases `name` and strips a trailing `.exe`.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(EXE_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

/// Case-insensitive, suffix-normalized set of process names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillList {
    names: Vec<String>,
}

impl KillList {
    /// Normalizes and deduplicates `names`, keeping first-seen order.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut seen = HashSet::new();
        let names = names
            .iter()
            .map(|n| normalize_process_name(n.as_ref()))
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.clone()))
            .collect();
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// True if the process name or its executable file name is on the list.
    pub fn matches(&self, entry: &ProcessEntry) -> bool {
        let name = normalize_process_name(&entry.name);
        let exe = entry.exe_name.as_deref().map(normalize_process_name);
        self.names
            .iter()
            .any(|n| *n == name || exe.as_deref() == Some(n.as_str()))
    }
}

/// What a sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KillReport {
    /// Processes that were terminated, as "name (pid)".
    pub killed: Vec<String>,
    /// Processes that could not be terminated.
    pub failed: Vec<String>,
}

impl KillReport {
    pub fn found_any(&self) -> bool {
        !self.killed.is_empty() || !self.failed.is_empty()
    }

    pub fn merge(&mut self, other: KillReport) {
        self.killed.extend(other.killed);
        self.failed.extend(other.failed);
    }
}

fn label(entry: &ProcessEntry) -> String {
    format!("{} ({})", entry.name, entry.pid)
}

fn record(report: &mut KillReport, entry: &ProcessEntry, outcome: KillOutcome) {
    match outcome {
        KillOutcome::Killed => report.killed.push(label(entry)),
        KillOutcome::AlreadyExited => {
            tracing::debug!("{} already exited", label(entry));
        }
        KillOutcome::Refused => {
            tracing::warn!("Failed to kill {}", label(entry));
            report.failed.push(label(entry));
        }
    }
}

/// Kills every process whose name is on `list`. One enumeration, no retries.
pub fn kill_by_name<T: ProcessTable + ?Sized>(table: &mut T, list: &KillList) -> KillReport {
    let mut report = KillReport::default();
    if list.is_empty() {
        return report;
    }

    let me = std::process::id();
    for entry in table.snapshot() {
        if entry.pid == me || !list.matches(&entry) {
            continue;
        }
        let outcome = table.kill(entry.pid);
        record(&mut report, &entry, outcome);
    }

    if !report.found_any() {
        tracing::info!(names = ?list.names(), "No running processes matched the kill list");
    } else {
        tracing::info!(
            killed = report.killed.len(),
            failed = report.failed.len(),
            "Kill-by-name sweep finished: {:?}",
            report.killed
        );
    }
    report
}

/// Returns every descendant of `root` in `entries`, deepest first.
pub fn descendants_deepest_first(entries: &[ProcessEntry], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for e in entries {
        if let Some(parent) = e.parent {
            // Guard against a pid reporting itself as its own parent.
            if parent != e.pid {
                children.entry(parent).or_default().push(e.pid);
            }
        }
    }

    // Breadth-first with depth, then reversed so leaves go first.
    let mut order = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut frontier = vec![root];
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for pid in frontier {
            for &child in children.get(&pid).map(Vec::as_slice).unwrap_or(&[]) {
                if seen.insert(child) {
                    order.push(child);
                    next.push(child);
                }
            }
        }
        frontier = next;
    }
    order.reverse();
    order
}

/// Kills the descendants of `root` (deepest first), then `root`, and waits
/// briefly for `root` to exit.
fn kill_tree<T: ProcessTable + ?Sized>(
    table: &mut T,
    entries: &[ProcessEntry],
    root: &ProcessEntry,
    report: &mut KillReport,
) {
    let me = std::process::id();
    let by_pid: HashMap<u32, &ProcessEntry> = entries.iter().map(|e| (e.pid, e)).collect();

    for pid in descendants_deepest_first(entries, root.pid) {
        if pid == me {
            continue;
        }
        if let Some(child) = by_pid.get(&pid) {
            let outcome = table.kill(pid);
            record(report, child, outcome);
        }
    }

    let outcome = table.kill(root.pid);
    record(report, root, outcome);
    if outcome == KillOutcome::Killed && !table.wait_for_exit(root.pid, EXIT_WAIT) {
        tracing::warn!("{} did not exit within {:?}", label(root), EXIT_WAIT);
    }
}

/// Kills every process whose command line carries `tag`, together with all of
/// its descendants. Broadcast: all matches die, not just the first.
pub fn kill_by_identifier<T: ProcessTable + ?Sized>(table: &mut T, tag: &ProcessTag) -> KillReport {
    let mut report = KillReport::default();
    let me = std::process::id();
    let entries = table.snapshot();
    let targets: Vec<&ProcessEntry> = entries
        .iter()
        .filter(|e| e.pid != me && tag.matches(&e.command_line))
        .collect();

    if targets.is_empty() {
        tracing::info!("No process found with identifier '{tag}'");
        return report;
    }

    for target in targets {
        tracing::info!("Killing {} tagged '{tag}'", label(target));
        kill_tree(table, &entries, target, &mut report);
    }
    report
}

/// Kills the process tree for `tag`: our own registered child first (which
/// is then reaped), then any tagged process left over from an earlier run.
pub fn kill_role<T: ProcessTable + ?Sized>(
    table: &mut T,
    registry: &mut ProcessRegistry,
    tag: &ProcessTag,
) -> KillReport {
    let mut report = KillReport::default();

    if registry.live_pid(tag).is_some() {
        let entries = table.snapshot();
        if let Some(mut child) = registry.take(tag) {
            if let Some(root) = entries.iter().find(|e| e.pid == child.id()) {
                kill_tree(table, &entries, root, &mut report);
            }
            launcher::reap(&mut child);
        }
    }

    report.merge(kill_by_identifier(table, tag));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_table::fake::{entry, FakeTable};

    // ── normalization ─────────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_exe_and_lowercases() {
        assert_eq!(normalize_process_name("ITGmania.EXE"), "itgmania");
        assert_eq!(normalize_process_name("mame"), "mame");
        assert_eq!(normalize_process_name("  RetroArch.exe "), "retroarch");
    }

    #[test]
    fn normalize_keeps_bare_suffix() {
        assert_eq!(normalize_process_name(".exe"), ".exe");
    }

    #[test]
    fn kill_list_dedupes_case_insensitively() {
        let list = KillList::new(&["MAME.exe", "mame", "Mame.EXE", "notepad.exe", ""]);
        assert_eq!(list.names(), &["mame".to_string(), "notepad".to_string()]);
    }

    #[test]
    fn kill_list_matches_exe_name_when_process_name_is_truncated() {
        let list = KillList::new(&["LEDBlinkyInputTester.exe"]);
        let mut e = entry(10, None, "LEDBlinkyInputT", "");
        assert!(!list.matches(&e));
        e.exe_name = Some("LEDBlinkyInputTester.exe".into());
        assert!(list.matches(&e));
    }

    // ── kill_by_name ──────────────────────────────────────────────────────────

    fn cabinet_table() -> FakeTable {
        FakeTable::with(vec![
            entry(1, None, "explorer.exe", "explorer.exe"),
            entry(20, Some(1), "ITGmania.exe", "ITGmania.exe"),
            entry(21, Some(1), "MAME.EXE", "mame.exe sf2"),
            entry(22, Some(1), "notepad.exe", "notepad.exe readme.txt"),
            entry(23, Some(1), "notepad.exe", "notepad.exe other.txt"),
        ])
    }

    #[test]
    fn kill_by_name_kills_every_match_case_insensitively() {
        let mut table = cabinet_table();
        let list = KillList::new(&["itgmania", "mame.exe", "Notepad.exe"]);
        let report = kill_by_name(&mut table, &list);

        assert_eq!(report.killed.len(), 4);
        assert!(report.failed.is_empty());
        assert_eq!(table.names(), vec!["explorer.exe"]);
        assert_eq!(table.snapshots, 1);
    }

    #[test]
    fn kill_by_name_continues_past_refusals() {
        let mut table = cabinet_table();
        table.protected.insert(21);
        let list = KillList::new(&["mame.exe", "notepad.exe"]);
        let report = kill_by_name(&mut table, &list);

        assert_eq!(report.failed, vec!["MAME.EXE (21)"]);
        assert_eq!(report.killed.len(), 2);
        assert!(!table.alive(22) && !table.alive(23));
    }

    #[test]
    fn kill_by_name_is_idempotent() {
        let mut table = cabinet_table();
        let list = KillList::new(&["ITGmania.exe"]);
        let first = kill_by_name(&mut table, &list);
        let second = kill_by_name(&mut table, &list);
        assert_eq!(first.killed.len(), 1);
        assert!(!second.found_any());
    }

    #[test]
    fn empty_kill_list_does_not_enumerate() {
        let mut table = cabinet_table();
        let report = kill_by_name(&mut table, &KillList::default());
        assert!(!report.found_any());
        assert_eq!(table.snapshots, 0);
    }

    // ── kill_by_identifier ────────────────────────────────────────────────────

    #[test]
    fn descendants_are_ordered_deepest_first() {
        let entries = vec![
            entry(100, Some(1), "sh", ""),
            entry(101, Some(100), "a", ""),
            entry(102, Some(101), "b", ""),
            entry(103, Some(100), "c", ""),
            entry(104, Some(104), "self-parent", ""),
        ];
        let order = descendants_deepest_first(&entries, 100);
        assert_eq!(order.len(), 3);
        // 102 is a grandchild, so it must die before its parent 101.
        let pos = |pid| order.iter().position(|&p| p == pid).unwrap();
        assert!(pos(102) < pos(101));
        assert!(!order.contains(&100));
    }

    #[test]
    fn kill_by_identifier_kills_tree_children_first() {
        let mut table = FakeTable::with(vec![
            entry(1, None, "init", ""),
            entry(50, Some(1), "cabinet-daemon", "cabinet-daemon show-image a.png identifier=marquee_image"),
            entry(51, Some(50), "helper", "helper"),
            entry(52, Some(51), "grandchild", "grandchild"),
            entry(60, Some(1), "frontend.exe", "frontend.exe identifier=frontend"),
        ]);
        let report = kill_by_identifier(&mut table, &ProcessTag::marquee());

        assert_eq!(table.killed, vec![52, 51, 50]);
        assert_eq!(report.killed.len(), 3);
        assert!(table.alive(60));
    }

    #[test]
    fn kill_by_identifier_is_broadcast() {
        let mut table = FakeTable::with(vec![
            entry(70, Some(1), "viewer", "viewer identifier=marquee_image"),
            entry(71, Some(1), "viewer", "viewer identifier=marquee_display"),
            entry(72, Some(1), "viewer", "viewer identifier=frontend"),
        ]);
        kill_by_identifier(&mut table, &ProcessTag::marquee());
        assert!(!table.alive(70));
        assert!(!table.alive(71), "legacy alias must be honoured");
        assert!(table.alive(72));
    }

    #[test]
    fn kill_by_identifier_without_match_is_noop() {
        let mut table = cabinet_table();
        let report = kill_by_identifier(&mut table, &ProcessTag::frontend());
        assert!(!report.found_any());
        assert!(table.killed.is_empty());
    }

    #[test]
    fn kill_by_identifier_never_targets_current_process() {
        let me = std::process::id();
        let mut table = FakeTable::with(vec![entry(me, None, "self", "self identifier=frontend")]);
        let report = kill_by_identifier(&mut table, &ProcessTag::frontend());
        assert!(!report.found_any());
        assert!(table.alive(me));
    }

    #[test]
    fn kill_role_without_own_child_falls_back_to_table_scan() {
        let mut table = FakeTable::with(vec![entry(80, Some(1), "frontend", "frontend identifier=frontend")]);
        let mut registry = ProcessRegistry::new();
        let report = kill_role(&mut table, &mut registry, &ProcessTag::frontend());
        assert_eq!(report.killed, vec!["frontend (80)"]);
    }

    #[cfg(unix)]
    #[test]
    fn kill_by_identifier_terminates_real_tagged_process() {
        use crate::process_table::SystemTable;
        use std::time::Instant;

        let tag = ProcessTag::new(format!("terminator_test_{}", std::process::id()));
        // Two sleeps keep the shell waiting on a child until it is killed itself.
        let mut child = std::process::Command::new("sh")
            .args(["-c", "sleep 30; sleep 30"])
            .arg(tag.arg())
            .spawn()
            .unwrap();

        let mut table = SystemTable::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut report = KillReport::default();
        while Instant::now() < deadline {
            report = kill_by_identifier(&mut table, &tag);
            if report.found_any() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(report.found_any(), "tagged shell was never found");

        let waited = Instant::now();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(waited.elapsed() < Duration::from_secs(10));
    }
}
