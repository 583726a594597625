//! Identifier-tagged process launcher.
//!
//! Every process the cabinet starts gets a trailing `identifier=<tag>` argument.
//! Nothing records the PID: a later run finds the process again by scanning the
//! OS process table for that token (see [`crate::terminator`]). Within one run
//! the [`ProcessRegistry`] additionally keeps the `Child` handles of our own
//! children so they can be reaped.
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Child, Command, Stdio};

pub const TAG_PREFIX: &str = "identifier=";
pub const MARQUEE_TAG: &str = "marquee_image";
pub const FRONTEND_TAG: &str = "frontend";
pub const MAME_LIGHTS_TAG: &str = "mame_lights";

/// Old tag names still honoured by kill-by-identifier, mapped to their
/// replacement. Compatibility only; do not add entries.
const LEGACY_TAG_ALIASES: &[(&str, &str)] = &[("marquee_display", MARQUEE_TAG)];

/// A logical role embedded in a child's command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessTag(String);

impl ProcessTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn marquee() -> Self {
        Self::new(MARQUEE_TAG)
    }

    pub fn frontend() -> Self {
        Self::new(FRONTEND_TAG)
    }

    pub fn mame_lights() -> Self {
        Self::new(MAME_LIGHTS_TAG)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The command-line argument carrying this tag.
    pub fn arg(&self) -> String {
        format!("{TAG_PREFIX}{}", self.0)
    }

    /// Every `identifier=` token that denotes this tag, legacy aliases included.
    pub fn match_tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.arg()];
        tokens.extend(
            LEGACY_TAG_ALIASES
                .iter()
                .filter(|(_, current)| *current == self.0)
                .map(|(legacy, _)| format!("{TAG_PREFIX}{legacy}")),
        );
        tokens
    }

    /// True if `command_line` carries this tag (substring match).
    pub fn matches(&self, command_line: &str) -> bool {
        self.match_tokens()
            .iter()
            .any(|token| command_line.contains(token.as_str()))
    }
}

impl std::fmt::Display for ProcessTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// True for the `identifier=<tag>` marker argument.
pub fn is_tag_arg(arg: &OsStr) -> bool {
    arg.to_string_lossy().starts_with(TAG_PREFIX)
}

/// Result of [`launch`]. Callers are free to drop it.
#[derive(Debug)]
pub enum ChildHandle {
    Spawned(Child),
    Failed(String),
}

impl ChildHandle {
    pub fn into_child(self) -> Option<Child> {
        match self {
            ChildHandle::Spawned(child) => Some(child),
            ChildHandle::Failed(_) => None,
        }
    }
}

/// Builds the full argument vector (program first) for `target`.
///
/// Scripts are run through their interpreter; anything else is executed
/// directly. The tag, if any, is always the last argument.
pub fn build_argv(target: &Path, tag: Option<&ProcessTag>, extra_args: &[String]) -> Vec<OsString> {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let mut argv: Vec<OsString> = match ext.as_deref() {
        Some("py") | Some("pyw") => vec![python_interpreter().into()],
        Some("ps1") => vec![
            "powershell".into(),
            "-NoProfile".into(),
            "-ExecutionPolicy".into(),
            "Bypass".into(),
            "-File".into(),
        ],
        Some("bat") | Some("cmd") => vec!["cmd".into(), "/C".into()],
        Some("sh") => vec!["sh".into()],
        _ => Vec::new(),
    };
    argv.push(target.as_os_str().to_owned());
    argv.extend(extra_args.iter().map(OsString::from));
    if let Some(tag) = tag {
        argv.push(tag.arg().into());
    }
    argv
}

#[cfg(windows)]
fn python_interpreter() -> &'static str {
    // pythonw has no console window.
    "pythonw"
}

#[cfg(not(windows))]
fn python_interpreter() -> &'static str {
    "python3"
}

/// Starts `target` detached and hidden, tagged with `tag`.
///
/// Never fails loudly: a missing target or a spawn error is logged and
/// reported as [`ChildHandle::Failed`] so callers can carry on.
pub fn launch(target: &Path, tag: Option<&ProcessTag>, extra_args: &[String]) -> ChildHandle {
    if !target.exists() {
        let reason = format!("launch target not found: {}", target.display());
        tracing::warn!("{reason}");
        return ChildHandle::Failed(reason);
    }

    let mut cmd = hidden_command(target, &build_argv(target, tag, extra_args));
    match cmd.spawn() {
        Ok(child) => {
            tracing::info!(
                pid = child.id(),
                tag = tag.map(ProcessTag::name).unwrap_or("-"),
                "Launched {}",
                target.display()
            );
            ChildHandle::Spawned(child)
        }
        Err(e) => {
            let reason = format!("failed to spawn {}: {e}", target.display());
            tracing::error!("{reason}");
            ChildHandle::Failed(reason)
        }
    }
}

/// A command for `argv` that runs detached with no console window and null
/// stdio, from the target's directory. Shared by every process the cabinet
/// starts, including the ones it waits on.
pub fn hidden_command(target: &Path, argv: &[OsString]) -> Command {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }
    detach(&mut cmd);
    cmd
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x00000008;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NO_WINDOW);
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Own process group, so a Ctrl+C aimed at the daemon does not reach the child.
    cmd.process_group(0);
}

#[cfg(not(any(windows, unix)))]
fn detach(_cmd: &mut Command) {}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Own children of this process, keyed by tag name.
///
/// Only covers processes launched during the current run; anything older is
/// found through the process table.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: HashMap<String, Child>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a launched child under `tag`, reaping whatever it replaces.
    pub fn insert(&mut self, tag: &ProcessTag, handle: ChildHandle) -> Option<u32> {
        let child = handle.into_child()?;
        let pid = child.id();
        if let Some(mut previous) = self.children.insert(tag.name().to_string(), child) {
            reap(&mut previous);
        }
        Some(pid)
    }

    /// PID of the live child registered under `tag`, if it is still running.
    pub fn live_pid(&mut self, tag: &ProcessTag) -> Option<u32> {
        let child = self.children.get_mut(tag.name())?;
        match child.try_wait() {
            Ok(None) => Some(child.id()),
            _ => {
                self.children.remove(tag.name());
                None
            }
        }
    }

    /// Removes the child registered under `tag` and returns it.
    pub fn take(&mut self, tag: &ProcessTag) -> Option<Child> {
        self.children.remove(tag.name())
    }

}

/// Kills `child` if it is still running and collects its exit status.
pub fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(argv: &[OsString]) -> Vec<String> {
        argv.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    // ── tags ──────────────────────────────────────────────────────────────────

    #[test]
    fn tag_arg_has_identifier_prefix() {
        assert_eq!(ProcessTag::marquee().arg(), "identifier=marquee_image");
        assert_eq!(ProcessTag::frontend().arg(), "identifier=frontend");
    }

    #[test]
    fn tag_matches_substring_of_command_line() {
        let tag = ProcessTag::frontend();
        assert!(tag.matches("C:/Cabinet/frontend.exe --fullscreen identifier=frontend"));
        assert!(!tag.matches("C:/Cabinet/frontend.exe --fullscreen"));
    }

    #[test]
    fn legacy_alias_matches_current_marquee_tag() {
        let tag = ProcessTag::marquee();
        assert!(tag.matches("python show_image.py banner.png identifier=marquee_display"));
        assert!(tag.matches("cabinet-daemon show-image banner.png identifier=marquee_image"));
    }

    #[test]
    fn legacy_alias_does_not_leak_to_other_tags() {
        assert_eq!(ProcessTag::frontend().match_tokens(), vec!["identifier=frontend"]);
        assert!(!ProcessTag::frontend().matches("x identifier=marquee_display"));
    }

    #[test]
    fn is_tag_arg_detects_marker() {
        assert!(is_tag_arg(OsStr::new("identifier=marquee_image")));
        assert!(!is_tag_arg(OsStr::new("--identifier")));
        assert!(!is_tag_arg(OsStr::new("banner.png")));
    }

    // ── build_argv ────────────────────────────────────────────────────────────

    #[test]
    fn argv_for_binary_appends_tag_last() {
        let argv = build_argv(
            Path::new("/opt/frontend/frontend"),
            Some(&ProcessTag::frontend()),
            &["--fullscreen".to_string()],
        );
        assert_eq!(
            strs(&argv),
            vec!["/opt/frontend/frontend", "--fullscreen", "identifier=frontend"]
        );
    }

    #[test]
    fn argv_without_tag_has_no_marker() {
        let argv = build_argv(Path::new("/opt/tool"), None, &[]);
        assert_eq!(strs(&argv), vec!["/opt/tool"]);
    }

    #[test]
    fn argv_for_python_script_uses_interpreter() {
        let argv = build_argv(Path::new("scripts/show.py"), Some(&ProcessTag::marquee()), &[]);
        let argv = strs(&argv);
        assert_eq!(argv[0], python_interpreter());
        assert_eq!(argv[1], "scripts/show.py");
        assert_eq!(argv.last().unwrap(), "identifier=marquee_image");
    }

    #[test]
    fn argv_for_batch_and_shell_scripts() {
        let bat = strs(&build_argv(Path::new("reset.BAT"), None, &[]));
        assert_eq!(bat, vec!["cmd", "/C", "reset.BAT"]);
        let sh = strs(&build_argv(Path::new("reset.sh"), None, &[]));
        assert_eq!(sh, vec!["sh", "reset.sh"]);
    }

    #[test]
    fn argv_for_powershell_script() {
        let ps = strs(&build_argv(Path::new("lights.ps1"), None, &[]));
        assert_eq!(ps.first().unwrap(), "powershell");
        assert_eq!(ps.last().unwrap(), "lights.ps1");
    }

    // ── launch ────────────────────────────────────────────────────────────────

    #[test]
    fn launch_missing_target_returns_failed_handle() {
        let dir = tempfile::tempdir().unwrap();
        let handle = launch(&dir.path().join("missing.exe"), Some(&ProcessTag::frontend()), &[]);
        assert!(matches!(handle, ChildHandle::Failed(reason) if reason.contains("not found")));
    }

    #[cfg(unix)]
    #[test]
    fn launch_script_and_registry_reap() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("idle.sh");
        std::fs::write(&script, "sleep 30\n").unwrap();

        let tag = ProcessTag::new("launcher_test_idle");
        let handle = launch(&script, Some(&tag), &[]);
        assert!(matches!(handle, ChildHandle::Spawned(_)));

        let mut registry = ProcessRegistry::new();
        let pid = registry.insert(&tag, handle).unwrap();
        assert_eq!(registry.live_pid(&tag), Some(pid));

        let mut child = registry.take(&tag).unwrap();
        reap(&mut child);
        assert!(registry.live_pid(&tag).is_none());
        assert!(registry.take(&tag).is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn hidden_command_runs_in_its_own_process_group() {
        let target = Path::new("/bin/sleep");
        let argv = vec![OsString::from("sleep"), OsString::from("30")];
        let mut child = hidden_command(target, &argv).spawn().unwrap();

        let stat = std::fs::read_to_string(format!("/proc/{}/stat", child.id())).unwrap();
        // Fields after the parenthesised name: state ppid pgrp ...
        let after_name = &stat[stat.rfind(')').unwrap() + 1..];
        let pgrp: u32 = after_name.split_whitespace().nth(2).unwrap().parse().unwrap();
        assert_eq!(pgrp, child.id());

        reap(&mut child);
    }

    #[test]
    fn registry_ignores_failed_handles() {
        let mut registry = ProcessRegistry::new();
        let pid = registry.insert(&ProcessTag::frontend(), ChildHandle::Failed("nope".into()));
        assert!(pid.is_none());
        assert!(registry.take(&ProcessTag::frontend()).is_none());
    }
}
