use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::launcher;

#[derive(Parser, Debug)]
#[command(
    name = "cabinet-daemon",
    version,
    about = "Arcade cabinet process lifecycle and marquee orchestrator"
)]
pub struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the daemon: marquee monitor, reset hotkey and config reload (default)
    Run,
    /// Return the cabinet to the frontend menu once
    Reset,
    /// Kill every process on the kill list and the lighting test tools
    KillAll,
    /// Watch the marquee log and update the marquee until Ctrl+C
    Marquee,
    /// Show an image full-screen on a monitor until killed
    ShowImage {
        image: PathBuf,
        /// Background color: a name, #RGB or #RRGGBB
        #[arg(long, default_value = crate::config::DEFAULT_BACKGROUND_COLOR)]
        color: String,
        /// Zero-based monitor index
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        monitor: i32,
        /// Close the window after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Start the mame-lights helper
    StartLights,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// Drops the trailing `identifier=<tag>` markers this binary is launched
/// with, so they never reach the argument parser.
pub fn strip_tag_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    while args.len() > 1 && args.last().is_some_and(|a| launcher::is_tag_arg(a)) {
        args.pop();
    }
    args
}
