use crate::config::Config;

pub enum DaemonEvent {
    /// The return-to-menu hotkey was pressed.
    ResetRequested,
    /// The marquee monitor pushed a new banner to the display actor.
    MarqueeUpdated {
        event_type: String,
        banner: Option<String>,
    },
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should stop its loops and exit.
    Shutdown,
}
