//! Song-selection driven marquee: tails the game's marquee log and pushes
//! the matching banner to the display actor.
pub mod monitor;
pub mod parser;
pub mod watcher;

pub use monitor::run;
