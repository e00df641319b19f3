pub mod config;
pub mod history_store;
pub mod poll_loop;
pub mod tracker;

pub use config::MonitorConfig;
pub use history_store::HistoryStore;
pub use poll_loop::{CycleOutcome, PollLoop, PollSettings};
pub use tracker::Tracker;
