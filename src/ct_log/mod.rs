// src/ct_log/mod.rs
pub mod client;
pub mod coordinator;
pub mod health;
pub mod log_list;
pub mod monitor;
pub mod source;
pub mod types;

pub use coordinator::{CtLogCoordinator, MonitorSet};
pub use health::{LogHealth, LogHealthTracker};
pub use log_list::LogListFetcher;
pub use monitor::LogMonitor;
pub use source::{CancelSignal, HttpLogSource, LogSource};
pub use types::{FetchedBatch, LogDescriptor, LogEntry, LogListV3, SignedTreeHead};
