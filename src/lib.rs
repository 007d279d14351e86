//! Library crate for scan-client-rs: the scan lifecycle client and its collaborators.
pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod render;
pub mod server;
pub mod session;
pub mod sink;
pub mod types;

pub use api::{HttpScanApi, ScanApi};
pub use config::{ClientConfig, PollPolicy};
pub use manager::{ScanManager, SessionHandle};
pub use session::ScanSession;
pub use sink::{ChannelSink, ConsoleSink, StatusSink, StatusUpdate};
pub use types::{ScanStatus, TaskId, Vulnerability};
