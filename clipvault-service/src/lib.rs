//! ClipVault Service Library
//!
//! Clipboard history with fingerprint-based change detection, recency bumping
//! of duplicates, and SQLite persistence. Served to a presentation shell over a
//! Unix socket.

pub mod clip;
pub mod clipboard;
pub mod config;
pub mod fingerprint;
pub mod history;
pub mod poller;
pub mod protocol;
pub mod server;
pub mod settings;
pub mod shortcut;
pub mod storage;

pub use clip::{ClipContent, ClipItem, ClipKind};
pub use config::Config;
pub use history::{HistoryObserver, HistoryService, InsertOutcome};
pub use protocol::{Ack, Request, Response};
pub use server::{ClipVaultServer, ServerError};
pub use storage::Storage;
