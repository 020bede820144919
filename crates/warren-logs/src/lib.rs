#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Log storage and viewing for the Warren control plane.
//!
//! Two capped streams back the cluster log: a coarse operator-facing `logs`
//! stream and a high-volume `log_entries` stream. This crate writes them,
//! renders them for display, follows them live, and dumps them to archive
//! files.

pub mod entry;
pub mod error;
pub mod store;
pub mod view;

pub use entry::{LogEntry, LogLevel};
pub use error::{LogError, LogResult};
pub use store::{LogStore, LOGS_STREAM, LOG_ENTRIES_STREAM};
pub use view::{LogTail, LogView};
