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

//! Audit events and the cluster messenger for the Warren control plane.
//!
//! Layout: `event.rs` (typed audit events + capped-stream store),
//! `messenger.rs` (best-effort LISTEN/NOTIFY broadcast), `error.rs`.

pub mod error;
pub mod event;
pub mod messenger;

pub use error::{EventError, EventResult};
pub use event::{Event, EventKind, EventStore, EVENTS_STREAM};
pub use messenger::{MessageStream, Messenger, HOSTS_CHANNEL, HOSTS_UPDATED};
