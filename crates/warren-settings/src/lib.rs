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

//! Clustered configuration for the Warren control plane.
//!
//! Configuration is a fixed set of typed groups. Database-backed groups are
//! shared across the cluster and cached per node; the `conf` group is a
//! node-local JSON file holding what a node needs before it can connect.
//! Commits are atomic per group, audited, and broadcast to peers when they
//! affect host state.

pub mod bootstrap;
pub mod error;
pub mod group;
pub mod schema;
pub mod store;
pub mod value;

pub use bootstrap::Bootstrap;
pub use error::{SettingsError, SettingsResult};
pub use group::ConfigGroup;
pub use schema::{defaults, parse_address, GroupName, DEVICE_KEY_OVERRIDE_TTL_HOURS};
pub use store::{InvalidationWatcher, SettingsStore};
pub use value::{kind_of, kinds_conflict, parse_cli_value, render, ValueKind};
