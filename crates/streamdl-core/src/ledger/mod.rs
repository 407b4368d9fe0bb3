//! Persistent job ledger (SQLite via sqlx).
//!
//! One row per source identity, keyed by the MD5 of the source URL. Every
//! public operation is a single atomic unit; storage faults are logged and
//! turned into "not found / not completed" answers instead of errors, so a
//! ledger outage makes jobs look not-yet-done rather than stopping workers.

mod db;
mod jobs;
mod types;

pub use db::{source_key, Ledger};
pub use types::*;

#[cfg(test)]
pub(crate) use db::open_memory;
