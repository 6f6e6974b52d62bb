//! `dirsync_io_fs` v1:
//! Rust-side directory reconciliation engine.
//!
//! Mirrors a source tree onto a destination tree. Nothing is deleted: entries
//! that disappear from the destination, and old versions of replaced files,
//! are moved into a quarantine tree next to it.
//!
//! - `sync`    : traversal driver and add/delete/update operations
//! - `compare` : per-level diff classification
//! - `spec`    : enums/options/errors
//! - `report`  : run-time report model
//! - `util`    : path safety, copy and move helpers

mod compare;
pub mod report;
pub mod spec;
pub mod sync;
mod util;

pub use report::{ReportSync, ReportSyncBuilder};
pub use spec::{
    DEFAULT_IGNORE_NAMES, EnumSyncActionKind, EnumSyncPatternMode, EnumSyncSymlinkStrategy,
    SpecSyncAction, SpecSyncError, SpecSyncOptions, SyncTreeError,
};
pub use sync::sync_tree;
pub use util::{C_QUARANTINE_SUFFIX, derive_quarantine_path};
