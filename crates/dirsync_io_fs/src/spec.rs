//! Sync specification models and top-level error types.

use std::io;
use std::path::PathBuf;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Symlink handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncSymlinkStrategy {
    /// Follow the link and reconcile the target bytes/entries.
    Dereference,
    /// Compare link targets and recreate links at destination.
    CopySymlinks,
    /// Leave symlink entries on both sides out of the diff.
    SkipSymlinks,
}

/// Pattern matching mode for ignore lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

/// Kind of mutation applied (or planned, in dry-run) to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumSyncActionKind {
    /// Source-only regular file copied in.
    AddFile,
    /// Source-only directory copied in recursively.
    AddDir,
    /// Destination-only entry moved to quarantine.
    Delete,
    /// Differing entry: old destination moved to quarantine, source copied in.
    Update,
}

impl EnumSyncActionKind {
    /// Progress label printed before the affected path.
    pub fn label(self) -> &'static str {
        match self {
            Self::AddFile => "adding file",
            Self::AddDir => "adding dir",
            Self::Delete => "deleting",
            Self::Update => "updating",
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Names skipped by the classic directory comparator, usable as ignore list.
pub const DEFAULT_IGNORE_NAMES: &[&str] = &[
    "RCS",
    "CVS",
    "tags",
    ".git",
    ".hg",
    ".bzr",
    "_darcs",
    "__pycache__",
];

/// Input options for `sync_tree`.
#[derive(Debug, Clone)]
pub struct SpecSyncOptions {
    /// Patterns applied to entry basenames on both sides; matches are left alone.
    pub patterns_ignore: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumSyncPatternMode,
    /// Also leave alone entries named exactly like [`DEFAULT_IGNORE_NAMES`].
    pub if_ignore_vcs: bool,
    /// Symlink handling behavior.
    pub rule_symlink: EnumSyncSymlinkStrategy,
    /// Do not mutate filesystem; record what would happen.
    pub if_dry_run: bool,
}

impl Default for SpecSyncOptions {
    fn default() -> Self {
        Self {
            patterns_ignore: None,
            rule_pattern: EnumSyncPatternMode::Glob,
            if_ignore_vcs: false,
            rule_symlink: EnumSyncSymlinkStrategy::Dereference,
            if_dry_run: false,
        }
    }
}

/// One recoverable failure item with path + error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncError {
    /// Skipped source or destination path.
    pub path: PathBuf,
    /// User-facing error text.
    pub exception: String,
}

/// One applied (or planned) action, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncAction {
    /// What happened to the entry.
    pub kind: EnumSyncActionKind,
    /// Destination path the action targets.
    pub path: PathBuf,
}

/// Errors that abort a `sync_tree` run.
///
/// Precondition variants are returned before any filesystem mutation. `Io` and
/// `QuarantineIncomplete` can surface mid-run, after earlier entries were
/// already reconciled.
#[derive(Debug, thiserror::Error)]
pub enum SyncTreeError {
    /// Invalid ignore pattern.
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Source and destination overlap (either contains the other, or equal).
    #[error(
        "The destination should not be inside the source (or contain it): {} <-> {}",
        .path_src.display(),
        .path_dst.display()
    )]
    SourceDestinationOverlap {
        /// Normalized source directory.
        path_src: PathBuf,
        /// Normalized destination directory.
        path_dst: PathBuf,
    },

    /// Source path does not exist.
    #[error("The source directory does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Source path is not a directory.
    #[error("The source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    /// Destination exists but is not a directory.
    #[error("The destination is not a directory: {}", .0.display())]
    DestinationNotDirectory(PathBuf),

    /// Quarantine root left over from a previous run.
    #[error(
        "The directory '{}' containing last deleted files still exists. \
         Please delete it if it is no longer needed.",
        .0.display()
    )]
    QuarantineExists(PathBuf),

    /// Quarantine root lies inside one of the trees being reconciled.
    #[error(
        "The quarantine directory must not be inside {}: {}",
        .root.display(),
        .quarantine.display()
    )]
    QuarantineOverlap {
        /// Quarantine root as given.
        quarantine: PathBuf,
        /// Source or destination root containing it.
        root: PathBuf,
    },

    /// Quarantine path cannot be derived from the destination path.
    #[error("Cannot derive a quarantine path from destination: {}", .0.display())]
    InvalidDestination(PathBuf),

    /// Destination directory initialization failed.
    #[error("Failed to initialize destination {}: {source}", .path.display())]
    DestinationInitFailed {
        /// Destination path that failed initialization.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Unrecoverable I/O failure during reconciliation.
    #[error("Failed to {op} {}: {source}", .path.display())]
    Io {
        /// Operation being attempted.
        op: &'static str,
        /// Path the operation failed on.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A relocation into quarantine failed part way.
    #[error(
        "Failed to move {} into quarantine {}: {source}",
        .path.display(),
        .quarantine.display()
    )]
    QuarantineIncomplete {
        /// Destination object being relocated.
        path: PathBuf,
        /// Quarantine target path.
        quarantine: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl SyncTreeError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the error was raised before any filesystem mutation.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Self::DestinationInitFailed { .. } | Self::Io { .. } | Self::QuarantineIncomplete { .. }
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
