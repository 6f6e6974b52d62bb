//! Error types for dsync

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that end a `dsync` invocation with exit status 1
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Precondition or I/O failure from the sync engine
    #[error(transparent)]
    Sync(#[from] dirsync_io_fs::SyncTreeError),

    /// Log subscriber could not be installed
    #[error(transparent)]
    Log(#[from] dirsync_log::LogInitError),
}
