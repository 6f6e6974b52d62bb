//! `dirsync_log` v1:
//! Console log setup for the `dsync` binary.
//!
//! Library crates only emit `tracing` events; this crate owns the one
//! subscriber that turns them into progress lines on stdout.

use tracing::Level;

/// Console verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumLogVerbosity {
    /// Warnings and errors only.
    Quiet,
    /// Progress lines (`adding file: ...`) plus warnings.
    #[default]
    Normal,
    /// Everything, including per-level classification detail.
    Verbose,
}

impl EnumLogVerbosity {
    /// Resolve `-q` / `-v` flags. Quiet wins when both are set.
    pub fn from_flags(if_verbose: bool, if_quiet: bool) -> Self {
        match (if_verbose, if_quiet) {
            (_, true) => Self::Quiet,
            (true, false) => Self::Verbose,
            (false, false) => Self::Normal,
        }
    }

    /// Most detailed level still printed.
    pub fn max_level(self) -> Level {
        match self {
            Self::Quiet => Level::WARN,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Error returned when the global subscriber cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    /// A global subscriber was already set, or installation failed.
    #[error("failed to install log subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Install the process-wide stdout subscriber.
///
/// Normal and quiet output prints bare messages, so progress lines read as
/// `adding file: <path>`. Verbose output adds level and target.
pub fn init_logging(verbosity: EnumLogVerbosity) -> Result<(), LogInitError> {
    let if_verbose = verbosity == EnumLogVerbosity::Verbose;
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_max_level(verbosity.max_level())
        .without_time()
        .with_ansi(false)
        .with_level(if_verbose)
        .with_target(if_verbose)
        .try_init()
        .map_err(LogInitError::Install)?;

    tracing::debug!("log verbosity: {verbosity:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::{EnumLogVerbosity, LogInitError, init_logging};

    #[test]
    fn verbosity_from_flags() {
        assert_eq!(
            EnumLogVerbosity::from_flags(false, false),
            EnumLogVerbosity::Normal
        );
        assert_eq!(
            EnumLogVerbosity::from_flags(true, false),
            EnumLogVerbosity::Verbose
        );
        assert_eq!(
            EnumLogVerbosity::from_flags(true, true),
            EnumLogVerbosity::Quiet
        );
        assert_eq!(EnumLogVerbosity::default(), EnumLogVerbosity::Normal);
    }

    #[test]
    fn verbosity_maps_to_max_level() {
        assert_eq!(EnumLogVerbosity::Quiet.max_level(), Level::WARN);
        assert_eq!(EnumLogVerbosity::Normal.max_level(), Level::INFO);
        assert_eq!(EnumLogVerbosity::Verbose.max_level(), Level::DEBUG);
    }

    #[test]
    fn second_init_is_rejected() {
        // Only this test installs a subscriber in this process.
        let _ = init_logging(EnumLogVerbosity::Normal);
        tracing::info!("adding file: /tmp/x");

        let err = init_logging(EnumLogVerbosity::Verbose).expect_err("already installed");
        assert!(matches!(err, LogInitError::Install(_)));
        assert!(err.to_string().starts_with("failed to install log subscriber"));
    }
}
