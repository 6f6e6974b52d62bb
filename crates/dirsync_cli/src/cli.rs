//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dirsync_io_fs::{EnumSyncPatternMode, EnumSyncSymlinkStrategy, SpecSyncOptions};
use dirsync_log::EnumLogVerbosity;

/// Mirror SRC_DIR onto DST_DIR without deleting anything.
///
/// Entries missing from the source, and old versions of changed files, are
/// moved into DST_DIR.deleted next to the destination.
#[derive(Parser, Debug)]
#[command(name = "dsync")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Source directory (read only)
    pub src_dir: PathBuf,

    /// Destination directory (created if missing)
    pub dst_dir: PathBuf,

    /// Report what would change without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,

    /// Leave VCS and cache directories (.git, CVS, __pycache__, ...) alone
    #[arg(long)]
    pub vcs_ignore: bool,

    /// Entry name pattern to leave alone on both sides (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub patterns_ignore: Vec<String>,

    /// How --ignore patterns are interpreted
    #[arg(long, value_enum, default_value_t = EnumCliPatternMode::Glob)]
    pub pattern_mode: EnumCliPatternMode,

    /// How symbolic links are handled
    #[arg(long, value_enum, default_value_t = EnumCliSymlinks::Follow)]
    pub symlinks: EnumCliSymlinks,

    /// Print per-level detail
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum EnumCliPatternMode {
    /// Shell wildcards
    #[default]
    Glob,
    /// Regular expressions, unanchored
    Regex,
    /// Plain substring
    Literal,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum EnumCliSymlinks {
    /// Sync what the link points to
    #[default]
    Follow,
    /// Recreate links as links
    Copy,
    /// Leave links alone on both sides
    Skip,
}

impl From<EnumCliPatternMode> for EnumSyncPatternMode {
    fn from(value: EnumCliPatternMode) -> Self {
        match value {
            EnumCliPatternMode::Glob => Self::Glob,
            EnumCliPatternMode::Regex => Self::Regex,
            EnumCliPatternMode::Literal => Self::Literal,
        }
    }
}

impl From<EnumCliSymlinks> for EnumSyncSymlinkStrategy {
    fn from(value: EnumCliSymlinks) -> Self {
        match value {
            EnumCliSymlinks::Follow => Self::Dereference,
            EnumCliSymlinks::Copy => Self::CopySymlinks,
            EnumCliSymlinks::Skip => Self::SkipSymlinks,
        }
    }
}

impl Cli {
    pub fn verbosity(&self) -> EnumLogVerbosity {
        EnumLogVerbosity::from_flags(self.verbose, self.quiet)
    }

    pub fn sync_options(&self) -> SpecSyncOptions {
        let patterns_ignore = if self.patterns_ignore.is_empty() {
            None
        } else {
            Some(self.patterns_ignore.clone())
        };
        SpecSyncOptions {
            patterns_ignore,
            rule_pattern: self.pattern_mode.into(),
            if_ignore_vcs: self.vcs_ignore,
            rule_symlink: self.symlinks.into(),
            if_dry_run: self.dry_run,
        }
    }
}
