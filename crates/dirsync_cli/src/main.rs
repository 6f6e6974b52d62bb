//! dsync
//!
//! Command-line front end of the non-destructive directory mirror.

mod cli;
mod error;

use std::path::Path;

use clap::Parser;
use dirsync_io_fs::{ReportSync, derive_quarantine_path, sync_tree};
use dirsync_log::init_logging;

use cli::Cli;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity())?;

    let path_dir_qua = derive_quarantine_path(&cli.dst_dir)?;
    tracing::debug!(
        "src={} dst={} quarantine={}",
        cli.src_dir.display(),
        cli.dst_dir.display(),
        path_dir_qua.display()
    );

    let report = sync_tree(
        &cli.src_dir,
        &cli.dst_dir,
        &path_dir_qua,
        cli.sync_options(),
    )?;
    tracing::debug!("{report}");

    for line in closing_lines(&report, &path_dir_qua) {
        println!("{line}");
    }
    Ok(())
}

/// Lines printed once the walk finished.
fn closing_lines(report: &ReportSync, path_dir_qua: &Path) -> Vec<String> {
    let mut l_lines = vec!["Completed!".to_string()];
    if !report.if_quarantine_used {
        return l_lines;
    }
    if report.if_dry_run {
        l_lines.push(format!(
            "Dry run: deleted files and updated old files would be moved to '{}'.",
            path_dir_qua.display()
        ));
    } else {
        l_lines.push(format!(
            "You can find deleted files or updated old files in the directory '{}'. \
             Remember to delete it if it is no longer needed.",
            path_dir_qua.display()
        ));
    }
    l_lines
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use dirsync_io_fs::ReportSync;

    use super::closing_lines;

    #[test]
    fn closing_lines_without_quarantine() {
        let report = ReportSync::default();
        assert_eq!(
            closing_lines(&report, Path::new("/data/dst.deleted")),
            vec!["Completed!".to_string()]
        );
    }

    #[test]
    fn closing_lines_name_quarantine() {
        let report = ReportSync {
            if_quarantine_used: true,
            ..ReportSync::default()
        };
        let l_lines = closing_lines(&report, Path::new("/data/dst.deleted"));
        assert_eq!(l_lines.len(), 2);
        assert!(l_lines[1].contains("'/data/dst.deleted'"));
        assert!(l_lines[1].starts_with("You can find deleted files"));

        let report = ReportSync {
            if_quarantine_used: true,
            if_dry_run: true,
            ..ReportSync::default()
        };
        let l_lines = closing_lines(&report, Path::new("/data/dst.deleted"));
        assert!(l_lines[1].starts_with("Dry run:"));
    }
}
