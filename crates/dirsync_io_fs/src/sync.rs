//! Tree reconciliation: diff driver plus the add / delete / update leaf operations.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::compare::{
    EnumEntryKind, EnumUnresolvedCause, SpecDiffLevel, TypeDirListing, classify_level,
    inspect_entry, list_dir,
};
use crate::report::{ReportSync, ReportSyncBuilder};
use crate::spec::{EnumSyncActionKind, EnumSyncSymlinkStrategy, SpecSyncOptions, SyncTreeError};
use crate::util::{
    SpecIgnorePatterns, apply_metadata, copy_file_with_metadata, create_symbolic_link,
    is_permission_denied, move_entry, validate_sync_roots,
};

#[derive(Debug)]
struct SpecSyncContext {
    spec_sync_options: SpecSyncOptions,
    spec_ignore_pats: SpecIgnorePatterns,
    builder_sync_report: ReportSyncBuilder,
    /// `(dev, ino)` of the directories on the current descent path.
    set_active_dirs: HashSet<(u64, u64)>,
}

/// Outcome of pushing a source directory onto the descent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumDirVisit {
    /// Identity not tracked (links not followed, or no inode numbers).
    Untracked,
    /// Pushed; popped again by `leave_dir`.
    Entered((u64, u64)),
    /// Already an ancestor of itself through a link.
    Loop,
}

impl SpecSyncContext {
    fn rule_symlink(&self) -> EnumSyncSymlinkStrategy {
        self.spec_sync_options.rule_symlink
    }

    fn if_dry_run(&self) -> bool {
        self.spec_sync_options.if_dry_run
    }

    fn skip_no_permission(&mut self, path: &Path) {
        tracing::warn!("no permission to sync: {}", path.display());
        self.builder_sync_report.add_error(
            path.to_path_buf(),
            format!("no permission to sync: {}", path.display()),
        );
        self.builder_sync_report.add_skipped();
    }

    fn skip_unknown_type(&mut self, path: &Path) {
        tracing::warn!("warning: file type unknown: {}", path.display());
        self.builder_sync_report
            .add_warning(format!("file type unknown: {}", path.display()));
        self.builder_sync_report.add_skipped();
    }

    /// Push a dereferenced directory onto the descent path.
    ///
    /// A directory reached twice through sibling routes is not a loop; only
    /// one that is its own ancestor is.
    fn enter_dir(&mut self, path_dir: &Path) -> EnumDirVisit {
        if self.rule_symlink() != EnumSyncSymlinkStrategy::Dereference {
            return EnumDirVisit::Untracked;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            if let Ok(stat_dir) = fs::metadata(path_dir) {
                let key_dir = (stat_dir.dev(), stat_dir.ino());
                if self.set_active_dirs.insert(key_dir) {
                    return EnumDirVisit::Entered(key_dir);
                }
                tracing::warn!("warning: symlink loop detected: {}", path_dir.display());
                self.builder_sync_report
                    .add_warning(format!("Symlink loop detected: {}", path_dir.display()));
                self.builder_sync_report.add_skipped();
                return EnumDirVisit::Loop;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = path_dir;
        }
        EnumDirVisit::Untracked
    }

    fn leave_dir(&mut self, visit: EnumDirVisit) {
        if let EnumDirVisit::Entered(key_dir) = visit {
            self.set_active_dirs.remove(&key_dir);
        }
    }
}

/// Mirror `dir_source` onto `dir_destination`, relocating replaced and
/// destination-only entries under `dir_quarantine`.
///
/// This function performs:
/// 1. Precondition checks (overlap, source/destination kinds, leftover
///    quarantine, ignore patterns). Any failure returns before mutating.
/// 2. Creation of the destination root (skipped in dry-run).
/// 3. A depth-first walk: per level, source-only entries are added, then
///    destination-only entries are quarantined, then differing entries are
///    replaced, then common subdirectories are recursed into. Names are
///    handled in lexicographic order inside each group.
///
/// Permission failures on single entries are recorded in the report and the
/// walk continues. Other I/O failures abort with [`SyncTreeError`]; entries
/// reconciled before the failure stay reconciled.
///
/// The quarantine root is only created when something is moved into it.
pub fn sync_tree<P, Q, R>(
    dir_source: P,
    dir_destination: Q,
    dir_quarantine: R,
    spec_sync_options: SpecSyncOptions,
) -> Result<ReportSync, SyncTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let path_dir_src = dir_source.as_ref();
    let path_dir_dst = dir_destination.as_ref();
    let path_dir_qua = dir_quarantine.as_ref();

    validate_sync_roots(path_dir_src, path_dir_dst, path_dir_qua)?;
    let spec_ignore_pats = SpecIgnorePatterns::from_raw(
        spec_sync_options.patterns_ignore.as_deref(),
        spec_sync_options.rule_pattern,
    )?
    .with_vcs_names(spec_sync_options.if_ignore_vcs);

    if !spec_sync_options.if_dry_run {
        fs::create_dir_all(path_dir_dst).map_err(|e| SyncTreeError::DestinationInitFailed {
            path: path_dir_dst.to_path_buf(),
            source: e,
        })?;
    }

    let if_dry_run = spec_sync_options.if_dry_run;
    let mut spec_sync_ctx = SpecSyncContext {
        spec_sync_options,
        spec_ignore_pats,
        builder_sync_report: ReportSyncBuilder::default(),
        set_active_dirs: HashSet::new(),
    };

    tracing::debug!(
        "sync {} -> {} (quarantine {}, dry_run={if_dry_run})",
        path_dir_src.display(),
        path_dir_dst.display(),
        path_dir_qua.display()
    );
    sync_dir(path_dir_src, path_dir_dst, path_dir_qua, &mut spec_sync_ctx)?;

    let report = spec_sync_ctx.builder_sync_report.build(if_dry_run);
    tracing::debug!("{report}");
    Ok(report)
}

/// List one side of a level; `None` when permission was denied.
fn list_level(
    path_dir: &Path,
    if_missing_ok: bool,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<Option<TypeDirListing>, SyncTreeError> {
    match list_dir(path_dir, if_missing_ok) {
        Ok(v) => Ok(Some(v)),
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_dir);
            Ok(None)
        }
        Err(e) => Err(SyncTreeError::io("read directory", path_dir, e)),
    }
}

fn sync_dir(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    path_dir_qua: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<(), SyncTreeError> {
    let visit = spec_sync_ctx.enter_dir(path_dir_src);
    if visit == EnumDirVisit::Loop {
        return Ok(());
    }
    let res = sync_dir_entries(path_dir_src, path_dir_dst, path_dir_qua, spec_sync_ctx);
    spec_sync_ctx.leave_dir(visit);
    res
}

fn sync_dir_entries(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    path_dir_qua: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<(), SyncTreeError> {
    let Some(map_src) = list_level(path_dir_src, false, spec_sync_ctx)? else {
        return Ok(());
    };
    let if_missing_ok = spec_sync_ctx.if_dry_run();
    let Some(map_dst) = list_level(path_dir_dst, if_missing_ok, spec_sync_ctx)? else {
        return Ok(());
    };

    let spec_diff = classify_level(
        path_dir_src,
        &map_src,
        path_dir_dst,
        &map_dst,
        &spec_sync_ctx.spec_ignore_pats,
        spec_sync_ctx.rule_symlink(),
    );
    record_passive_entries(&spec_diff, spec_sync_ctx);

    for name in &spec_diff.l_src_only {
        add_path(&path_dir_src.join(name), &path_dir_dst.join(name), spec_sync_ctx)?;
    }
    for name in &spec_diff.l_dst_only {
        delete_path(&path_dir_dst.join(name), &path_dir_qua.join(name), spec_sync_ctx)?;
    }
    for name in &spec_diff.l_diff {
        update_path(
            &path_dir_src.join(name),
            &path_dir_dst.join(name),
            &path_dir_qua.join(name),
            spec_sync_ctx,
        )?;
    }
    for name in &spec_diff.l_common_dirs {
        sync_dir(
            &path_dir_src.join(name),
            &path_dir_dst.join(name),
            &path_dir_qua.join(name),
            spec_sync_ctx,
        )?;
    }
    Ok(())
}

/// Count the buckets that need no mutation and report unresolved entries.
fn record_passive_entries(spec_diff: &SpecDiffLevel, spec_sync_ctx: &mut SpecSyncContext) {
    let n_scanned = spec_diff.l_src_only.len()
        + spec_diff.l_dst_only.len()
        + spec_diff.l_diff.len()
        + spec_diff.l_common_dirs.len()
        + spec_diff.l_same.len()
        + spec_diff.l_skipped_links.len()
        + spec_diff.l_unresolved.len();
    let builder = &mut spec_sync_ctx.builder_sync_report;
    builder.add_counts(&["cnt_scanned"], n_scanned as u64);
    builder.add_counts(&["cnt_unchanged"], spec_diff.l_same.len() as u64);
    builder.add_counts(&["cnt_ignored"], spec_diff.l_ignored.len() as u64);
    builder.add_counts(&["cnt_skipped"], spec_diff.l_skipped_links.len() as u64);

    for spec_unresolved in &spec_diff.l_unresolved {
        match spec_unresolved.cause {
            EnumUnresolvedCause::NoPermission => {
                spec_sync_ctx.skip_no_permission(&spec_unresolved.path)
            }
            EnumUnresolvedCause::UnknownType => {
                spec_sync_ctx.skip_unknown_type(&spec_unresolved.path)
            }
            EnumUnresolvedCause::Io => {
                tracing::warn!(
                    "warning: cannot compare {}: {}",
                    spec_unresolved.path.display(),
                    spec_unresolved.message
                );
                spec_sync_ctx.builder_sync_report.add_warning(format!(
                    "Cannot compare {}: {}",
                    spec_unresolved.path.display(),
                    spec_unresolved.message
                ));
                spec_sync_ctx.builder_sync_report.add_skipped();
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region LeafOperations

/// Materialize: create at `path_dst` what exists only at `path_src`.
fn add_path(
    path_src: &Path,
    path_dst: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<(), SyncTreeError> {
    let stat_src = match inspect_entry(path_src, spec_sync_ctx.rule_symlink()) {
        Ok(v) => v,
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_src);
            return Ok(());
        }
        Err(e) => return Err(SyncTreeError::io("inspect", path_src, e)),
    };

    let kind_action = match stat_src.kind {
        EnumEntryKind::File | EnumEntryKind::Symlink => EnumSyncActionKind::AddFile,
        EnumEntryKind::Dir => EnumSyncActionKind::AddDir,
        EnumEntryKind::Other => {
            spec_sync_ctx.skip_unknown_type(path_src);
            return Ok(());
        }
    };

    tracing::info!("{}: {}", kind_action.label(), path_dst.display());
    if spec_sync_ctx.if_dry_run() {
        spec_sync_ctx
            .builder_sync_report
            .add_action(kind_action, path_dst.to_path_buf());
        return Ok(());
    }
    if materialize(path_src, path_dst, stat_src.kind, spec_sync_ctx)? {
        spec_sync_ctx
            .builder_sync_report
            .add_action(kind_action, path_dst.to_path_buf());
    }
    Ok(())
}

/// Quarantine-move: relocate a destination-only entry under quarantine.
fn delete_path(
    path_dst: &Path,
    path_qua: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<(), SyncTreeError> {
    tracing::info!("{}: {}", EnumSyncActionKind::Delete.label(), path_dst.display());
    if !spec_sync_ctx.if_dry_run() {
        move_to_quarantine(path_dst, path_qua)?;
    }
    spec_sync_ctx
        .builder_sync_report
        .add_action(EnumSyncActionKind::Delete, path_dst.to_path_buf());
    Ok(())
}

/// Replace: quarantine the current destination entry, then copy the source in.
fn update_path(
    path_src: &Path,
    path_dst: &Path,
    path_qua: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<(), SyncTreeError> {
    let stat_src = match inspect_entry(path_src, spec_sync_ctx.rule_symlink()) {
        Ok(v) => v,
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_src);
            return Ok(());
        }
        Err(e) => return Err(SyncTreeError::io("inspect", path_src, e)),
    };
    match stat_src.kind {
        EnumEntryKind::Other => {
            spec_sync_ctx.skip_unknown_type(path_src);
            return Ok(());
        }
        // Unreadable source must not cost the destination its current version.
        EnumEntryKind::File => {
            if let Err(e) = fs::File::open(path_src) {
                if is_permission_denied(&e) {
                    spec_sync_ctx.skip_no_permission(path_src);
                    return Ok(());
                }
                return Err(SyncTreeError::io("open", path_src, e));
            }
        }
        EnumEntryKind::Dir => {
            if let Err(e) = fs::read_dir(path_src) {
                if is_permission_denied(&e) {
                    spec_sync_ctx.skip_no_permission(path_src);
                    return Ok(());
                }
                return Err(SyncTreeError::io("read directory", path_src, e));
            }
        }
        EnumEntryKind::Symlink => {}
    }

    tracing::info!("{}: {}", EnumSyncActionKind::Update.label(), path_dst.display());
    if spec_sync_ctx.if_dry_run() {
        spec_sync_ctx
            .builder_sync_report
            .add_action(EnumSyncActionKind::Update, path_dst.to_path_buf());
        return Ok(());
    }

    move_to_quarantine(path_dst, path_qua)?;
    // Old version is quarantined either way; only a completed copy is an update.
    let kind_action = if materialize(path_src, path_dst, stat_src.kind, spec_sync_ctx)? {
        EnumSyncActionKind::Update
    } else {
        EnumSyncActionKind::Delete
    };
    spec_sync_ctx
        .builder_sync_report
        .add_action(kind_action, path_dst.to_path_buf());
    Ok(())
}

fn move_to_quarantine(path_dst: &Path, path_qua: &Path) -> Result<(), SyncTreeError> {
    if let Some(path_parent_qua) = path_qua.parent() {
        fs::create_dir_all(path_parent_qua).map_err(|e| {
            SyncTreeError::io("create quarantine directory", path_parent_qua, e)
        })?;
    }
    move_entry(path_dst, path_qua)
}

/// Copy `path_src` of kind `kind` to `path_dst`.
///
/// Returns `false` when the entry itself was skipped for lack of permission.
/// Nested permission failures inside a directory are skipped individually.
fn materialize(
    path_src: &Path,
    path_dst: &Path,
    kind: EnumEntryKind,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<bool, SyncTreeError> {
    let res_copy = match kind {
        EnumEntryKind::File => copy_file_with_metadata(path_src, path_dst),
        EnumEntryKind::Symlink => create_symbolic_link(path_src, path_dst),
        EnumEntryKind::Dir => return copy_dir_recursive(path_src, path_dst, spec_sync_ctx),
        EnumEntryKind::Other => {
            spec_sync_ctx.skip_unknown_type(path_src);
            return Ok(false);
        }
    };
    match res_copy {
        Ok(()) => Ok(true),
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_src);
            Ok(false)
        }
        Err(e) => Err(SyncTreeError::io("copy", path_src, e)),
    }
}

fn copy_dir_recursive(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<bool, SyncTreeError> {
    let visit = spec_sync_ctx.enter_dir(path_dir_src);
    if visit == EnumDirVisit::Loop {
        return Ok(false);
    }
    let res = copy_dir_entries(path_dir_src, path_dir_dst, spec_sync_ctx);
    spec_sync_ctx.leave_dir(visit);
    res
}

fn copy_dir_entries(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    spec_sync_ctx: &mut SpecSyncContext,
) -> Result<bool, SyncTreeError> {
    let map_src = match list_dir(path_dir_src, false) {
        Ok(v) => v,
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_dir_src);
            return Ok(false);
        }
        Err(e) => return Err(SyncTreeError::io("read directory", path_dir_src, e)),
    };
    match fs::create_dir(path_dir_dst) {
        Ok(()) => {}
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_dir_dst);
            return Ok(false);
        }
        Err(e) => return Err(SyncTreeError::io("create directory", path_dir_dst, e)),
    }

    let rule_symlink = spec_sync_ctx.rule_symlink();
    for (name, b_is_symlink) in &map_src {
        if spec_sync_ctx.spec_ignore_pats.is_ignored(name) {
            spec_sync_ctx.builder_sync_report.add_counts(&["cnt_ignored"], 1);
            continue;
        }
        if *b_is_symlink && rule_symlink == EnumSyncSymlinkStrategy::SkipSymlinks {
            spec_sync_ctx.builder_sync_report.add_skipped();
            continue;
        }

        let path_src = path_dir_src.join(name);
        let path_dst = path_dir_dst.join(name);
        let kind = match inspect_entry(&path_src, rule_symlink) {
            Ok(v) => v.kind,
            Err(e) if is_permission_denied(&e) => {
                spec_sync_ctx.skip_no_permission(&path_src);
                continue;
            }
            Err(e) => return Err(SyncTreeError::io("inspect", &path_src, e)),
        };
        materialize(&path_src, &path_dst, kind, spec_sync_ctx)?;
    }

    match apply_metadata(path_dir_src, path_dir_dst) {
        Ok(()) => Ok(true),
        Err(e) if is_permission_denied(&e) => {
            spec_sync_ctx.skip_no_permission(path_dir_dst);
            Ok(true)
        }
        Err(e) => Err(SyncTreeError::io("copy metadata", path_dir_dst, e)),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
