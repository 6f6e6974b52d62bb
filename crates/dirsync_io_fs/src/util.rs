use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::spec::{DEFAULT_IGNORE_NAMES, EnumSyncPatternMode, SyncTreeError};

/// Suffix appended to the destination basename to name the quarantine root.
pub const C_QUARANTINE_SUFFIX: &str = ".deleted";

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeSyncPatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SpecIgnorePatterns {
    pub(crate) patterns_ignore: Option<TypeSyncPatternSeq>,
    pub(crate) if_ignore_vcs: bool,
}

impl SpecIgnorePatterns {
    pub(crate) fn from_raw(
        patterns_ignore: Option<&[String]>,
        rule_pattern: EnumSyncPatternMode,
    ) -> Result<Self, SyncTreeError> {
        Ok(Self {
            patterns_ignore: _compile(patterns_ignore, rule_pattern)?,
            if_ignore_vcs: false,
        })
    }

    pub(crate) fn with_vcs_names(mut self, if_ignore_vcs: bool) -> Self {
        self.if_ignore_vcs = if_ignore_vcs;
        self
    }

    pub(crate) fn is_ignored(&self, name: &OsStr) -> bool {
        // Exact names, independent of the pattern mode.
        if self.if_ignore_vcs && DEFAULT_IGNORE_NAMES.iter().any(|v| name == OsStr::new(v)) {
            return true;
        }
        let Some(patterns) = self.patterns_ignore.as_ref() else {
            return false;
        };
        let value = name.to_string_lossy();
        match patterns {
            TypeSyncPatternSeq::Literal(v) => v.iter().any(|p| value.contains(p.as_str())),
            TypeSyncPatternSeq::Glob(v) => v.iter().any(|p| p.is_match(name)),
            TypeSyncPatternSeq::Regex(v) => v.iter().any(|p| p.is_match(&value)),
        }
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumSyncPatternMode,
) -> Result<Option<TypeSyncPatternSeq>, SyncTreeError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumSyncPatternMode::Literal => Ok(Some(TypeSyncPatternSeq::Literal(patterns.to_vec()))),
        EnumSyncPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| SyncTreeError::InvalidPattern(format!("{pattern} ({e})")))?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeSyncPatternSeq::Glob(l_glob)))
        }
        EnumSyncPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern)
                    .map_err(|e| SyncTreeError::InvalidPattern(format!("{pattern} ({e})")))?;
                l_regex.push(regex);
            }
            Ok(Some(TypeSyncPatternSeq::Regex(l_regex)))
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

/// Resolve `.`/`..` without touching the filesystem.
fn _clean_lexically(path: &Path) -> PathBuf {
    let mut path_out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                path_out.pop();
            }
            other => path_out.push(other.as_os_str()),
        }
    }
    path_out
}

/// Canonicalize the deepest existing ancestor and re-append the missing tail.
fn _normalize_path(path: &Path) -> PathBuf {
    let path_abs = _clean_lexically(&_absolutize_path(path));
    let mut path_cursor = path_abs.as_path();
    let mut l_tail: Vec<&OsStr> = Vec::new();
    loop {
        if let Ok(resolved) = fs::canonicalize(path_cursor) {
            let mut path_out = resolved;
            for part in l_tail.iter().rev() {
                path_out.push(part);
            }
            return path_out;
        }
        match (path_cursor.parent(), path_cursor.file_name()) {
            (Some(parent), Some(name)) => {
                l_tail.push(name);
                path_cursor = parent;
            }
            _ => return path_abs,
        }
    }
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

pub(crate) fn is_nested_in(path: &Path, root: &Path) -> bool {
    _normalize_path(path).starts_with(_normalize_path(root))
}

/// Quarantine root for `dir_destination`: its sibling named `<basename>.deleted`.
///
/// Trailing separators are ignored. Paths ending in `.` or `..` are made
/// absolute first so the basename is a real directory name.
pub fn derive_quarantine_path(dir_destination: &Path) -> Result<PathBuf, SyncTreeError> {
    let path_dst = match dir_destination.components().next_back() {
        Some(Component::Normal(_)) => dir_destination.to_path_buf(),
        _ => _clean_lexically(&_absolutize_path(dir_destination)),
    };
    let Some(name_dst) = path_dst.file_name() else {
        return Err(SyncTreeError::InvalidDestination(
            dir_destination.to_path_buf(),
        ));
    };

    let mut name_quarantine = OsString::from(name_dst);
    name_quarantine.push(C_QUARANTINE_SUFFIX);
    Ok(path_dst
        .parent()
        .map(|parent| parent.join(&name_quarantine))
        .unwrap_or_else(|| PathBuf::from(&name_quarantine)))
}

/// Fatal precondition checks, run before any filesystem mutation.
pub(crate) fn validate_sync_roots(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    path_dir_quarantine: &Path,
) -> Result<(), SyncTreeError> {
    if is_overlap(path_dir_src, path_dir_dst) {
        return Err(SyncTreeError::SourceDestinationOverlap {
            path_src: path_dir_src.to_path_buf(),
            path_dst: path_dir_dst.to_path_buf(),
        });
    }
    if !path_dir_src.exists() {
        return Err(SyncTreeError::SourceNotFound(path_dir_src.to_path_buf()));
    }
    if !path_dir_src.is_dir() {
        return Err(SyncTreeError::SourceNotDirectory(path_dir_src.to_path_buf()));
    }
    if path_dir_dst.exists() && !path_dir_dst.is_dir() {
        return Err(SyncTreeError::DestinationNotDirectory(
            path_dir_dst.to_path_buf(),
        ));
    }
    if fs::symlink_metadata(path_dir_quarantine).is_ok() {
        return Err(SyncTreeError::QuarantineExists(
            path_dir_quarantine.to_path_buf(),
        ));
    }
    for path_root in [path_dir_src, path_dir_dst] {
        if is_nested_in(path_dir_quarantine, path_root) {
            return Err(SyncTreeError::QuarantineOverlap {
                quarantine: path_dir_quarantine.to_path_buf(),
                root: path_root.to_path_buf(),
            });
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CopyAndMove

pub(crate) fn is_permission_denied(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::PermissionDenied
}

pub(crate) fn create_symbolic_link(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    let target = fs::read_link(path_src)?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, path_dst)
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};
        if path_src.is_dir() {
            symlink_dir(&target, path_dst)
        } else {
            symlink_file(&target, path_dst)
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, path_dst);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Symbolic links are unsupported on this platform",
        ))
    }
}

/// Copy bytes, permission bits, access/modification times and (Linux) xattrs.
pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<(), io::Error> {
    fs::copy(path_file_src, path_file_dst)?;
    apply_metadata(path_file_src, path_file_dst)?;
    #[cfg(target_os = "linux")]
    {
        copy_xattrs_linux(path_file_src, path_file_dst);
    }
    Ok(())
}

/// Apply permission bits and timestamps of `path_src` to `path_dst`.
///
/// Directories get this after their children are written.
pub(crate) fn apply_metadata(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    let stat_src = fs::metadata(path_src)?;
    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(path_dst, file_time_access, file_time_modify)?;
    fs::set_permissions(path_dst, stat_src.permissions())?;
    Ok(())
}

/// Best effort: attributes the destination filesystem refuses are logged and dropped.
#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let l_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("no xattrs read from {}: {e}", path_file_src.display());
            return;
        }
    };

    for name in l_names {
        let res_copy = xattr::get(path_file_src, &name).and_then(|opt_value| match opt_value {
            Some(raw_value) => xattr::set(path_file_dst, &name, &raw_value),
            None => Ok(()),
        });
        if let Err(e) = res_copy {
            tracing::debug!(
                "xattr {} not copied to {}: {e}",
                name.to_string_lossy(),
                path_file_dst.display()
            );
        }
    }
}

/// Exact copy used when a rename crosses filesystems: links stay links.
fn copy_entry_verbatim(path_from: &Path, path_to: &Path) -> Result<(), io::Error> {
    let meta_from = fs::symlink_metadata(path_from)?;
    let file_type = meta_from.file_type();
    if file_type.is_symlink() {
        return create_symbolic_link(path_from, path_to);
    }
    if file_type.is_dir() {
        fs::create_dir(path_to)?;
        let mut l_names = fs::read_dir(path_from)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<Vec<_>, _>>()?;
        l_names.sort();
        for name in l_names {
            copy_entry_verbatim(&path_from.join(&name), &path_to.join(&name))?;
        }
        return apply_metadata(path_from, path_to);
    }
    copy_file_with_metadata(path_from, path_to)
}

fn remove_entry(path: &Path) -> Result<(), io::Error> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Relocate `path_from` (file or whole subtree) to `path_to`.
///
/// `rename` first; across filesystems, copy then remove. A failed copy is
/// rolled back from the target and leaves `path_from` untouched. A failed
/// removal after a full copy is reported; the target then holds everything.
pub(crate) fn move_entry(path_from: &Path, path_to: &Path) -> Result<(), SyncTreeError> {
    let err_incomplete = |source: io::Error| SyncTreeError::QuarantineIncomplete {
        path: path_from.to_path_buf(),
        quarantine: path_to.to_path_buf(),
        source,
    };

    if fs::symlink_metadata(path_to).is_ok() {
        return Err(err_incomplete(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "quarantine target already exists",
        )));
    }

    match fs::rename(path_from, path_to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                "rename crosses devices, copying instead: {}",
                path_from.display()
            );
            if let Err(e_copy) = copy_entry_verbatim(path_from, path_to) {
                let _ = remove_entry(path_to);
                return Err(err_incomplete(e_copy));
            }
            remove_entry(path_from).map_err(err_incomplete)
        }
        Err(e) => Err(err_incomplete(e)),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use rstest::rstest;
    use tempfile::TempDir;

    use super::{
        SpecIgnorePatterns, derive_quarantine_path, is_overlap, move_entry, validate_sync_roots,
    };
    use crate::spec::{DEFAULT_IGNORE_NAMES, EnumSyncPatternMode, SyncTreeError};

    #[rstest]
    #[case("/data/dst", "/data/dst.deleted")]
    #[case("/data/dst/", "/data/dst.deleted")]
    #[case("dst", "dst.deleted")]
    #[case("backups/photos//", "backups/photos.deleted")]
    fn quarantine_path_is_sibling_with_suffix(#[case] dst: &str, #[case] expected: &str) {
        let path_quarantine = derive_quarantine_path(Path::new(dst)).expect("derive");
        assert_eq!(path_quarantine, PathBuf::from(expected));
    }

    #[test]
    fn quarantine_path_for_dot_uses_current_dir_name() {
        let cwd = std::env::current_dir().expect("cwd");
        let Some(name) = cwd.file_name() else {
            return;
        };
        let path_quarantine = derive_quarantine_path(Path::new(".")).expect("derive");
        assert_eq!(
            path_quarantine.file_name().map(|n| n.to_os_string()),
            Some(format!("{}.deleted", name.to_string_lossy()).into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn quarantine_path_for_root_is_rejected() {
        let err = derive_quarantine_path(Path::new("/")).expect_err("root has no basename");
        assert!(matches!(err, SyncTreeError::InvalidDestination(_)));
    }

    #[test]
    fn overlap_is_component_wise() {
        let tmp = TempDir::new().expect("tmp");
        let src = tmp.path().join("data");
        std::fs::create_dir_all(&src).expect("mkdir");

        assert!(is_overlap(&src, &src.join("sub")));
        assert!(is_overlap(&src.join("sub"), &src));
        assert!(is_overlap(&src, &src));
        assert!(!is_overlap(&src, &tmp.path().join("data_backup")));
        assert!(is_overlap(&src, &tmp.path().join("x/../data/deeper")));
    }

    #[test]
    fn roots_rejected_in_documented_order() {
        let tmp = TempDir::new().expect("tmp");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        let qua = tmp.path().join("dst.deleted");

        let err = validate_sync_roots(&src, &dst, &qua).expect_err("missing source");
        assert!(matches!(err, SyncTreeError::SourceNotFound(_)));

        std::fs::write(&src, "not a dir").expect("write");
        let err = validate_sync_roots(&src, &dst, &qua).expect_err("file source");
        assert!(matches!(err, SyncTreeError::SourceNotDirectory(_)));

        std::fs::remove_file(&src).expect("rm");
        std::fs::create_dir(&src).expect("mkdir");
        std::fs::write(&dst, "not a dir").expect("write");
        let err = validate_sync_roots(&src, &dst, &qua).expect_err("file destination");
        assert!(matches!(err, SyncTreeError::DestinationNotDirectory(_)));

        std::fs::remove_file(&dst).expect("rm");
        std::fs::create_dir(&qua).expect("mkdir");
        let err = validate_sync_roots(&src, &dst, &qua).expect_err("leftover quarantine");
        assert!(matches!(err, SyncTreeError::QuarantineExists(_)));

        std::fs::remove_dir(&qua).expect("rm");
        validate_sync_roots(&src, &dst, &qua).expect("valid roots");

        let err = validate_sync_roots(&src, &dst, &dst.join("inner.deleted"))
            .expect_err("quarantine inside destination");
        assert!(matches!(err, SyncTreeError::QuarantineOverlap { .. }));
    }

    #[test]
    fn ignore_patterns_by_mode() {
        let l_defaults: Vec<String> = DEFAULT_IGNORE_NAMES.iter().map(|s| s.to_string()).collect();
        let pats = SpecIgnorePatterns::from_raw(Some(&l_defaults), EnumSyncPatternMode::Glob)
            .expect("compile");
        assert!(pats.is_ignored(".git".as_ref()));
        assert!(pats.is_ignored("__pycache__".as_ref()));
        assert!(!pats.is_ignored("src".as_ref()));

        let pats = SpecIgnorePatterns::from_raw(
            Some(&[r"^~\$.*\.tmp$".to_string()]),
            EnumSyncPatternMode::Regex,
        )
        .expect("compile");
        assert!(pats.is_ignored("~$report.tmp".as_ref()));
        assert!(!pats.is_ignored("report.tmp".as_ref()));

        let pats =
            SpecIgnorePatterns::from_raw(Some(&["cache".to_string()]), EnumSyncPatternMode::Literal)
                .expect("compile");
        assert!(pats.is_ignored("thumbcache.db".as_ref()));

        let pats = SpecIgnorePatterns::from_raw(None, EnumSyncPatternMode::Glob).expect("compile");
        assert!(!pats.is_ignored(".git".as_ref()));

        let pats =
            SpecIgnorePatterns::from_raw(Some(&["x".to_string()]), EnumSyncPatternMode::Literal)
                .expect("compile")
                .with_vcs_names(true);
        assert!(pats.is_ignored("tags".as_ref()));
        assert!(!pats.is_ignored("hashtags.txt".as_ref()));
        assert!(pats.is_ignored("x.txt".as_ref()));
    }

    #[test]
    fn invalid_glob_rejected() {
        let err = SpecIgnorePatterns::from_raw(Some(&["[".to_string()]), EnumSyncPatternMode::Glob)
            .expect_err("invalid glob");
        assert!(matches!(err, SyncTreeError::InvalidPattern(_)));
    }

    #[test]
    fn move_entry_relocates_subtree_and_refuses_existing_target() {
        let tmp = TempDir::new().expect("tmp");
        let path_from = tmp.path().join("dst/old");
        std::fs::create_dir_all(path_from.join("nested")).expect("mkdir");
        std::fs::write(path_from.join("nested/f.txt"), "keep me").expect("write");
        let path_to = tmp.path().join("dst.deleted/old");
        std::fs::create_dir_all(tmp.path().join("dst.deleted")).expect("mkdir");

        move_entry(&path_from, &path_to).expect("move");
        assert!(!path_from.exists());
        assert_eq!(
            std::fs::read_to_string(path_to.join("nested/f.txt")).expect("read"),
            "keep me"
        );

        std::fs::create_dir_all(&path_from).expect("mkdir");
        let err = move_entry(&path_from, &path_to).expect_err("target exists");
        assert!(matches!(err, SyncTreeError::QuarantineIncomplete { .. }));
        assert!(path_from.exists());
    }
}
