//! Per-level diff classification between a source and a destination directory.
//!
//! Every name of the union of both listings lands in exactly one bucket of
//! [`SpecDiffLevel`]. Buckets keep lexicographic name order.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::spec::EnumSyncSymlinkStrategy;
use crate::util::{SpecIgnorePatterns, is_permission_denied};

const N_CMP_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnumEntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SpecEntryStat {
    pub(crate) kind: EnumEntryKind,
    pub(crate) size: u64,
    pub(crate) time_modify: FileTime,
}

/// Name of one directory entry plus whether it is itself a symlink.
pub(crate) type TypeDirListing = BTreeMap<OsString, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnumUnresolvedCause {
    NoPermission,
    UnknownType,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpecUnresolved {
    pub(crate) path: PathBuf,
    pub(crate) cause: EnumUnresolvedCause,
    pub(crate) message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SpecDiffLevel {
    pub(crate) l_src_only: Vec<OsString>,
    pub(crate) l_dst_only: Vec<OsString>,
    pub(crate) l_diff: Vec<OsString>,
    pub(crate) l_common_dirs: Vec<OsString>,
    pub(crate) l_same: Vec<OsString>,
    pub(crate) l_ignored: Vec<OsString>,
    pub(crate) l_skipped_links: Vec<OsString>,
    pub(crate) l_unresolved: Vec<SpecUnresolved>,
}

impl SpecDiffLevel {
    #[cfg(test)]
    fn n_classified(&self) -> usize {
        self.l_src_only.len()
            + self.l_dst_only.len()
            + self.l_diff.len()
            + self.l_common_dirs.len()
            + self.l_same.len()
            + self.l_ignored.len()
            + self.l_skipped_links.len()
            + self.l_unresolved.len()
    }
}

/// Stat `path` the way the symlink rule wants it seen.
///
/// Under `Dereference` a dangling link reports `Other`, never an error.
pub(crate) fn inspect_entry(
    path: &Path,
    rule_symlink: EnumSyncSymlinkStrategy,
) -> Result<SpecEntryStat, io::Error> {
    let meta = match rule_symlink {
        EnumSyncSymlinkStrategy::Dereference => match fs::metadata(path) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let meta_link = fs::symlink_metadata(path)?;
                return Ok(SpecEntryStat {
                    kind: EnumEntryKind::Other,
                    size: meta_link.len(),
                    time_modify: FileTime::from_last_modification_time(&meta_link),
                });
            }
            Err(e) => return Err(e),
        },
        EnumSyncSymlinkStrategy::CopySymlinks | EnumSyncSymlinkStrategy::SkipSymlinks => {
            fs::symlink_metadata(path)?
        }
    };

    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        EnumEntryKind::Symlink
    } else if file_type.is_dir() {
        EnumEntryKind::Dir
    } else if file_type.is_file() {
        EnumEntryKind::File
    } else {
        EnumEntryKind::Other
    };
    Ok(SpecEntryStat {
        kind,
        size: meta.len(),
        time_modify: FileTime::from_last_modification_time(&meta),
    })
}

/// List `path_dir`. A missing directory lists as empty when `if_missing_ok`.
pub(crate) fn list_dir(path_dir: &Path, if_missing_ok: bool) -> Result<TypeDirListing, io::Error> {
    let iter_entries = match fs::read_dir(path_dir) {
        Ok(v) => v,
        Err(e) if if_missing_ok && e.kind() == io::ErrorKind::NotFound => {
            return Ok(TypeDirListing::new());
        }
        Err(e) => return Err(e),
    };

    let mut map_entries = TypeDirListing::new();
    for _entry_res in iter_entries {
        let entry = _entry_res?;
        let b_is_symlink = entry.file_type()?.is_symlink();
        map_entries.insert(entry.file_name(), b_is_symlink);
    }
    Ok(map_entries)
}

/// Shallow signature check first, byte comparison only for equal sizes.
pub(crate) fn is_same_file_content(
    path_a: &Path,
    stat_a: &SpecEntryStat,
    path_b: &Path,
    stat_b: &SpecEntryStat,
) -> Result<bool, io::Error> {
    if stat_a.size == stat_b.size && stat_a.time_modify == stat_b.time_modify {
        return Ok(true);
    }
    if stat_a.size != stat_b.size {
        return Ok(false);
    }

    let mut file_a = File::open(path_a)?;
    let mut file_b = File::open(path_b)?;
    let mut buf_a = vec![0_u8; N_CMP_BUFFER_SIZE];
    let mut buf_b = vec![0_u8; N_CMP_BUFFER_SIZE];
    loop {
        let n_read_a = _read_full(&mut file_a, &mut buf_a)?;
        let n_read_b = _read_full(&mut file_b, &mut buf_b)?;
        if n_read_a != n_read_b || buf_a[..n_read_a] != buf_b[..n_read_b] {
            return Ok(false);
        }
        if n_read_a == 0 {
            return Ok(true);
        }
    }
}

fn _read_full(file: &mut File, buf: &mut [u8]) -> Result<usize, io::Error> {
    let mut n_filled = 0;
    while n_filled < buf.len() {
        match file.read(&mut buf[n_filled..]) {
            Ok(0) => break,
            Ok(n) => n_filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n_filled)
}

fn _unresolved(path: &Path, e: &io::Error) -> SpecUnresolved {
    SpecUnresolved {
        path: path.to_path_buf(),
        cause: if is_permission_denied(e) {
            EnumUnresolvedCause::NoPermission
        } else {
            EnumUnresolvedCause::Io
        },
        message: e.to_string(),
    }
}

/// Partition the union of both listings.
pub(crate) fn classify_level(
    path_dir_src: &Path,
    map_src: &TypeDirListing,
    path_dir_dst: &Path,
    map_dst: &TypeDirListing,
    spec_ignore_pats: &SpecIgnorePatterns,
    rule_symlink: EnumSyncSymlinkStrategy,
) -> SpecDiffLevel {
    let set_names: BTreeSet<&OsString> = map_src.keys().chain(map_dst.keys()).collect();
    let mut spec_diff = SpecDiffLevel::default();

    for name in set_names {
        if spec_ignore_pats.is_ignored(name) {
            spec_diff.l_ignored.push(name.clone());
            continue;
        }
        let opt_link_src = map_src.get(name).copied();
        let opt_link_dst = map_dst.get(name).copied();
        if rule_symlink == EnumSyncSymlinkStrategy::SkipSymlinks
            && (opt_link_src == Some(true) || opt_link_dst == Some(true))
        {
            spec_diff.l_skipped_links.push(name.clone());
            continue;
        }

        match (opt_link_src, opt_link_dst) {
            (Some(_), None) => spec_diff.l_src_only.push(name.clone()),
            (None, Some(_)) => spec_diff.l_dst_only.push(name.clone()),
            (Some(_), Some(_)) => {
                let path_src = path_dir_src.join(name);
                let path_dst = path_dir_dst.join(name);
                _classify_common(name, &path_src, &path_dst, rule_symlink, &mut spec_diff);
            }
            (None, None) => {}
        }
    }
    spec_diff
}

fn _classify_common(
    name: &OsString,
    path_src: &Path,
    path_dst: &Path,
    rule_symlink: EnumSyncSymlinkStrategy,
    spec_diff: &mut SpecDiffLevel,
) {
    let stat_src = match inspect_entry(path_src, rule_symlink) {
        Ok(v) => v,
        Err(e) => {
            spec_diff.l_unresolved.push(_unresolved(path_src, &e));
            return;
        }
    };
    let stat_dst = match inspect_entry(path_dst, rule_symlink) {
        Ok(v) => v,
        Err(e) => {
            spec_diff.l_unresolved.push(_unresolved(path_dst, &e));
            return;
        }
    };

    if stat_src.kind == EnumEntryKind::Other || stat_dst.kind == EnumEntryKind::Other {
        let path_other = if stat_src.kind == EnumEntryKind::Other {
            path_src
        } else {
            path_dst
        };
        spec_diff.l_unresolved.push(SpecUnresolved {
            path: path_other.to_path_buf(),
            cause: EnumUnresolvedCause::UnknownType,
            message: "file type unknown".to_string(),
        });
        return;
    }
    if stat_src.kind != stat_dst.kind {
        spec_diff.l_diff.push(name.clone());
        return;
    }

    let res_same = match stat_src.kind {
        EnumEntryKind::Dir => {
            spec_diff.l_common_dirs.push(name.clone());
            return;
        }
        EnumEntryKind::Symlink => fs::read_link(path_src)
            .and_then(|target_src| fs::read_link(path_dst).map(|t| t == target_src)),
        EnumEntryKind::File => is_same_file_content(path_src, &stat_src, path_dst, &stat_dst),
        EnumEntryKind::Other => return,
    };
    match res_same {
        Ok(true) => spec_diff.l_same.push(name.clone()),
        Ok(false) => spec_diff.l_diff.push(name.clone()),
        Err(e) => spec_diff.l_unresolved.push(_unresolved(path_src, &e)),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::Path;

    use filetime::{FileTime, set_file_mtime};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::{EnumEntryKind, classify_level, inspect_entry, is_same_file_content, list_dir};
    use crate::spec::{EnumSyncPatternMode, EnumSyncSymlinkStrategy};
    use crate::util::SpecIgnorePatterns;

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    fn names(l: &[OsString]) -> Vec<String> {
        l.iter().map(|n| n.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn classify_partitions_every_name_exactly_once() {
        let tmp = TempDir::new().expect("tmp");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");

        write_text(&src.join("only_src.txt"), "s");
        write_text(&dst.join("only_dst.txt"), "d");
        write_text(&src.join("changed.txt"), "new");
        write_text(&dst.join("changed.txt"), "old!");
        write_text(&src.join("same.txt"), "same");
        write_text(&dst.join("same.txt"), "same");
        write_text(&src.join("shared/inner.txt"), "x");
        std::fs::create_dir_all(dst.join("shared")).expect("mkdir");
        write_text(&src.join("kind"), "file on source");
        std::fs::create_dir_all(dst.join("kind")).expect("mkdir");
        write_text(&src.join(".git/HEAD"), "ref");

        let map_src = list_dir(&src, false).expect("list src");
        let map_dst = list_dir(&dst, false).expect("list dst");
        let pats = SpecIgnorePatterns::from_raw(
            Some(&[".git".to_string()]),
            EnumSyncPatternMode::Glob,
        )
        .expect("compile");
        let spec_diff = classify_level(
            &src,
            &map_src,
            &dst,
            &map_dst,
            &pats,
            EnumSyncSymlinkStrategy::Dereference,
        );

        assert_eq!(names(&spec_diff.l_src_only), vec!["only_src.txt"]);
        assert_eq!(names(&spec_diff.l_dst_only), vec!["only_dst.txt"]);
        assert_eq!(names(&spec_diff.l_diff), vec!["changed.txt", "kind"]);
        assert_eq!(names(&spec_diff.l_common_dirs), vec!["shared"]);
        assert_eq!(names(&spec_diff.l_ignored), vec![".git"]);
        assert!(spec_diff.l_unresolved.is_empty());

        let n_union = map_src
            .keys()
            .chain(map_dst.keys())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        assert_eq!(spec_diff.n_classified(), n_union);
    }

    #[test]
    fn equal_content_with_different_mtime_is_same() {
        let tmp = TempDir::new().expect("tmp");
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        write_text(&a, "identical bytes");
        write_text(&b, "identical bytes");
        set_file_mtime(&a, FileTime::from_unix_time(1_600_000_000, 0)).expect("mtime");
        set_file_mtime(&b, FileTime::from_unix_time(1_700_000_000, 0)).expect("mtime");

        let stat_a = inspect_entry(&a, EnumSyncSymlinkStrategy::Dereference).expect("stat");
        let stat_b = inspect_entry(&b, EnumSyncSymlinkStrategy::Dereference).expect("stat");
        assert!(is_same_file_content(&a, &stat_a, &b, &stat_b).expect("cmp"));
    }

    #[test]
    fn same_size_different_bytes_differ() {
        let tmp = TempDir::new().expect("tmp");
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        let mut payload = vec![7_u8; 3 * 8 * 1024 + 5];
        std::fs::write(&a, &payload).expect("write");
        let n_last = payload.len() - 1;
        payload[n_last] = 8;
        std::fs::write(&b, &payload).expect("write");
        set_file_mtime(&b, FileTime::from_unix_time(1_700_000_000, 0)).expect("mtime");

        let stat_a = inspect_entry(&a, EnumSyncSymlinkStrategy::Dereference).expect("stat");
        let stat_b = inspect_entry(&b, EnumSyncSymlinkStrategy::Dereference).expect("stat");
        assert!(!is_same_file_content(&a, &stat_a, &b, &stat_b).expect("cmp"));
    }

    #[test]
    fn missing_destination_lists_empty_only_when_allowed() {
        let tmp = TempDir::new().expect("tmp");
        let missing = tmp.path().join("nope");
        assert!(list_dir(&missing, true).expect("empty").is_empty());
        assert!(list_dir(&missing, false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_other_under_dereference() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tmp");
        let link = tmp.path().join("dangling");
        symlink(tmp.path().join("gone"), &link).expect("symlink");

        let stat = inspect_entry(&link, EnumSyncSymlinkStrategy::Dereference).expect("stat");
        assert_eq!(stat.kind, EnumEntryKind::Other);
        let stat = inspect_entry(&link, EnumSyncSymlinkStrategy::CopySymlinks).expect("stat");
        assert_eq!(stat.kind, EnumEntryKind::Symlink);
    }

    #[cfg(unix)]
    #[test]
    fn skip_symlinks_removes_name_from_both_sides() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tmp");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("real.txt"), "r");
        symlink(src.join("real.txt"), src.join("alias.txt")).expect("symlink");
        write_text(&dst.join("alias.txt"), "plain file on destination");

        let map_src = list_dir(&src, false).expect("list src");
        let map_dst = list_dir(&dst, false).expect("list dst");
        let spec_diff = classify_level(
            &src,
            &map_src,
            &dst,
            &map_dst,
            &SpecIgnorePatterns::default(),
            EnumSyncSymlinkStrategy::SkipSymlinks,
        );
        assert_eq!(names(&spec_diff.l_skipped_links), vec!["alias.txt"]);
        assert_eq!(names(&spec_diff.l_src_only), vec!["real.txt"]);
        assert!(spec_diff.l_dst_only.is_empty());
    }
}
