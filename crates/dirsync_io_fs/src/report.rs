//! Sync report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::spec::{EnumSyncActionKind, SpecSyncAction, SpecSyncError};

/// Aggregate counters and diagnostics for one `sync_tree` run.
#[derive(Debug, Default, Clone)]
pub struct ReportSync {
    /// Entry names examined at compared directory levels.
    pub cnt_scanned: u64,
    /// Source-only entries materialized at the destination.
    pub cnt_added: u64,
    /// Destination-only entries moved to quarantine.
    pub cnt_deleted: u64,
    /// Differing entries replaced (old version moved to quarantine).
    pub cnt_updated: u64,
    /// Common files found equal.
    pub cnt_unchanged: u64,
    /// Entries left alone: unknown types, skipped links, permission failures.
    pub cnt_skipped: u64,
    /// Entries matching an ignore pattern.
    pub cnt_ignored: u64,
    /// Whether anything was (or, in dry-run, would be) moved to quarantine.
    pub if_quarantine_used: bool,
    /// Whether the run was a dry run.
    pub if_dry_run: bool,
    /// Applied actions in execution order.
    pub actions: Vec<SpecSyncAction>,
    /// Non-fatal warnings collected during traversal.
    pub warnings: Vec<String>,
    /// Per-entry recoverable failures.
    pub errors: Vec<SpecSyncError>,
}

impl ReportSync {
    /// Number of collected per-entry errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Whether the run changed (or would change) anything.
    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Destination paths of actions of one kind.
    pub fn paths_of(&self, kind: EnumSyncActionKind) -> Vec<&PathBuf> {
        self.actions
            .iter()
            .filter(|spec_action| spec_action.kind == kind)
            .map(|spec_action| &spec_action.path)
            .collect()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_added".to_string(), self.cnt_added);
        dict_counts.insert("cnt_deleted".to_string(), self.cnt_deleted);
        dict_counts.insert("cnt_updated".to_string(), self.cnt_updated);
        dict_counts.insert("cnt_unchanged".to_string(), self.cnt_unchanged);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_ignored".to_string(), self.cnt_ignored);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} scanned={} added={} deleted={} updated={} unchanged={} skipped={} ignored={} errors={} warnings={}",
            dict_counts["cnt_scanned"],
            dict_counts["cnt_added"],
            dict_counts["cnt_deleted"],
            dict_counts["cnt_updated"],
            dict_counts["cnt_unchanged"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_ignored"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[SYNC]"))
    }
}

/// Mutable accumulator threaded through one run.
#[derive(Debug, Default, Clone)]
pub struct ReportSyncBuilder {
    /// See [`ReportSync::cnt_scanned`].
    pub cnt_scanned: u64,
    /// See [`ReportSync::cnt_unchanged`].
    pub cnt_unchanged: u64,
    /// See [`ReportSync::cnt_skipped`].
    pub cnt_skipped: u64,
    /// See [`ReportSync::cnt_ignored`].
    pub cnt_ignored: u64,
    /// See [`ReportSync::if_quarantine_used`].
    pub if_quarantine_used: bool,
    /// See [`ReportSync::actions`].
    pub actions: Vec<SpecSyncAction>,
    /// See [`ReportSync::warnings`].
    pub warnings: Vec<String>,
    /// See [`ReportSync::errors`].
    pub errors: Vec<SpecSyncError>,
}

impl ReportSyncBuilder {
    /// Increment one or more named counters by `value`.
    ///
    /// Unknown names are ignored.
    pub fn add_counts(&mut self, field_names: &[&str], value: u64) {
        for field_name in field_names {
            match *field_name {
                "cnt_scanned" => self.cnt_scanned += value,
                "cnt_unchanged" => self.cnt_unchanged += value,
                "cnt_skipped" => self.cnt_skipped += value,
                "cnt_ignored" => self.cnt_ignored += value,
                _ => {}
            }
        }
    }

    /// Increment skipped count by one.
    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    /// Record one action. Deletes and updates mark the quarantine as used.
    pub fn add_action(&mut self, kind: EnumSyncActionKind, path: PathBuf) {
        if matches!(
            kind,
            EnumSyncActionKind::Delete | EnumSyncActionKind::Update
        ) {
            self.if_quarantine_used = true;
        }
        self.actions.push(SpecSyncAction { kind, path });
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Add one path-scoped error.
    pub fn add_error(&mut self, path: PathBuf, exception: String) {
        self.errors.push(SpecSyncError { path, exception });
    }

    /// Finalize builder into immutable report.
    pub fn build(self, if_dry_run: bool) -> ReportSync {
        let n_of = |kind: EnumSyncActionKind| {
            self.actions
                .iter()
                .filter(|spec_action| spec_action.kind == kind)
                .count() as u64
        };
        let cnt_added = n_of(EnumSyncActionKind::AddFile) + n_of(EnumSyncActionKind::AddDir);
        let cnt_deleted = n_of(EnumSyncActionKind::Delete);
        let cnt_updated = n_of(EnumSyncActionKind::Update);

        ReportSync {
            cnt_scanned: self.cnt_scanned,
            cnt_added,
            cnt_deleted,
            cnt_updated,
            cnt_unchanged: self.cnt_unchanged,
            cnt_skipped: self.cnt_skipped,
            cnt_ignored: self.cnt_ignored,
            if_quarantine_used: self.if_quarantine_used,
            if_dry_run,
            actions: self.actions,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}
