//! On-disk document store: load/save primitives, rotating backups and the
//! guarded `safe_save` protocol.
use chrono::Local;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::integrity::{self, IntegrityConfig};
use crate::state::Document;

/// Lazy backup cadence and retention bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Minimum time between two backups within one process lifetime.
    pub min_interval: Duration,
    /// How many backup files to retain; oldest pruned first.
    pub retain: usize,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(300),
            retain: 10,
        }
    }
}

/// Per-call overrides for [`DocumentStore::safe_save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Bypass the integrity comparison for trusted bulk operations
    /// (batch import, batch delete).
    pub skip_check: bool,
    /// Threshold overrides for this save only.
    pub integrity: Option<IntegrityConfig>,
}

/// Owns the single persisted document file plus its backup rotation.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    backup_policy: BackupPolicy,
    integrity: IntegrityConfig,
    last_backup: Option<Instant>,
}

impl DocumentStore {
    /// Store over `path` with default policies.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policies(path, BackupPolicy::default(), IntegrityConfig::default())
    }

    /// Store with explicit backup and integrity policies.
    pub fn with_policies(
        path: impl Into<PathBuf>,
        backup_policy: BackupPolicy,
        integrity: IntegrityConfig,
    ) -> Self {
        Self {
            path: path.into(),
            backup_policy,
            integrity,
            last_backup: None,
        }
    }

    /// Path of the persisted document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to the starter document when the
    /// file is missing or unreadable. A parse failure is logged rather than
    /// fatal; the integrity guard prevents the fallback from ever
    /// clobbering the broken file silently.
    #[must_use]
    pub fn load_or_default(&self) -> Document {
        if !self.path.exists() {
            info!("data file {} missing, starting fresh", self.path.display());
            return Document::starter();
        }
        match self.load_strict() {
            Ok(doc) => doc,
            Err(err) => {
                error!(
                    "failed to load {}: {err}; serving starter document",
                    self.path.display()
                );
                Document::starter()
            }
        }
    }

    /// Load without any default fallback; used as the last-known-good
    /// snapshot inside [`Self::safe_save`].
    ///
    /// # Errors
    ///
    /// I/O or JSON errors propagate untouched.
    pub fn load_strict(&self) -> Result<Document, EngineError> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Serialize and write the document unconditionally.
    ///
    /// # Errors
    ///
    /// I/O or JSON errors propagate untouched.
    pub fn save(&self, doc: &Document) -> Result<(), EngineError> {
        let payload = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }

    /// Guarded save protocol: strict reload of the prior document,
    /// structural validation, integrity comparison, lazy rotating backup,
    /// then the write; a failed write restores the just-made backup.
    ///
    /// Validation or integrity failure aborts before anything touches the
    /// disk, so a rejected save leaves the on-disk file byte-identical.
    ///
    /// # Errors
    ///
    /// `Validation`, `IntegrityViolation` or `WriteFailure` per the stage
    /// that failed.
    pub fn safe_save(
        &mut self,
        candidate: &Document,
        opts: &SaveOptions,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string_pretty(candidate)?;
        integrity::validate_structure(&serde_json::to_value(candidate)?)?;

        if self.path.exists() {
            if opts.skip_check {
                debug!("integrity check skipped by caller");
            } else {
                let original = self.load_strict()?;
                let config = opts.integrity.unwrap_or(self.integrity);
                integrity::check(&original, candidate, config)?;
            }
        }

        let backup = self.backup_if_due()?;
        if let Err(source) = fs::write(&self.path, payload) {
            let restored = backup.as_deref().is_some_and(|file| self.restore_from(file));
            return Err(EngineError::WriteFailure { restored, source });
        }
        Ok(())
    }

    /// Copy the current on-disk document to a timestamped backup when the
    /// configured minimum interval has elapsed; prune old backups after.
    ///
    /// # Errors
    ///
    /// I/O errors from the copy propagate; pruning failures only log.
    pub fn backup_if_due(&mut self) -> Result<Option<PathBuf>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        if let Some(last) = self.last_backup {
            if last.elapsed() < self.backup_policy.min_interval {
                debug!("skipping backup: interval not yet elapsed");
                return Ok(None);
            }
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup = PathBuf::from(format!("{}.backup_{stamp}", self.path.display()));
        fs::copy(&self.path, &backup)?;
        self.last_backup = Some(Instant::now());
        info!("backup created: {}", backup.display());
        self.prune_backups();
        Ok(Some(backup))
    }

    /// All existing backup files for this document, newest first by
    /// modification time.
    #[must_use]
    pub fn list_backups(&self) -> Vec<PathBuf> {
        let Some(parent) = self.path.parent() else {
            return Vec::new();
        };
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Vec::new();
        };
        let prefix = format!("{file_name}.backup_");

        let Ok(entries) = fs::read_dir(parent) else {
            return Vec::new();
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
            })
            .collect();
        backups.sort_by_key(|path| {
            std::cmp::Reverse(
                fs::metadata(path)
                    .and_then(|meta| meta.modified())
                    .ok(),
            )
        });
        backups
    }

    fn prune_backups(&self) {
        for stale in self.list_backups().iter().skip(self.backup_policy.retain) {
            match fs::remove_file(stale) {
                Ok(()) => info!("pruned old backup: {}", stale.display()),
                Err(err) => warn!("failed to prune backup {}: {err}", stale.display()),
            }
        }
    }

    fn restore_from(&self, backup: &Path) -> bool {
        match fs::copy(backup, &self.path) {
            Ok(_) => {
                info!("restored document from {}", backup.display());
                true
            }
            Err(err) => {
                error!("restore from {} failed: {err}", backup.display());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn store_in(dir: &tempfile::TempDir) -> DocumentStore {
        DocumentStore::with_policies(
            dir.path().join("questline_data.json"),
            BackupPolicy {
                min_interval: Duration::ZERO,
                retain: 3,
            },
            IntegrityConfig::default(),
        )
    }

    #[test]
    fn missing_file_serves_starter_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let doc = store.load_or_default();
        assert!(!doc.items.is_empty());
        assert!(store.load_strict().is_err());
    }

    #[test]
    fn save_then_strict_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut doc = Document::starter();
        doc.tasks.push(Task::new(99, "persisted"));
        store.save(&doc).unwrap();
        assert_eq!(store.load_strict().unwrap(), doc);
    }

    #[test]
    fn backup_rotation_keeps_retention_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.save(&Document::starter()).unwrap();
        for round in 0..6 {
            // Distinct content so the copies are real files either way.
            let mut doc = Document::starter();
            doc.tasks.push(Task::new(100 + round, "round"));
            store.save(&doc).unwrap();
            store.backup_if_due().unwrap();
            // Backup names carry second resolution; nudge mtimes apart.
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(store.list_backups().len() <= 3);
    }
}
