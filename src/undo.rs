//! Reverting organize runs from their move logs.
//!
//! A revert walks the recorded moves newest-first and puts every file back
//! where it came from, then removes the folders the run created if they are
//! empty. It never overwrites anything and can be run again on a log that was
//! only partly reverted.

use crate::file_organizer::{OrganizeError, OrganizeResult, move_path};
use crate::move_log::{MoveLogStore, MoveRecord};
use std::fs;
use std::io;
use std::path::PathBuf;

/// An item the revert could not restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertFailure {
    pub item: PathBuf,
    pub reason: String,
}

/// Outcome of a revert.
#[derive(Debug, Default)]
pub struct RevertReport {
    /// Number of files moved back to their original location.
    pub reverted: usize,
    /// Number of created folders that were removed.
    pub folders_removed: usize,
    pub errors: Vec<RevertFailure>,
    /// Recorded targets that no longer exist.
    pub not_found: Vec<PathBuf>,
}

impl RevertReport {
    /// Returns true if nothing was left behind.
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty() && self.not_found.is_empty()
    }
}

/// Outcome of restoring one move.
enum Restore {
    Done,
    TargetGone,
}

/// Manages undo operations for organize runs.
pub struct UndoManager;

impl UndoManager {
    /// Reverts every move and folder creation recorded in `log`.
    ///
    /// # Returns
    ///
    /// A `RevertReport` with what was restored. Per-item problems are
    /// collected in the report instead of aborting the revert.
    ///
    /// The log file is deleted only when the report is a complete success;
    /// otherwise it stays so the revert can be retried.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Target gone**: the file was deleted or already restored; listed in `not_found`
    /// * **Original location occupied**: recorded as an error, nothing is overwritten
    /// * **Folder not empty or gone**: left alone silently
    /// * **Missing log**: returns `OrganizeError::MissingLog`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dlm::move_log::MoveLogStore;
    /// use dlm::undo::UndoManager;
    ///
    /// let log = MoveLogStore::new("/downloads/.dlm/move_log.json");
    /// match UndoManager::revert_moves(&log) {
    ///     Ok(report) => println!("Restored {} files", report.reverted),
    ///     Err(e) => eprintln!("Revert failed: {}", e),
    /// }
    /// ```
    pub fn revert_moves(log: &MoveLogStore) -> OrganizeResult<RevertReport> {
        let recorded = log.load_existing()?;
        let mut report = RevertReport::default();

        for record in recorded.moves.iter().rev() {
            match Self::restore_file(record) {
                Ok(Restore::Done) => report.reverted += 1,
                Ok(Restore::TargetGone) => {
                    tracing::debug!(file = %record.target.display(), "nothing to restore");
                    report.not_found.push(record.target.clone());
                }
                Err(reason) => {
                    tracing::warn!(file = %record.target.display(), %reason, "restore failed");
                    report.errors.push(RevertFailure {
                        item: record.target.clone(),
                        reason,
                    });
                }
            }
        }

        for folder in recorded.folders_created.iter().rev() {
            match fs::remove_dir(&folder.folder_path) {
                Ok(()) => report.folders_removed += 1,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                    ) =>
                {
                    tracing::debug!(folder = %folder.folder_path.display(), "folder kept");
                }
                Err(e) => report.errors.push(RevertFailure {
                    item: folder.folder_path.clone(),
                    reason: format!("could not remove folder: {}", e),
                }),
            }
        }

        if report.is_complete_success()
            && let Err(e) = log.delete()
        {
            tracing::warn!(log = %log.path().display(), error = %e, "could not delete move log");
        }

        tracing::info!(
            log = %log.path().display(),
            reverted = report.reverted,
            folders_removed = report.folders_removed,
            errors = report.errors.len(),
            not_found = report.not_found.len(),
            "revert finished"
        );

        Ok(report)
    }

    /// Moves one file back to where it was recorded from.
    fn restore_file(record: &MoveRecord) -> Result<Restore, String> {
        if fs::symlink_metadata(&record.target).is_err() {
            return Ok(Restore::TargetGone);
        }

        if fs::symlink_metadata(&record.source).is_ok() {
            return Err(format!(
                "original location {} is occupied",
                record.source.display()
            ));
        }

        if let Some(parent) = record.source.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("could not recreate {}: {}", parent.display(), e))?;
        }

        match move_path(&record.target, &record.source) {
            Ok(()) => Ok(Restore::Done),
            Err(OrganizeError::MissingFile { .. }) => Ok(Restore::TargetGone),
            Err(e) => Err(format!("failed to restore file: {}", e)),
        }
    }
}
