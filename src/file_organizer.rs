//! Folder creation and file moves for organize runs.
//!
//! This module creates destination folders inside a base directory and moves
//! files into them. Name collisions are resolved by numbering, never by
//! overwriting. When a move log is supplied, every created folder and every
//! completed move is recorded so the run can be reverted later.

use crate::move_log::{FolderCreationRecord, MoveLogStore, MoveRecord};
use filetime::FileTime;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during organize and revert operations.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The base directory or a folder name cannot be used.
    #[error("Invalid path {}: {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// The operating system refused the operation.
    #[error("Permission denied for {}: {source}", .path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    /// A file disappeared before it could be moved.
    #[error("File not found: {}", .path.display())]
    MissingFile { path: PathBuf },

    /// A move log exists but cannot be trusted.
    #[error("Move log {} is corrupt: {reason}", .path.display())]
    CorruptLog { path: PathBuf, reason: String },

    /// A revert was requested but no move log exists.
    #[error("No move log found at {}", .path.display())]
    MissingLog { path: PathBuf },

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl OrganizeError {
    /// Wraps an I/O error, singling out permission failures.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_path_buf(),
                source,
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// A file that could not be moved, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveFailure {
    pub filename: String,
    pub reason: String,
}

/// Outcome of moving a batch of files into one folder.
#[derive(Debug, Clone, Default)]
pub struct MoveReport {
    /// Completed moves, in the order they happened.
    pub moved: Vec<MoveRecord>,
    /// Requested names with no file behind them.
    pub not_found: Vec<String>,
    pub errors: Vec<MoveFailure>,
}

impl MoveReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: MoveReport) {
        self.moved.extend(other.moved);
        self.not_found.extend(other.not_found);
        self.errors.extend(other.errors);
    }
}

/// Creates folders and moves files within a base directory.
pub struct FileOrganizer;

impl FileOrganizer {
    /// Ensures that `base_dir/<name>` exists for every requested name.
    ///
    /// Existing folders are left alone and are not logged; only folders this
    /// call actually creates get a `FolderCreationRecord`. A name repeated in
    /// `folder_names` is created (and logged) once.
    ///
    /// # Returns
    ///
    /// A map from every requested name to its absolute folder path.
    ///
    /// # Errors
    ///
    /// * `InvalidPath` if `base_dir` is not an existing directory, or a name is
    ///   not a single path segment. Names are checked before anything is created.
    /// * `PermissionDenied` if the folder cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dlm::file_organizer::FileOrganizer;
    /// use dlm::move_log::MoveLogStore;
    /// use std::path::Path;
    ///
    /// let log = MoveLogStore::new("/downloads/.dlm/move_log.json");
    /// let folders = FileOrganizer::create_folders(
    ///     Path::new("/downloads"),
    ///     &["important", "trash"],
    ///     Some(&log),
    /// )?;
    /// println!("{}", folders["trash"].display());
    /// # Ok::<(), dlm::file_organizer::OrganizeError>(())
    /// ```
    pub fn create_folders<S: AsRef<str>>(
        base_dir: &Path,
        folder_names: &[S],
        log: Option<&MoveLogStore>,
    ) -> OrganizeResult<HashMap<String, PathBuf>> {
        let base = resolve_base_dir(base_dir)?;

        for name in folder_names {
            let name = name.as_ref();
            validate_segment(name).map_err(|reason| OrganizeError::InvalidPath {
                path: base.join(name),
                reason,
            })?;
        }

        let mut folders = HashMap::new();
        for name in folder_names {
            let name = name.as_ref();
            let folder_path = base.join(name);

            if path_taken(&folder_path) {
                if !folder_path.is_dir() {
                    return Err(OrganizeError::InvalidPath {
                        path: folder_path,
                        reason: "exists and is not a directory".to_string(),
                    });
                }
            } else if Self::create_folder(&folder_path)? {
                tracing::debug!(folder = %folder_path.display(), "created folder");
                if let Some(store) = log {
                    let record = FolderCreationRecord::new(name, folder_path.clone());
                    if let Err(e) = store.append_folder(&base, record) {
                        // An unlogged folder would never be cleaned up by a revert.
                        let _ = fs::remove_dir(&folder_path);
                        return Err(e);
                    }
                }
            }

            folders.insert(name.to_string(), folder_path);
        }

        Ok(folders)
    }

    /// Creates one folder, returning false if it appeared in the meantime.
    fn create_folder(path: &Path) -> OrganizeResult<bool> {
        match fs::create_dir(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
            Err(e) => Err(OrganizeError::from_io(path, e)),
        }
    }

    /// Moves the named files from `base_dir` into `base_dir/<target_dir_name>`.
    ///
    /// The target folder is created if missing (and logged). Every file is
    /// handled on its own: a missing file lands in `not_found`, any other
    /// failure in `errors`, and the loop carries on. When the destination
    /// name is taken, the file is stored as `name (1).ext`, `name (2).ext`, …
    ///
    /// With a log, each completed move is appended before the next file is
    /// touched. If that append fails, the file is put back and the error is
    /// returned, so the log never misses a move.
    ///
    /// # Errors
    ///
    /// Only structural failures are returned: an invalid base directory or
    /// target name, or a move log that is corrupt or cannot be written.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dlm::file_organizer::FileOrganizer;
    /// use dlm::move_log::MoveLogStore;
    /// use std::path::Path;
    ///
    /// let log = MoveLogStore::new("/d/log.json");
    /// let report =
    ///     FileOrganizer::move_files_to_dir(Path::new("/d"), &["x.txt"], "important", Some(&log))?;
    /// assert_eq!(report.moved.len(), 1);
    /// # Ok::<(), dlm::file_organizer::OrganizeError>(())
    /// ```
    pub fn move_files_to_dir<S: AsRef<str>>(
        base_dir: &Path,
        files: &[S],
        target_dir_name: &str,
        log: Option<&MoveLogStore>,
    ) -> OrganizeResult<MoveReport> {
        let base = resolve_base_dir(base_dir)?;

        // Refuse to move anything if the log cannot be appended to.
        if let Some(store) = log {
            store.load()?;
        }

        Self::create_folders(&base, &[target_dir_name], log)?;
        let target_dir = base.join(target_dir_name);

        let mut report = MoveReport::default();
        for filename in files {
            let filename = filename.as_ref();

            if let Err(reason) = validate_segment(filename) {
                report.errors.push(MoveFailure {
                    filename: filename.to_string(),
                    reason,
                });
                continue;
            }

            let source = base.join(filename);
            if !path_taken(&source) {
                tracing::warn!(file = filename, "source file not found");
                report.not_found.push(filename.to_string());
                continue;
            }
            if source.is_dir() {
                report.errors.push(MoveFailure {
                    filename: filename.to_string(),
                    reason: "not a regular file".to_string(),
                });
                continue;
            }

            let destination = unique_destination(&target_dir, filename);
            match move_path(&source, &destination) {
                Ok(()) => {
                    let record = MoveRecord::new(source.clone(), destination.clone(), filename);
                    if let Some(store) = log
                        && let Err(e) = store.append_move(&base, record.clone())
                    {
                        if let Err(restore) = move_path(&destination, &source) {
                            tracing::error!(
                                file = filename,
                                error = %restore,
                                "could not put back a file whose move was not logged"
                            );
                        }
                        return Err(e);
                    }
                    tracing::debug!(
                        source = %source.display(),
                        destination = %destination.display(),
                        "moved file"
                    );
                    report.moved.push(record);
                }
                Err(OrganizeError::MissingFile { .. }) => {
                    report.not_found.push(filename.to_string());
                }
                Err(e) => {
                    tracing::warn!(file = filename, error = %e, "move failed");
                    report.errors.push(MoveFailure {
                        filename: filename.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            folder = %target_dir.display(),
            moved = report.moved.len(),
            not_found = report.not_found.len(),
            errors = report.errors.len(),
            "move batch finished"
        );

        Ok(report)
    }
}

/// Checks that the base directory exists and returns its absolute form.
fn resolve_base_dir(base_dir: &Path) -> OrganizeResult<PathBuf> {
    if !base_dir.exists() {
        return Err(OrganizeError::InvalidPath {
            path: base_dir.to_path_buf(),
            reason: "directory does not exist".to_string(),
        });
    }
    if !base_dir.is_dir() {
        return Err(OrganizeError::InvalidPath {
            path: base_dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    fs::canonicalize(base_dir).map_err(|e| OrganizeError::from_io(base_dir, e))
}

/// Accepts only names that address a direct child of a directory.
pub fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a valid name", name));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(format!("'{}' contains a path separator or NUL", name));
    }
    Ok(())
}

/// True if anything, including a dangling symlink, occupies `path`.
fn path_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Picks a free path for `file_name` inside `dir`.
///
/// `report.pdf` becomes `report (1).pdf`, then `report (2).pdf`, and so on.
/// Names without an extension get the suffix at the end: `notes (1)`.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !path_taken(&candidate) {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = as_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    (1u64..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|path| !path_taken(path))
        .unwrap_or(candidate)
}

/// Moves a file, falling back to copy + delete across filesystems.
pub(crate) fn move_path(source: &Path, destination: &Path) -> OrganizeResult<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !path_taken(source) => {
            Err(OrganizeError::MissingFile {
                path: source.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(source, destination)
        }
        Err(e) => Err(OrganizeError::from_io(source, e)),
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> OrganizeResult<()> {
    let metadata = fs::metadata(source).map_err(|e| OrganizeError::from_io(source, e))?;
    if metadata.is_dir() {
        return Err(OrganizeError::Io {
            path: source.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::Unsupported,
                "directories cannot be moved across filesystems",
            ),
        });
    }

    if let Err(e) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(OrganizeError::from_io(destination, e));
    }

    let accessed = FileTime::from_last_access_time(&metadata);
    let modified = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_times(destination, accessed, modified) {
        tracing::warn!(file = %destination.display(), error = %e, "could not preserve timestamps");
    }

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(OrganizeError::from_io(source, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn canonical(temp_dir: &TempDir) -> PathBuf {
        fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize temp directory")
    }

    #[test]
    fn test_create_folders_creates_and_logs_new_folders() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        let log = MoveLogStore::new(base.join("log.json"));

        let folders = FileOrganizer::create_folders(&base, &["important", "trash"], Some(&log))
            .expect("Failed to create folders");

        assert_eq!(folders["important"], base.join("important"));
        assert!(base.join("trash").is_dir());
        let recorded = log.load_existing().expect("log missing");
        assert_eq!(recorded.folders_created.len(), 2);
        assert_eq!(recorded.folders_created[0].folder_name, "important");
        assert_eq!(recorded.total_moves, 0);
    }

    #[test]
    fn test_create_folders_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        let log = MoveLogStore::new(base.join("log.json"));

        FileOrganizer::create_folders(&base, &["important"], Some(&log))
            .expect("first call failed");
        FileOrganizer::create_folders(&base, &["important", "important"], Some(&log))
            .expect("second call failed");

        let recorded = log.load_existing().expect("log missing");
        assert_eq!(recorded.folders_created.len(), 1);
    }

    #[test]
    fn test_create_folders_does_not_claim_existing_folder() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::create_dir(base.join("trash")).expect("Failed to create folder");
        let log = MoveLogStore::new(base.join("log.json"));

        let folders = FileOrganizer::create_folders(&base, &["trash"], Some(&log))
            .expect("Failed to create folders");

        assert_eq!(folders.len(), 1);
        assert!(!log.exists());
    }

    #[test]
    fn test_create_folders_rejects_invalid_names() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);

        for bad in ["", "..", "a/b"] {
            let result = FileOrganizer::create_folders(&base, &["ok", bad], None);
            assert!(
                matches!(result, Err(OrganizeError::InvalidPath { .. })),
                "'{}' should be rejected",
                bad
            );
        }
        assert!(!base.join("ok").exists(), "no folder is created on rejection");
    }

    #[test]
    fn test_create_folders_invalid_base_path() {
        let result = FileOrganizer::create_folders(Path::new("/non/existent/path"), &["x"], None);
        assert!(matches!(result, Err(OrganizeError::InvalidPath { .. })));
    }

    #[test]
    fn test_move_single_file_into_new_folder() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::write(base.join("x.txt"), "content").expect("Failed to write file");
        let log = MoveLogStore::new(base.join("log.json"));

        let report = FileOrganizer::move_files_to_dir(&base, &["x.txt"], "important", Some(&log))
            .expect("Failed to move files");

        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].source, base.join("x.txt"));
        assert_eq!(report.moved[0].target, base.join("important").join("x.txt"));
        assert!(!base.join("x.txt").exists());
        assert!(base.join("important").join("x.txt").exists());

        let recorded = log.load_existing().expect("log missing");
        assert_eq!(recorded.total_moves, 1);
        assert_eq!(recorded.folders_created.len(), 1);
        assert_eq!(recorded.folders_created[0].folder_name, "important");
    }

    #[test]
    fn test_conflicting_names_get_numbered() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::create_dir(base.join("docs")).expect("Failed to create folder");
        fs::write(base.join("docs").join("a.txt"), "first").expect("Failed to write file");
        fs::write(base.join("a.txt"), "second").expect("Failed to write file");

        let report = FileOrganizer::move_files_to_dir(&base, &["a.txt"], "docs", None)
            .expect("Failed to move files");

        assert_eq!(report.moved[0].target, base.join("docs").join("a (1).txt"));
        assert_eq!(
            fs::read_to_string(base.join("docs").join("a.txt")).expect("read failed"),
            "first"
        );
        assert_eq!(
            fs::read_to_string(base.join("docs").join("a (1).txt")).expect("read failed"),
            "second"
        );
    }

    #[test]
    fn test_unique_destination_numbering() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        fs::write(dir.join("notes"), "").expect("Failed to write file");
        fs::write(dir.join("report.pdf"), "").expect("Failed to write file");
        fs::write(dir.join("report (1).pdf"), "").expect("Failed to write file");

        assert_eq!(unique_destination(dir, "notes"), dir.join("notes (1)"));
        assert_eq!(unique_destination(dir, "report.pdf"), dir.join("report (2).pdf"));
        assert_eq!(unique_destination(dir, "fresh.txt"), dir.join("fresh.txt"));
    }

    #[test]
    fn test_missing_file_does_not_stop_the_batch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        for name in ["a.txt", "b.txt", "d.txt", "e.txt"] {
            fs::write(base.join(name), name).expect("Failed to write file");
        }
        let log = MoveLogStore::new(base.join("log.json"));

        let report = FileOrganizer::move_files_to_dir(
            &base,
            &["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"],
            "trash",
            Some(&log),
        )
        .expect("Failed to move files");

        assert_eq!(report.moved.len(), 4);
        assert_eq!(report.not_found, vec!["c.txt".to_string()]);
        assert!(report.errors.is_empty());
        assert_eq!(log.load_existing().expect("log missing").moves.len(), 4);
    }

    #[test]
    fn test_invalid_file_names_are_reported_per_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::write(base.join("ok.txt"), "").expect("Failed to write file");

        let report =
            FileOrganizer::move_files_to_dir(&base, &["../escape.txt", "ok.txt"], "misc", None)
                .expect("Failed to move files");

        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].filename, "../escape.txt");
    }

    #[test]
    fn test_corrupt_log_aborts_before_moving() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::write(base.join("x.txt"), "").expect("Failed to write file");
        fs::write(base.join("log.json"), "garbage").expect("Failed to write log");
        let log = MoveLogStore::new(base.join("log.json"));

        let result = FileOrganizer::move_files_to_dir(&base, &["x.txt"], "important", Some(&log));

        assert!(matches!(result, Err(OrganizeError::CorruptLog { .. })));
        assert!(base.join("x.txt").exists());
        assert!(!base.join("important").exists());
        assert_eq!(fs::read_to_string(base.join("log.json")).expect("read failed"), "garbage");
    }

    /// A log store whose path runs through a regular file, so every write fails.
    fn unwritable_log(base: &Path) -> MoveLogStore {
        fs::write(base.join("blocker"), "").expect("Failed to write blocker file");
        MoveLogStore::new(base.join("blocker").join("log.json"))
    }

    #[test]
    fn test_failed_move_log_append_puts_file_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::create_dir(base.join("important")).expect("Failed to create folder");
        fs::write(base.join("x.txt"), "data").expect("Failed to write file");
        let log = unwritable_log(&base);

        let result = FileOrganizer::move_files_to_dir(&base, &["x.txt"], "important", Some(&log));

        assert!(matches!(result, Err(OrganizeError::Io { .. })));
        assert_eq!(fs::read_to_string(base.join("x.txt")).expect("file lost"), "data");
        assert!(!base.join("important").join("x.txt").exists());
        assert!(base.join("important").is_dir(), "pre-existing folder is kept");
    }

    #[test]
    fn test_failed_folder_log_append_removes_new_folder() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = canonical(&temp_dir);
        fs::write(base.join("x.txt"), "data").expect("Failed to write file");
        let log = unwritable_log(&base);

        let result = FileOrganizer::move_files_to_dir(&base, &["x.txt"], "important", Some(&log));

        assert!(matches!(result, Err(OrganizeError::Io { .. })));
        assert_eq!(fs::read_to_string(base.join("x.txt")).expect("file lost"), "data");
        assert!(!base.join("important").exists());

        let created = FileOrganizer::create_folders(&base, &["trash"], Some(&log));
        assert!(matches!(created, Err(OrganizeError::Io { .. })));
        assert!(!base.join("trash").exists());
    }

    #[test]
    fn test_move_invalid_base_path() {
        let result = FileOrganizer::move_files_to_dir(
            Path::new("/non/existent/path"),
            &["file.txt"],
            "documents",
            None,
        );
        assert!(matches!(result, Err(OrganizeError::InvalidPath { .. })));
    }
}
