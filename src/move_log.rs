//! Persistent record of the moves and folder creations made by an organize run.
//!
//! A log lives in a single JSON file. Each organize workflow writes to its own
//! file, so the initial organize and the group organize can be reverted
//! independently. The file is rewritten atomically after every appended record.

use crate::file_organizer::{OrganizeError, OrganizeResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Value of `action` on every folder creation record.
pub const CREATE_FOLDER_ACTION: &str = "create_folder";

/// Reads an RFC 3339 timestamp, or one without an offset, which is taken as UTC.
/// Logs written by earlier releases of the tool carry local times with no offset.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// A single file relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Where the file lived before the move.
    pub source: PathBuf,
    /// Where the file was moved to, after conflict resolution.
    pub target: PathBuf,
    /// The name the file was requested under.
    pub filename: String,
}

impl MoveRecord {
    pub fn new(source: PathBuf, target: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            target,
            filename: filename.into(),
        }
    }
}

/// A folder that did not exist until this tool created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCreationRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub folder_name: String,
    pub folder_path: PathBuf,
}

impl FolderCreationRecord {
    pub fn new(folder_name: impl Into<String>, folder_path: PathBuf) -> Self {
        Self {
            timestamp: Utc::now(),
            action: CREATE_FOLDER_ACTION.to_string(),
            folder_name: folder_name.into(),
            folder_path,
        }
    }
}

/// The on-disk shape of a move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLog {
    /// Time of the last update.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub base_directory: PathBuf,
    /// Always equal to `moves.len()`.
    pub total_moves: usize,
    pub moves: Vec<MoveRecord>,
    #[serde(default)]
    pub folders_created: Vec<FolderCreationRecord>,
}

impl MoveLog {
    /// Creates an empty log for a base directory.
    pub fn new(base_directory: PathBuf) -> Self {
        Self {
            timestamp: Utc::now(),
            base_directory,
            total_moves: 0,
            moves: Vec::new(),
            folders_created: Vec::new(),
        }
    }

    pub fn add_move(&mut self, record: MoveRecord) {
        self.moves.push(record);
        self.touch();
    }

    pub fn add_folder(&mut self, record: FolderCreationRecord) {
        self.folders_created.push(record);
        self.touch();
    }

    fn touch(&mut self) {
        self.total_moves = self.moves.len();
        self.timestamp = Utc::now();
    }

    /// Checks the invariants serde cannot express.
    fn validate(&self) -> Result<(), String> {
        if self.total_moves != self.moves.len() {
            return Err(format!(
                "total_moves is {} but {} moves are recorded",
                self.total_moves,
                self.moves.len()
            ));
        }
        if let Some(folder) = self
            .folders_created
            .iter()
            .find(|f| f.action != CREATE_FOLDER_ACTION)
        {
            return Err(format!(
                "unexpected action '{}' for folder '{}'",
                folder.action, folder.folder_name
            ));
        }
        Ok(())
    }
}

/// Handle to one move log file.
///
/// Stores at different paths share nothing; a store only ever touches its own
/// file (plus a temporary sibling while writing).
#[derive(Debug, Clone)]
pub struct MoveLogStore {
    path: PathBuf,
}

impl MoveLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the log, returning `None` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::CorruptLog` when the file exists but is not a
    /// well-formed move log. The file is left untouched in that case.
    pub fn load(&self) -> OrganizeResult<Option<MoveLog>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| OrganizeError::from_io(&self.path, e))?;

        let log: MoveLog =
            serde_json::from_str(&contents).map_err(|e| OrganizeError::CorruptLog {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        log.validate().map_err(|reason| OrganizeError::CorruptLog {
            path: self.path.clone(),
            reason,
        })?;

        Ok(Some(log))
    }

    /// Loads the log, failing with `MissingLog` when there is none.
    pub fn load_existing(&self) -> OrganizeResult<MoveLog> {
        self.load()?.ok_or_else(|| OrganizeError::MissingLog {
            path: self.path.clone(),
        })
    }

    /// Appends a move record, creating the log if needed.
    pub fn append_move(&self, base_directory: &Path, record: MoveRecord) -> OrganizeResult<()> {
        self.update(base_directory, |log| log.add_move(record))
    }

    /// Appends a folder creation record, creating the log if needed.
    pub fn append_folder(
        &self,
        base_directory: &Path,
        record: FolderCreationRecord,
    ) -> OrganizeResult<()> {
        self.update(base_directory, |log| log.add_folder(record))
    }

    /// Writes the whole log atomically.
    pub fn save(&self, log: &MoveLog) -> OrganizeResult<()> {
        let json = serde_json::to_string_pretty(log).map_err(|e| OrganizeError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        atomic_write(&self.path, json.as_bytes())
    }

    /// Removes the log file. A missing file is not an error.
    pub fn delete(&self) -> OrganizeResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrganizeError::from_io(&self.path, e)),
        }
    }

    fn update(
        &self,
        base_directory: &Path,
        apply: impl FnOnce(&mut MoveLog),
    ) -> OrganizeResult<()> {
        let mut log = match self.load()? {
            Some(log) => {
                if log.base_directory != base_directory {
                    tracing::warn!(
                        log = %self.path.display(),
                        recorded = %log.base_directory.display(),
                        current = %base_directory.display(),
                        "appending to a move log recorded for another directory"
                    );
                }
                log
            }
            None => MoveLog::new(base_directory.to_path_buf()),
        };
        apply(&mut log);
        self.save(&log)
    }
}

/// Writes `data` to a sibling temp file, syncs it, and renames it over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> OrganizeResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| OrganizeError::from_io(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "move_log.json".to_string());
    let temp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(OrganizeError::from_io(&temp_path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(OrganizeError::from_io(path, e));
    }

    sync_directory(&parent);
    Ok(())
}

/// Makes a completed rename durable. Best effort: not every platform can
/// open a directory for syncing.
fn sync_directory(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}
