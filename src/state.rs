//! The `.dlm/` state directory kept inside an organized directory.
//!
//! It holds classifier results between commands and the two move logs:
//! `move_log.json` for the initial organize and `group_move_log.json` for
//! group moves, so each workflow can be reverted on its own.

use crate::classifier::FileGroup;
use crate::move_log::MoveLogStore;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STATE_DIR_NAME: &str = ".dlm";
pub const IMPORTANT_LIST: &str = "important_files.txt";
pub const TRASH_LIST: &str = "trash_files.txt";
pub const GROUPS_FILE: &str = "groups.json";
pub const GROUPS_SUMMARY: &str = "groups_summary.txt";
pub const MOVE_LOG: &str = "move_log.json";
pub const GROUP_MOVE_LOG: &str = "group_move_log.json";

/// Handle to `<directory>/.dlm/`.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Opens the state directory of `directory`, creating it if needed.
    pub fn open(directory: &Path) -> io::Result<Self> {
        let root = directory.join(STATE_DIR_NAME);
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn move_log(&self) -> MoveLogStore {
        MoveLogStore::new(self.file(MOVE_LOG))
    }

    pub fn group_move_log(&self) -> MoveLogStore {
        MoveLogStore::new(self.file(GROUP_MOVE_LOG))
    }

    /// Reads a newline-separated list. A missing file is an empty list.
    pub fn load_list(&self, name: &str) -> io::Result<Vec<String>> {
        match fs::read_to_string(self.file(name)) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn save_list(&self, name: &str, entries: &[String]) -> io::Result<PathBuf> {
        let path = self.file(name);
        let mut content = entries.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Reads `groups.json`. Returns `None` when no grouping has been done yet.
    pub fn load_groups(&self) -> io::Result<Option<Vec<FileGroup>>> {
        let content = match fs::read_to_string(self.file(GROUPS_FILE)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Writes `groups.json` and a readable `groups_summary.txt` next to it.
    pub fn save_groups(&self, groups: &[FileGroup]) -> io::Result<PathBuf> {
        let path = self.file(GROUPS_FILE);
        let json = serde_json::to_string_pretty(groups)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        fs::write(self.file(GROUPS_SUMMARY), groups_summary(groups))?;
        Ok(path)
    }
}

fn groups_summary(groups: &[FileGroup]) -> String {
    let mut summary = String::new();
    let total: usize = groups.iter().map(|g| g.files.len()).sum();
    let _ = writeln!(summary, "{} groups, {} files", groups.len(), total);

    for group in groups {
        let _ = writeln!(summary, "\nGroup: {}", group.group_name);
        let _ = writeln!(summary, "Folder: {}/ ({} files)", group.folder, group.files.len());
        for file in &group.files {
            let _ = writeln!(summary, "  - {}", file);
        }
    }
    summary
}
