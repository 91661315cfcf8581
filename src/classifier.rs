//! The external classifier and the batching around it.
//!
//! dlm never decides on its own which files matter. It sends file names in
//! batches to a `Classifier` and acts on the answers. The production
//! classifier runs the `gemini` command line tool; tests plug in a fake.

use crate::config::ClassifierSettings;
use crate::output::OutputFormatter;
use crate::prompts;
use crate::state::STATE_DIR_NAME;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Errors reported by a classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to run classifier '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Unusable classifier response: {0}")]
    InvalidResponse(String),
}

/// Related files that belong in one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGroup {
    /// Human readable name given by the classifier.
    pub group_name: String,
    /// Folder (a single path segment) the files are moved into.
    pub folder: String,
    pub files: Vec<String>,
}

impl FileGroup {
    pub fn new(
        group_name: impl Into<String>,
        folder: impl Into<String>,
        files: Vec<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            folder: folder.into(),
            files,
        }
    }
}

/// Sorts file names into categories.
pub trait Classifier {
    /// Returns the names from `file_names` that carry `flag` (e.g. "important").
    fn classify(
        &self,
        file_names: &[String],
        prompt: &str,
        flag: &str,
    ) -> Result<Vec<String>, ClassifierError>;

    /// Returns the groups found among `file_names`. Ungrouped files are left out.
    fn classify_groups(
        &self,
        file_names: &[String],
        prompt: &str,
    ) -> Result<Vec<FileGroup>, ClassifierError>;
}

/// Classifier backed by the `gemini` command line tool.
pub struct GeminiClassifier {
    program: String,
    args: Vec<String>,
    directory: PathBuf,
}

impl GeminiClassifier {
    pub fn new(settings: &ClassifierSettings, directory: &Path) -> Self {
        Self {
            program: settings.command.clone(),
            args: settings.args.clone(),
            directory: directory.to_path_buf(),
        }
    }

    /// Runs the tool once and returns its standard output.
    fn ask(&self, prompt: &str) -> Result<String, ClassifierError> {
        tracing::debug!(program = %self.program, prompt_len = prompt.len(), "calling classifier");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--prompt")
            .arg(prompt)
            .arg("--include-directories")
            .arg(&self.directory)
            .output()
            .map_err(|source| ClassifierError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClassifierError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Classifier for GeminiClassifier {
    fn classify(
        &self,
        _file_names: &[String],
        prompt: &str,
        flag: &str,
    ) -> Result<Vec<String>, ClassifierError> {
        parse_flagged(&self.ask(prompt)?, flag)
    }

    fn classify_groups(
        &self,
        _file_names: &[String],
        prompt: &str,
    ) -> Result<Vec<FileGroup>, ClassifierError> {
        parse_groups(&self.ask(prompt)?)
    }
}

#[derive(Debug, Deserialize)]
struct FlagAnswer {
    file_analysis: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GroupAnswer {
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    group_name: String,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    suggested_folder: Option<String>,
}

/// Reads `{"file_analysis": [{"filename": .., "<flag>": true}]}`.
pub fn parse_flagged(response: &str, flag: &str) -> Result<Vec<String>, ClassifierError> {
    let answer: FlagAnswer = extract_json(response)?;

    Ok(answer
        .file_analysis
        .iter()
        .filter(|entry| entry.get(flag).and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|entry| entry.get("filename").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Reads `{"groups": [{"group_name", "files", "suggested_folder"}]}`.
///
/// The folder is the last component of `suggested_folder`. Groups without a
/// suggested folder stay where they are and are left out, and so are groups
/// that would land in the `.dlm` state directory.
pub fn parse_groups(response: &str) -> Result<Vec<FileGroup>, ClassifierError> {
    let answer: GroupAnswer = extract_json(response)?;
    let mut groups = Vec::new();

    for group in answer.groups {
        let folder = group
            .suggested_folder
            .as_deref()
            .and_then(|s| Path::new(s.trim()).file_name())
            .map(|n| n.to_string_lossy().to_string());

        match folder {
            Some(folder) if folder == STATE_DIR_NAME => {
                tracing::debug!(group = %group.group_name, "group targets the state directory");
            }
            Some(folder) => groups.push(FileGroup::new(group.group_name, folder, group.files)),
            None => {
                tracing::debug!(group = %group.group_name, "group has no folder");
            }
        }
    }

    Ok(groups)
}

/// Extracts and parses JSON from a model answer.
///
/// Handles a bare JSON document, Markdown code fences, and prose around the
/// outermost `{ ... }` object.
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T, ClassifierError> {
    let trimmed = response.trim();

    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Ok(parsed);
    }

    let cleaned = strip_code_fence(trimmed);
    if let Ok(parsed) = serde_json::from_str::<T>(cleaned) {
        return Ok(parsed);
    }

    for candidate in [cleaned, trimmed] {
        if let Some(object) = find_json_object(candidate) {
            return serde_json::from_str::<T>(object)
                .map_err(|e| ClassifierError::InvalidResponse(e.to_string()));
        }
    }

    Err(ClassifierError::InvalidResponse(format!(
        "no JSON object found in: {}...",
        trimmed.chars().take(200).collect::<String>()
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.trim().strip_suffix("```").unwrap_or(text).trim()
}

/// Finds the outermost `{ ... }` by brace counting, ignoring braces in strings.
fn find_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Classifies `file_names` in batches and returns the flagged names.
///
/// Batches run one after another. A name that already appeared in an earlier
/// batch keeps the verdict it got first, so later batches cannot add it.
/// The result has no duplicates and keeps first-seen order.
pub fn classify_in_batches(
    classifier: &dyn Classifier,
    directory: &Path,
    file_names: &[String],
    template: &str,
    flag: &str,
    batch_size: usize,
) -> Result<Vec<String>, ClassifierError> {
    let mut decided: HashSet<String> = HashSet::new();
    let mut flagged = Vec::new();

    run_batches(file_names, batch_size, |batch| {
        let prompt = prompts::render(template, directory, batch);
        let answer = classifier.classify(batch, &prompt, flag)?;

        for name in answer {
            if decided.insert(name.clone()) {
                flagged.push(name);
            } else {
                tracing::debug!(file = %name, "ignoring verdict from a later batch");
            }
        }
        decided.extend(batch.iter().cloned());
        Ok(())
    })?;

    Ok(flagged)
}

/// Groups `file_names` in batches.
///
/// A file keeps the first group it was put in; later assignments, from the
/// same batch or a later one, are ignored. Groups with the same folder are
/// merged across batches and keep the name they were first seen with.
pub fn group_in_batches(
    classifier: &dyn Classifier,
    directory: &Path,
    file_names: &[String],
    template: &str,
    batch_size: usize,
) -> Result<Vec<FileGroup>, ClassifierError> {
    let mut decided: HashSet<String> = HashSet::new();
    let mut groups: Vec<FileGroup> = Vec::new();
    let mut by_folder: HashMap<String, usize> = HashMap::new();

    run_batches(file_names, batch_size, |batch| {
        let prompt = prompts::render(template, directory, batch);
        let answer = classifier.classify_groups(batch, &prompt)?;

        for group in answer {
            for name in group.files {
                if !decided.insert(name.clone()) {
                    tracing::debug!(file = %name, group = %group.folder, "file already grouped");
                    continue;
                }
                let index = *by_folder.entry(group.folder.clone()).or_insert_with(|| {
                    groups.push(FileGroup::new(&*group.group_name, &*group.folder, Vec::new()));
                    groups.len() - 1
                });
                groups[index].files.push(name);
            }
        }
        decided.extend(batch.iter().cloned());
        Ok(())
    })?;

    Ok(groups)
}

fn run_batches(
    file_names: &[String],
    batch_size: usize,
    mut handle: impl FnMut(&[String]) -> Result<(), ClassifierError>,
) -> Result<(), ClassifierError> {
    let batch_size = batch_size.max(1);
    let total = file_names.len().div_ceil(batch_size);
    let progress = OutputFormatter::create_progress_bar(total as u64);

    for (index, batch) in file_names.chunks(batch_size).enumerate() {
        progress.set_message(format!(
            "batch {}/{} ({} files)",
            index + 1,
            total,
            batch.len()
        ));
        if let Err(e) = handle(batch) {
            progress.abandon();
            return Err(e);
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(())
}
