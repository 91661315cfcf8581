//! Command dispatch for dlm.
//!
//! Each command reads or writes the state kept in `<directory>/.dlm/`:
//! - `find-*` commands scan the directory and ask the classifier, saving its answers
//! - organize commands move files according to those answers, logging every move
//! - revert commands undo a logged organize run

use crate::classifier::{self, Classifier, ClassifierError};
use crate::config::{ConfigError, ScanFilter};
use crate::file_organizer::{FileOrganizer, MoveReport, OrganizeError};
use crate::move_log::MoveLogStore;
use crate::output::OutputFormatter;
use crate::prompts::{self, PromptKind};
use crate::state::{GROUPS_FILE, IMPORTANT_LIST, STATE_DIR_NAME, StateDir, TRASH_LIST};
use crate::undo::UndoManager;
use clap::ValueEnum;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const IMPORTANT_FOLDER: &str = "important";
pub const TRASH_FOLDER: &str = "trash";

/// A dlm command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Ask the classifier which files are important
    FindImportant,
    /// Ask the classifier which files are trash
    FindTrash,
    /// Run find-important and then find-trash
    FindAll,
    /// Move important and trash files into their folders
    InitialOrganize,
    /// Undo initial-organize
    Revert,
    /// Ask the classifier to group related files
    FindGroups,
    /// Move grouped files into one folder per group
    OrganizeGroups,
    /// Undo organize-groups
    RevertGroups,
    /// Undo organize-groups, then initial-organize
    RevertAll,
}

/// Errors that end a command with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl CliError {
    fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Everything a command needs besides the directory.
pub struct CliContext {
    pub classifier: Box<dyn Classifier>,
    pub batch_size: usize,
    /// Answer "yes" to confirmation prompts.
    pub assume_yes: bool,
    pub prompts_dir: Option<PathBuf>,
    pub filter: ScanFilter,
}

/// Runs one command against `directory`.
///
/// # Errors
///
/// Returns an error for anything that must abort the command: an invalid
/// directory, a corrupt move log, a failing classifier or unusable state
/// files. Files that could not be moved or restored are reported on the
/// console and do not make the command fail. A missing move log on revert
/// is a warning, not an error.
///
/// # Examples
///
/// ```no_run
/// use dlm::classifier::GeminiClassifier;
/// use dlm::cli::{CliContext, Command, run_cli};
/// use dlm::config::{DlmConfig, ScanFilter};
/// use std::path::Path;
///
/// let dir = Path::new("/home/me/Downloads");
/// let config = DlmConfig::default();
/// let context = CliContext {
///     classifier: Box::new(GeminiClassifier::new(&config.classifier, dir)),
///     batch_size: config.batch_size(None),
///     assume_yes: false,
///     prompts_dir: None,
///     filter: ScanFilter::new(&config.scan)?,
/// };
/// run_cli(Command::FindAll, dir, &context)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_cli(command: Command, directory: &Path, context: &CliContext) -> Result<(), CliError> {
    if !directory.is_dir() {
        return Err(OrganizeError::InvalidPath {
            path: directory.to_path_buf(),
            reason: "not an existing directory".to_string(),
        }
        .into());
    }

    let state =
        StateDir::open(directory).map_err(|e| CliError::io("Cannot create", directory, e))?;
    tracing::debug!(?command, directory = %directory.display(), "running command");

    match command {
        Command::FindImportant => find_flagged(directory, &state, context, PromptKind::Important),
        Command::FindTrash => find_flagged(directory, &state, context, PromptKind::Trash),
        Command::FindAll => {
            find_flagged(directory, &state, context, PromptKind::Important)?;
            find_flagged(directory, &state, context, PromptKind::Trash)
        }
        Command::InitialOrganize => initial_organize(directory, &state),
        Command::Revert => revert(&state.move_log(), "initial organize"),
        Command::FindGroups => find_groups(directory, &state, context),
        Command::OrganizeGroups => organize_groups(directory, &state),
        Command::RevertGroups => revert(&state.group_move_log(), "group organize"),
        Command::RevertAll => {
            revert(&state.group_move_log(), "group organize")?;
            revert(&state.move_log(), "initial organize")
        }
    }
}

/// Files found by `scan_directory`.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    /// Names offered to the classifier, sorted.
    pub names: Vec<String>,
    /// Files skipped because their name is not valid UTF-8.
    pub unreadable_names: usize,
}

/// Lists the first-level regular files of `directory` accepted by `filter`.
///
/// Names that are not valid UTF-8 cannot be sent to the classifier and
/// matched back exactly, so they are skipped and counted.
pub fn scan_directory(directory: &Path, filter: &ScanFilter) -> io::Result<DirectoryScan> {
    let mut scan = DirectoryScan::default();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if let Ok(file_type) = entry.file_type()
            && file_type.is_file()
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!(file = %raw.to_string_lossy(), "skipping non UTF-8 file name");
                    scan.unreadable_names += 1;
                    continue;
                }
            };
            if filter.should_include(&name) {
                scan.names.push(name);
            } else {
                tracing::debug!(file = %name, "excluded by scan rules");
            }
        }
    }

    scan.names.sort();
    Ok(scan)
}

/// Scans the directory for a `find-*` command and reports skipped names.
fn scan_for_analysis(directory: &Path, context: &CliContext) -> Result<Vec<String>, CliError> {
    let scan = scan_directory(directory, &context.filter)
        .map_err(|e| CliError::io("Cannot read", directory, e))?;

    if scan.unreadable_names > 0 {
        OutputFormatter::warning(&format!(
            "Skipped {} files whose names are not valid UTF-8",
            scan.unreadable_names
        ));
    }
    Ok(scan.names)
}

fn load_template(context: &CliContext, kind: PromptKind) -> Result<String, CliError> {
    prompts::load_template(context.prompts_dir.as_deref(), kind).map_err(|e| {
        let dir = context.prompts_dir.as_deref().unwrap_or(Path::new(""));
        CliError::io("Cannot read prompt template", &dir.join(kind.file_name()), e)
    })
}

fn find_flagged(
    directory: &Path,
    state: &StateDir,
    context: &CliContext,
    kind: PromptKind,
) -> Result<(), CliError> {
    let Some(list_name) = kind.list_name() else {
        return find_groups(directory, state, context);
    };
    let list_path = state.file(list_name);

    OutputFormatter::header(&format!("Finding {} files", kind.flag()));
    if list_path.exists()
        && !confirm(
            &format!("{} already exists. Run the analysis again?", list_name),
            context.assume_yes,
        )
    {
        OutputFormatter::info(&format!("Keeping {}", list_path.display()));
        return Ok(());
    }

    let names = scan_for_analysis(directory, context)?;
    let flagged = if names.is_empty() {
        OutputFormatter::warning("No files to analyze");
        Vec::new()
    } else {
        let template = load_template(context, kind)?;
        OutputFormatter::info(&format!(
            "Analyzing {} files in batches of {}",
            names.len(),
            context.batch_size
        ));
        classifier::classify_in_batches(
            context.classifier.as_ref(),
            directory,
            &names,
            &template,
            kind.flag(),
            context.batch_size,
        )?
    };

    state
        .save_list(list_name, &flagged)
        .map_err(|e| CliError::io("Cannot write", &list_path, e))?;
    OutputFormatter::success(&format!(
        "Found {} {} files, saved to {}",
        flagged.len(),
        kind.flag(),
        list_path.display()
    ));
    Ok(())
}

fn find_groups(directory: &Path, state: &StateDir, context: &CliContext) -> Result<(), CliError> {
    let groups_path = state.file(GROUPS_FILE);

    OutputFormatter::header("Finding groups of related files");
    if groups_path.exists()
        && !confirm(
            "groups.json already exists. Run the analysis again?",
            context.assume_yes,
        )
    {
        OutputFormatter::info(&format!("Keeping {}", groups_path.display()));
        return Ok(());
    }

    let names = scan_for_analysis(directory, context)?;
    if names.is_empty() {
        OutputFormatter::warning("No files to analyze");
        return Ok(());
    }

    let template = load_template(context, PromptKind::Groups)?;
    let groups = classifier::group_in_batches(
        context.classifier.as_ref(),
        directory,
        &names,
        &template,
        context.batch_size,
    )?;

    state
        .save_groups(&groups)
        .map_err(|e| CliError::io("Cannot write", &groups_path, e))?;

    let grouped: usize = groups.iter().map(|g| g.files.len()).sum();
    OutputFormatter::success(&format!(
        "Found {} groups covering {} files, saved to {}",
        groups.len(),
        grouped,
        groups_path.display()
    ));
    for group in &groups {
        OutputFormatter::plain(&format!(
            "  {} -> {}/ ({} files)",
            group.group_name,
            group.folder,
            group.files.len()
        ));
    }
    Ok(())
}

fn initial_organize(directory: &Path, state: &StateDir) -> Result<(), CliError> {
    let important = state
        .load_list(IMPORTANT_LIST)
        .map_err(|e| CliError::io("Cannot read", &state.file(IMPORTANT_LIST), e))?;
    let trash = state
        .load_list(TRASH_LIST)
        .map_err(|e| CliError::io("Cannot read", &state.file(TRASH_LIST), e))?;

    if important.is_empty() && trash.is_empty() {
        OutputFormatter::warning(
            "No important or trash files recorded. Run find-important or find-trash first.",
        );
        return Ok(());
    }

    // Anything also marked important stays out of the trash.
    let keep: HashSet<&str> = important.iter().map(String::as_str).collect();
    let trash: Vec<String> = trash
        .into_iter()
        .filter(|name| !keep.contains(name.as_str()))
        .collect();

    OutputFormatter::header("Organizing files");
    let log = state.move_log();
    let mut total = MoveReport::default();

    for (folder, files) in [(IMPORTANT_FOLDER, &important), (TRASH_FOLDER, &trash)] {
        if files.is_empty() {
            continue;
        }
        let report =
            FileOrganizer::move_files_to_dir(directory, files.as_slice(), folder, Some(&log))?;
        OutputFormatter::move_summary(folder, &report);
        total.merge(report);
    }

    finish_organize(directory, &total, "revert");
    Ok(())
}

fn organize_groups(directory: &Path, state: &StateDir) -> Result<(), CliError> {
    let groups_path = state.file(GROUPS_FILE);
    let Some(groups) = state
        .load_groups()
        .map_err(|e| CliError::io("Cannot read", &groups_path, e))?
    else {
        OutputFormatter::warning("No groups found. Run find-groups first.");
        return Ok(());
    };

    OutputFormatter::header("Organizing groups");
    let log = state.group_move_log();
    let mut total = MoveReport::default();

    for group in &groups {
        if group.files.is_empty() {
            continue;
        }
        if group.folder == STATE_DIR_NAME {
            OutputFormatter::warning(&format!(
                "Skipping group '{}': {} is reserved for dlm",
                group.group_name, STATE_DIR_NAME
            ));
            continue;
        }

        OutputFormatter::info(&format!("Processing group: {}", group.group_name));
        let report = FileOrganizer::move_files_to_dir(
            directory,
            group.files.as_slice(),
            &group.folder,
            Some(&log),
        )?;
        OutputFormatter::move_summary(&group.folder, &report);
        total.merge(report);
    }

    finish_organize(directory, &total, "revert-groups");
    Ok(())
}

fn finish_organize(directory: &Path, total: &MoveReport, revert_command: &str) {
    tracing::info!(
        moved = total.moved.len(),
        not_found = total.not_found.len(),
        errors = total.errors.len(),
        "organize finished"
    );
    if !total.moved.is_empty() {
        OutputFormatter::info(&format!(
            "Use 'dlm {} {}' to undo.",
            revert_command,
            directory.display()
        ));
    }
}

fn revert(log: &MoveLogStore, label: &str) -> Result<(), CliError> {
    OutputFormatter::header(&format!("Reverting {}", label));

    match UndoManager::revert_moves(log) {
        Ok(report) => {
            OutputFormatter::revert_summary(&report);
            Ok(())
        }
        Err(OrganizeError::MissingLog { .. }) => {
            OutputFormatter::warning(&format!("Nothing to revert: no {} log found", label));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Asks a yes/no question on stdin. Anything but "y" or "yes" means no.
fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }

    print!("{} (y/N) ", question);
    let _ = io::stdout().flush();

    let mut answer = String::new();
    match io::stdin().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_lists_sorted_first_level_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for name in ["b.pdf", "a.zip", ".hidden"] {
            fs::write(temp_dir.path().join(name), "x").expect("Failed to write file");
        }
        fs::create_dir(temp_dir.path().join("folder")).expect("Failed to create dir");
        fs::write(temp_dir.path().join("folder/nested.txt"), "x").expect("Failed to write file");

        let scan = scan_directory(temp_dir.path(), &ScanFilter::default()).expect("scan failed");
        assert_eq!(scan.names, vec!["a.zip".to_string(), "b.pdf".to_string()]);
        assert_eq!(scan.unreadable_names, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let latin1 = temp_dir.path().join(OsStr::from_bytes(b"caf\xe9.txt"));
        if fs::write(&latin1, "x").is_err() {
            // APFS rejects non UTF-8 names.
            return;
        }
        fs::write(temp_dir.path().join("menu.txt"), "x").expect("Failed to write file");

        let scan = scan_directory(temp_dir.path(), &ScanFilter::default()).expect("scan failed");

        assert_eq!(scan.names, vec!["menu.txt".to_string()]);
        assert_eq!(scan.unreadable_names, 1);
        assert!(latin1.exists());
    }

    #[test]
    fn test_confirm_with_assume_yes() {
        assert!(confirm("Run again?", true));
    }

    #[test]
    fn test_command_names() {
        let names: Vec<String> = Command::value_variants()
            .iter()
            .filter_map(|c| c.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "find-important",
                "find-trash",
                "find-all",
                "initial-organize",
                "revert",
                "find-groups",
                "organize-groups",
                "revert-groups",
                "revert-all",
            ]
        );
    }
}
