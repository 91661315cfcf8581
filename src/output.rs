//! Output formatting and styling module.
//!
//! All user-facing CLI output goes through here: colored status lines, the
//! progress bar shown while batches are classified, and the summaries printed
//! after moves and reverts. Diagnostics for developers go through `tracing`.

use crate::file_organizer::MoveReport;
use crate::undo::RevertReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dlm::output::OutputFormatter;
    /// OutputFormatter::success("Moved 12 files to 'important/'");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar counting classifier batches.
    ///
    /// ```no_run
    /// use dlm::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(4);
    /// pb.set_message("batch 1/4 (100 files)");
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints what a move step did, listing every file that was not moved.
    pub fn move_summary(folder: &str, report: &MoveReport) {
        let moved = report.moved.len();
        Self::success(&format!(
            "Moved {} {} to '{}/'",
            moved,
            plural(moved, "file", "files"),
            folder
        ));

        if !report.not_found.is_empty() {
            Self::warning(&format!("Not found: {}", report.not_found.len()));
            for name in &report.not_found {
                println!("    - {}", name);
            }
        }

        if !report.errors.is_empty() {
            Self::warning(&format!("Errors: {}", report.errors.len()));
            for failure in &report.errors {
                eprintln!("    - {}: {}", failure.filename, failure.reason.red());
            }
        }
    }

    /// Prints the counts of a revert and every item it left behind.
    pub fn revert_summary(report: &RevertReport) {
        Self::success(&format!(
            "Reverted {} {}",
            report.reverted,
            plural(report.reverted, "file", "files")
        ));
        Self::success(&format!(
            "Removed {} {}",
            report.folders_removed,
            plural(report.folders_removed, "folder", "folders")
        ));

        if !report.not_found.is_empty() {
            Self::warning(&format!("Items not found: {}", report.not_found.len()));
            for path in &report.not_found {
                println!("    - {}", path.display());
            }
        }

        if !report.errors.is_empty() {
            Self::warning(&format!("Errors: {}", report.errors.len()));
            for failure in &report.errors {
                eprintln!("    - {}: {}", failure.item.display(), failure.reason.red());
            }
        }

        if !report.is_complete_success() {
            Self::warning("The move log was kept; fix the issues above and revert again.");
        }
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "file", "files"), "file");
        assert_eq!(plural(0, "file", "files"), "files");
        assert_eq!(plural(3, "folder", "folders"), "folders");
    }
}
