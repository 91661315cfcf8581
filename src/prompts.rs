//! Prompt templates for the classifier.
//!
//! Templates contain two placeholders: `{directory}` and `{files_list}`.
//! Built-in templates can be replaced by text files in a prompts directory.

use crate::state::{IMPORTANT_LIST, TRASH_LIST};
use std::fs;
use std::io;
use std::path::Path;

/// The questions dlm asks the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Important,
    Trash,
    Groups,
}

impl PromptKind {
    /// File name of the override template for this kind.
    pub fn file_name(&self) -> &'static str {
        match self {
            PromptKind::Important => "important_files.txt",
            PromptKind::Trash => "trash_files.txt",
            PromptKind::Groups => "group_analysis.txt",
        }
    }

    /// Key that marks a file in a flag answer (`"important": true`).
    pub fn flag(&self) -> &'static str {
        match self {
            PromptKind::Important => "important",
            PromptKind::Trash => "trash",
            PromptKind::Groups => "group",
        }
    }

    /// State file holding the answers to a flag question. Groups have none.
    pub fn list_name(&self) -> Option<&'static str> {
        match self {
            PromptKind::Important => Some(IMPORTANT_LIST),
            PromptKind::Trash => Some(TRASH_LIST),
            PromptKind::Groups => None,
        }
    }

    pub fn builtin(&self) -> &'static str {
        match self {
            PromptKind::Important => IMPORTANT_PROMPT,
            PromptKind::Trash => TRASH_PROMPT,
            PromptKind::Groups => GROUP_PROMPT,
        }
    }
}

const IMPORTANT_PROMPT: &str = r#"You are reviewing a downloads directory: {directory}

Decide for each file below whether it is IMPORTANT: personal documents, contracts,
invoices, tax papers, certificates, identity documents, original photos, or
anything that would be costly to lose. Installers, duplicates and throwaway
downloads are not important.

FILES:
{files_list}

Respond with ONLY valid JSON in this exact format:
{
  "file_analysis": [
    {"filename": "<exact file name>", "important": true, "reason": "<short reason>"}
  ]
}"#;

const TRASH_PROMPT: &str = r#"You are reviewing the contents of a downloads directory: {directory}

Decide for each file below whether it is clearly TRASH and safe to delete:
installers already used, partial downloads, temporary files, obvious duplicates
such as "file (1).pdf", and cache or log files. When unsure, it is not trash.

FILES:
{files_list}

Respond with ONLY valid JSON in this exact format:
{
  "file_analysis": [
    {"filename": "<exact file name>", "trash": true, "reason": "<short reason>"}
  ]
}"#;

const GROUP_PROMPT: &str = r#"You are organizing a downloads directory: {directory}

Group the files below by what they belong to (a project, a trip, a course, a
kind of document). Suggest one short folder name per group. Files that do not
belong to any clear group must be left out.

FILES:
{files_list}

Respond with ONLY valid JSON in this exact format:
{
  "groups": [
    {
      "group_name": "<human readable name>",
      "suggested_folder": "<folder-name>",
      "files": ["<exact file name>"]
    }
  ]
}"#;

/// Returns the template for `kind`, preferring `<prompts_dir>/<file_name>`.
pub fn load_template(prompts_dir: Option<&Path>, kind: PromptKind) -> io::Result<String> {
    if let Some(dir) = prompts_dir {
        let path = dir.join(kind.file_name());
        if path.exists() {
            tracing::debug!(template = %path.display(), "using prompt override");
            return fs::read_to_string(path);
        }
    }
    Ok(kind.builtin().to_string())
}

/// Fills the placeholders of a template.
pub fn render<S: AsRef<str>>(template: &str, directory: &Path, file_names: &[S]) -> String {
    let files_list = file_names
        .iter()
        .map(|name| format!("- {}", name.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{directory}", &directory.display().to_string())
        .replace("{files_list}", &files_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_fills_placeholders() {
        let prompt = render(
            "dir={directory}\n{files_list}",
            Path::new("/downloads"),
            &["a.pdf", "b.zip"],
        );
        assert_eq!(prompt, "dir=/downloads\n- a.pdf\n- b.zip");
    }

    #[test]
    fn test_list_names() {
        assert_eq!(PromptKind::Important.list_name(), Some("important_files.txt"));
        assert_eq!(PromptKind::Trash.list_name(), Some("trash_files.txt"));
        assert_eq!(PromptKind::Groups.list_name(), None);
    }

    #[test]
    fn test_builtin_templates_have_placeholders() {
        for kind in [PromptKind::Important, PromptKind::Trash, PromptKind::Groups] {
            let template = kind.builtin();
            assert!(template.contains("{directory}"));
            assert!(template.contains("{files_list}"));
        }
    }

    #[test]
    fn test_override_template_is_preferred() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("trash_files.txt"), "custom {files_list}")
            .expect("Failed to write template");

        let trash = load_template(Some(temp_dir.path()), PromptKind::Trash).expect("load failed");
        let important =
            load_template(Some(temp_dir.path()), PromptKind::Important).expect("load failed");

        assert_eq!(trash, "custom {files_list}");
        assert_eq!(important, PromptKind::Important.builtin());
    }
}
