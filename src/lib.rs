//! dlm - a download library manager
//!
//! This library sorts the files of a directory into folders chosen by an
//! external AI classifier, records every folder it creates and every file it
//! moves in a move log, and can revert an organize run exactly from that log.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod file_organizer;
pub mod move_log;
pub mod output;
pub mod prompts;
pub mod state;
pub mod undo;

pub use classifier::{Classifier, ClassifierError, GeminiClassifier};
pub use config::{ConfigError, DlmConfig, ScanFilter};
pub use file_organizer::{FileOrganizer, MoveReport, OrganizeError, OrganizeResult};
pub use move_log::{MoveLog, MoveLogStore};
pub use undo::{RevertReport, UndoManager};

pub use cli::{CliContext, CliError, Command, run_cli};
