use clap::Parser;
use dlm::classifier::GeminiClassifier;
use dlm::cli::{CliContext, CliError, Command, run_cli};
use dlm::config::{DlmConfig, ScanFilter};
use dlm::output::OutputFormatter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Organize a downloads directory with an AI classifier, reversibly.
#[derive(Debug, Parser)]
#[command(name = "dlm", version, about)]
struct Cli {
    #[arg(value_enum)]
    command: Command,

    /// Directory to organize
    directory: PathBuf,

    /// Files sent to the classifier per request
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,

    /// Configuration file to use instead of the default lookup
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-run analyses without asking
    #[arg(short, long)]
    yes: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = DlmConfig::load(cli.config.as_deref(), &cli.directory)?;
    let filter = ScanFilter::new(&config.scan)?;
    let batch_size = config.batch_size(cli.batch_size.map(|n| n as usize));

    let context = CliContext {
        classifier: Box::new(GeminiClassifier::new(&config.classifier, &cli.directory)),
        batch_size,
        assume_yes: cli.yes,
        prompts_dir: config.classifier.prompts_dir.clone(),
        filter,
    };

    run_cli(cli.command, &cli.directory, &context)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,dlm=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
