mod cmd;
mod envconfig;
mod format;
mod progress;
mod tui;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cmd::Shell;
use envconfig::Config;
use mindcare::FailurePolicy;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mindcare")]
#[command(version)]
#[command(about = "Mental health support assistant backed by a local fine-tuned model", long_about = None)]
struct Cli {
    /// Model checkpoint directory
    #[arg(short, long)]
    checkpoint: Option<PathBuf>,

    /// Ask a single question and exit
    #[arg(short, long, conflicts_with = "batch")]
    question: Option<String>,

    /// Scenario for the single question
    #[arg(short, long, requires = "question")]
    scenario: Option<String>,

    /// Maximum number of new tokens per answer
    #[arg(short, long)]
    max_tokens: Option<usize>,

    /// Batch input file (.json, .jsonl or .yaml)
    #[arg(short, long)]
    batch: Option<PathBuf>,

    /// Batch results file
    #[arg(short, long, requires = "batch")]
    output: Option<PathBuf>,

    /// Record failed batch items and continue instead of aborting
    #[arg(long, requires = "batch")]
    keep_going: bool,

    /// Save the conversation history on exit
    #[arg(long)]
    save_history: bool,

    /// History file path (implies --save-history)
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// List scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Run on the CPU even if a GPU is available
    #[arg(long)]
    cpu: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(checkpoint) = cli.checkpoint {
        config.checkpoint = checkpoint;
    }
    if let Some(max_tokens) = cli.max_tokens {
        if max_tokens == 0 {
            bail!("--max-tokens must be positive");
        }
        config.max_tokens = max_tokens;
    }

    let mut shell = Shell::new(config)?;
    shell.save_history = cli.save_history || cli.history_file.is_some();
    shell.history_file = cli.history_file;
    shell.force_cpu = cli.cpu;

    if cli.list_scenarios {
        cmd::list_scenarios(&shell.registry);
        return Ok(());
    }

    let max_tokens = shell.config.max_tokens;
    match (cli.question, cli.batch) {
        (Some(question), _) => cmd::single_shot(&shell, question, cli.scenario, max_tokens).await,
        (None, Some(input)) => {
            let policy = if cli.keep_going {
                FailurePolicy::Isolate
            } else {
                FailurePolicy::Abort
            };
            cmd::batch(&shell, &input, cli.output.as_deref(), policy).await
        }
        (None, None) => cmd::interactive(&shell, max_tokens).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
