use crate::envconfig::Config;
use crate::progress::{Bar, Progress};
use crate::tui::TerminalConsole;
use anyhow::{Context, Result};
use mindcare::app::batch::load_requests;
use mindcare::core::device::process_profile;
use mindcare::{
    BatchRequest, BatchRunner, CandleEngine, ConversationHistory, ConversationSession, Engine,
    FailurePolicy, HistoryStore, InteractiveController, ScenarioRegistry,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// Settings shared by every mode once config and flags are merged.
pub struct Shell {
    pub config: Config,
    pub registry: Arc<ScenarioRegistry>,
    pub save_history: bool,
    pub history_file: Option<PathBuf>,
    pub force_cpu: bool,
}

impl Shell {
    pub fn new(config: Config) -> Result<Self> {
        let default = config.default_scenario()?;
        Ok(Self {
            config,
            registry: Arc::new(ScenarioRegistry::new(default)),
            save_history: false,
            history_file: None,
            force_cpu: false,
        })
    }

    fn store(&self) -> HistoryStore {
        HistoryStore::new(&self.config.output_dir)
    }
}

enum Outcome<T> {
    Done(T),
    Interrupted,
}

/// Runs blocking work on the blocking pool and races it against Ctrl-C.
async fn interruptible<T, F>(work: F) -> Result<Outcome<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);

    tokio::select! {
        joined = handle => Ok(Outcome::Done(joined.context("worker thread panicked")?)),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            Ok(Outcome::Interrupted)
        }
    }
}

fn exit_interrupted(shell: &Shell, history: &ConversationHistory) -> ! {
    eprintln!("\nInterrupted.");
    tracing::warn!(turns = history.len(), "interrupted during generation");

    if let Err(e) = save_history(shell, history) {
        eprintln!("Error: {:#}", e);
    }
    process::exit(130);
}

fn save_history(shell: &Shell, history: &ConversationHistory) -> Result<()> {
    if !shell.save_history || history.is_empty() {
        return Ok(());
    }

    let path = shell
        .store()
        .save_history(&history.snapshot(), shell.history_file.as_deref())
        .context("failed to save conversation history")?;
    println!("Conversation history saved to {}", path.display());
    Ok(())
}

async fn load_session(shell: &Shell) -> Result<ConversationSession<CandleEngine>> {
    let checkpoint = shell.config.checkpoint.clone();
    let sampling = shell.config.sampling.clone();
    let force_cpu = shell.force_cpu;
    let max_capability = shell.config.max_capability;

    let mut progress = Progress::new();
    progress.spinner(&format!("Loading model from {}...", checkpoint.display()));

    let loaded = interruptible(move || {
        let profile = process_profile(force_cpu, max_capability);
        CandleEngine::load(&checkpoint, &profile, &sampling)
    })
    .await?;
    progress.stop_and_clear();

    let engine = match loaded {
        Outcome::Done(engine) => engine?,
        Outcome::Interrupted => {
            eprintln!("\nInterrupted.");
            process::exit(130);
        }
    };

    Ok(ConversationSession::new(engine, shell.registry.clone()))
}

pub fn list_scenarios(registry: &ScenarioRegistry) {
    println!("Available scenarios:");
    for def in registry.list() {
        let marker = if def.id == registry.default_scenario() {
            " (default)"
        } else {
            ""
        };
        println!("  {:<22}{}{}", def.id.key(), def.label, marker);
    }
}

pub async fn single_shot(
    shell: &Shell,
    question: String,
    scenario: Option<String>,
    max_tokens: usize,
) -> Result<()> {
    let session = load_session(shell).await?;
    answer(shell, session, question, scenario, max_tokens).await
}

/// Prints the answer on success, saves history either way, then reports the
/// engine failure ahead of any save failure.
async fn answer<E>(
    shell: &Shell,
    mut session: ConversationSession<E>,
    question: String,
    scenario: Option<String>,
    max_tokens: usize,
) -> Result<()>
where
    E: Engine + Send + 'static,
{
    let history = session.history().clone();
    let scenario = scenario.unwrap_or_else(|| shell.registry.default_scenario().key().to_string());

    let outcome = interruptible(move || session.ask(&question, &scenario, max_tokens)).await?;
    let answer = match outcome {
        Outcome::Done(answer) => answer,
        Outcome::Interrupted => exit_interrupted(shell, &history),
    };

    if let Ok(answer) = &answer {
        println!("{}", answer.trim());
    }
    let saved = save_history(shell, &history);
    answer.context("failed to answer question")?;
    saved
}

pub async fn batch(
    shell: &Shell,
    input: &Path,
    output: Option<&Path>,
    policy: FailurePolicy,
) -> Result<()> {
    let requests = load_requests(input)
        .with_context(|| format!("failed to read batch file {}", input.display()))?;
    println!("Loaded {} questions from {}", requests.len(), input.display());

    let session = load_session(shell).await?;
    process_batch(shell, session, requests, output, policy).await
}

async fn process_batch<E>(
    shell: &Shell,
    mut session: ConversationSession<E>,
    requests: Vec<BatchRequest>,
    output: Option<&Path>,
    policy: FailurePolicy,
) -> Result<()>
where
    E: Engine + Send + 'static,
{
    let history = session.history().clone();
    let default_max_tokens = shell.config.max_tokens;

    let outcome = interruptible(move || {
        let mut bar = Bar::new(requests.len());
        let results = BatchRunner::new(&mut session, default_max_tokens)
            .policy(policy)
            .run_with(&requests, |event| bar.update(event));
        bar.finish();
        results.map(|results| (results, bar.failed()))
    })
    .await?;

    let outcome = match outcome {
        Outcome::Done(outcome) => outcome,
        Outcome::Interrupted => exit_interrupted(shell, &history),
    };

    let (results, failed) = match outcome {
        Ok(done) => done,
        Err(e) => {
            if let Err(save_err) = save_history(shell, &history) {
                eprintln!("Error: {:#}", save_err);
            }
            return Err(anyhow::Error::new(e).context("batch processing failed"));
        }
    };

    let written = shell.store().save_results(&results, output);
    let saved = save_history(shell, &history);

    let path = written.context("failed to save batch results")?;
    println!(
        "Processed {} questions ({} failed). Results saved to {}",
        results.len(),
        failed,
        path.display()
    );
    saved
}

pub async fn interactive(shell: &Shell, max_tokens: usize) -> Result<()> {
    let mut session = load_session(shell).await?;
    let history = session.history().clone();

    let outcome = interruptible(move || -> Result<()> {
        let mut console = TerminalConsole::new()?;
        InteractiveController::new(&mut session, max_tokens).run(&mut console);
        Ok(())
    })
    .await?;

    match outcome {
        Outcome::Done(result) => result?,
        Outcome::Interrupted => exit_interrupted(shell, &history),
    }

    save_history(shell, &history)
}
