use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use intervue_core::{
    Overrides, Pipeline, PipelineError, PipelineOptions, Provider, QuestionSet, Services,
    Settings, format_batch_readable, format_item_readable,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, ValueEnum)]
enum CliProvider {
    Ollama,
    Openai,
    Grok,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Ollama => Provider::Ollama,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
        }
    }
}

#[derive(Parser)]
#[command(name = "intervue")]
#[command(about = "Transcribe, score and check the attention of recorded interview answers")]
struct Cli {
    /// INI config file (defaults to ./intervue.ini, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Question dataset JSON
    #[arg(long, global = true)]
    questions: Option<PathBuf>,

    /// Rubric JSON keyed by question id, overrides inline rubrics
    #[arg(long, global = true)]
    rubric: Option<PathBuf>,

    /// Whisper ggml model file (downloaded when missing)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Base URL of the face landmark service
    #[arg(long, global = true)]
    landmark_url: Option<String>,

    /// AI provider for answer evaluation
    #[arg(long, global = true)]
    provider: Option<CliProvider>,

    /// Model name passed to the provider
    #[arg(long, global = true)]
    llm_model: Option<String>,

    /// Chat endpoint URL, overrides the provider default
    #[arg(long, global = true)]
    llm_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one video
    Single {
        /// Video file
        video: PathBuf,

        /// Question ID (otherwise taken from the trailing number in the filename)
        #[arg(short, long)]
        question_id: Option<u32>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Process every question_<id> video in a directory
    Batch {
        /// Directory with question_<id>.<ext> videos
        dir: PathBuf,

        /// Videos processed at the same time
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Per-video time limit in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Skip LLM evaluation
    #[arg(long)]
    no_eval: bool,

    /// Print JSON instead of the readable report
    #[arg(long)]
    json: bool,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn done(msg: impl std::fmt::Display, started: Instant) -> String {
    format!(
        "{} {} {}",
        style("✓").green().bold(),
        msg,
        style(format!("[{}]", format_duration(started.elapsed()))).dim()
    )
}

extern "C" fn whisper_log_callback(
    _level: u32,
    _message: *const std::ffi::c_char,
    _user_data: *mut std::ffi::c_void,
) {
    // silent
}

/// Logs go to stderr so `--json` output on stdout stays clean.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intervue=info,intervue_core=info"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            let client_error = e
                .downcast_ref::<PipelineError>()
                .is_some_and(PipelineError::is_client_error);
            if client_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (concurrency, timeout_secs, output) = match &cli.command {
        Command::Single { output, .. } => (None, None, output),
        Command::Batch {
            concurrency,
            timeout_secs,
            output,
            ..
        } => (*concurrency, *timeout_secs, output),
    };
    let evaluate = !output.no_eval;

    let overrides = Overrides {
        questions: cli.questions.clone(),
        rubric: cli.rubric.clone(),
        model: cli.model.clone(),
        landmark_url: cli.landmark_url.clone(),
        provider: cli.provider.clone().map(Provider::from),
        llm_model: cli.llm_model.clone(),
        llm_url: cli.llm_url.clone(),
        item_timeout_secs: timeout_secs,
        max_concurrency: concurrency,
    };
    let settings = Settings::load(cli.config.as_deref(), overrides)?;

    eprintln!(
        "\n{}  {}\n",
        style("intervue").cyan().bold(),
        style("Interview Answer Analyzer").dim()
    );

    let step_start = Instant::now();
    let questions = QuestionSet::load(&settings.questions_path, settings.rubric_path.as_deref())?;
    eprintln!(
        "{}",
        done(format!("Loaded {} questions", questions.len()), step_start)
    );

    let step_start = Instant::now();
    let spinner = create_spinner("Loading models...");
    let services = match Services::from_settings(&settings, evaluate).await {
        Ok(services) => services,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };
    let backend = if evaluate {
        settings.provider.name()
    } else {
        "evaluation off"
    };
    spinner.finish_with_message(done(format!("Models ready ({})", backend), step_start));

    let pipeline = Pipeline::new(
        services,
        Arc::new(questions),
        PipelineOptions::from(&settings),
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining work");
            on_ctrl_c.cancel();
        }
    });

    eprintln!("{}", style("─".repeat(60)).dim());
    let total_start = Instant::now();

    let (readable, json) = match &cli.command {
        Command::Single {
            video, question_id, ..
        } => {
            let spinner = create_spinner(&format!("Processing {}...", video.display()));
            let result = pipeline
                .process_single(video, *question_id, evaluate, &cancel)
                .await;
            spinner.finish_and_clear();
            let item = result?;
            eprintln!("{}", done(format!("Processed {}", item.source), total_start));
            (
                format_item_readable(&item),
                serde_json::to_string_pretty(&item)?,
            )
        }
        Command::Batch { dir, .. } => {
            let spinner = create_spinner(&format!("Processing {}...", dir.display()));
            let result = pipeline.process_batch(dir, evaluate, &cancel).await;
            spinner.finish_and_clear();
            let batch = result?;
            let aborted = batch
                .results
                .iter()
                .filter(|r| r.item_error.is_some())
                .count();
            eprintln!(
                "{}",
                done(
                    format!(
                        "Processed {} videos, {} skipped, {} not completed",
                        batch.results.len(),
                        batch.skipped.len(),
                        aborted
                    ),
                    total_start
                )
            );
            (
                format_batch_readable(&batch),
                serde_json::to_string_pretty(&batch)?,
            )
        }
    };

    eprintln!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    if let Some(path) = &output.output {
        save_json(path, &json).await?;
        eprintln!("{} {}", style("Saved:").dim(), style(path.display()).cyan());
    }

    if output.json {
        println!("{}", json);
    } else {
        eprintln!("{}", style("─".repeat(60)).dim());
        println!("{}", readable);
    }

    Ok(())
}

async fn save_json(path: &Path, json: &str) -> Result<()> {
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
