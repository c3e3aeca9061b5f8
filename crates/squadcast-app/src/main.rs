// squadcast entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file; stdout carries the advice)
// 3. Load config, apply CLI overrides
// 4. Build the data source, template and pipeline
// 5. Dry run: print the payload. Otherwise print the completed advice and export it.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use squadcast_app::{default_output_path, export_advice, run_pipeline, Pipeline};
use squadcast_core::config;
use squadcast_core::error::PipelineError;
use squadcast_core::upstream::HttpFplSource;
use squadcast_llm::client::LlmClient;
use squadcast_llm::prompt::load_template;

#[derive(Debug, Parser)]
#[command(name = "squadcast", version, about = "Squad advice for a Fantasy Premier League manager")]
struct Cli {
    /// Manager (entry) id, as shown in fantasy.premierleague.com/entry/<ID>/
    manager_id: String,

    /// Completion model; overrides config and SQUADCAST_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Where to save the advice (default: squadcast_recs_<ID>.md)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the rendered payload instead of calling the completion service
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("warning: logging disabled: {e:#}");
    }
    info!(manager_id = %cli.manager_id, dry_run = cli.dry_run, "squadcast starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run failed: {:#}", e);
            report(&e)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = config::load_config().map_err(PipelineError::from)?;
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    info!(model = %config.llm.model, top_k = config.analysis.top_k, "Config loaded");

    let source = HttpFplSource::new(&config.upstream)
        .map_err(|e| PipelineError::upstream("data service client", e))?;
    let template = load_template(&config.prompt)?;
    let pipeline = Pipeline::new(source, &config, template);

    if cli.dry_run {
        let payload = pipeline.render(&cli.manager_id).await?;
        println!("{payload}");
        return Ok(());
    }

    let llm = LlmClient::from_config(&config).context("failed to build completion client")?;
    eprintln!("Generating advice for manager {}...", cli.manager_id.trim());
    let text = run_pipeline(&pipeline, &llm, &cli.manager_id, |advice| {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{advice}");
        let _ = stdout.flush();
    })
    .await?;

    let path = cli.out.unwrap_or_else(|| default_output_path(&cli.manager_id));
    export_advice(&path, &text)
        .with_context(|| format!("failed to write advice to {}", path.display()))?;
    info!(path = %path.display(), "Advice exported");
    eprintln!("Saved advice to {}", path.display());
    Ok(())
}

/// Exit code and message prefix for each failure class.
fn classify(err: &anyhow::Error) -> (u8, &'static str) {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Configuration(_)) => (2, "Configuration problem"),
        Some(PipelineError::ManagerNotFound { .. }) => (3, "Manager not found"),
        Some(PipelineError::UpstreamUnavailable { .. }) => (4, "Service unavailable, try again later"),
        None => (1, "error"),
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    let (code, prefix) = classify(err);
    eprintln!("{prefix}: {err:#}");
    ExitCode::from(code)
}

/// Initialize tracing to log to a file (not the terminal, which carries the advice).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("squadcast.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("squadcast=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
