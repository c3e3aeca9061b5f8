// Pipeline orchestration: aggregate, derive, render, complete.
//
// One invocation handles one manager. Nothing is cached between
// invocations.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

use squadcast_core::aggregator::{Aggregator, ManagerId};
use squadcast_core::analysis::{AnalysisOptions, Assembler};
use squadcast_core::config::Config;
use squadcast_core::error::PipelineError;
use squadcast_core::upstream::FplSource;
use squadcast_llm::client::{LlmClient, LlmEvent};
use squadcast_llm::prompt::{estimate_tokens, render_payload};

const COMPLETION_CONTEXT: &str = "completion service";

/// Aggregator, assembler and template wired together for one run.
pub struct Pipeline<S> {
    aggregator: Aggregator<S>,
    assembler: Assembler,
    template: String,
    chip_reset_gameweek: u32,
}

impl<S: FplSource> Pipeline<S> {
    pub fn new(source: S, config: &Config, template: String) -> Self {
        Self {
            aggregator: Aggregator::new(source, config),
            assembler: Assembler::new(AnalysisOptions::from(&config.analysis)),
            template,
            chip_reset_gameweek: config.analysis.chip_reset_gameweek,
        }
    }

    pub fn source(&self) -> &S {
        self.aggregator.source()
    }

    /// Fetch everything for `manager_id` and render the completion payload.
    pub async fn render(&self, manager_id: &str) -> Result<String, PipelineError> {
        let id = ManagerId::parse(manager_id)?;
        let bundle = self.aggregator.assemble_bundle(id).await?;
        let views = self.assembler.derive(&bundle);
        let payload = render_payload(&views, &self.template, self.chip_reset_gameweek);
        info!(
            chars = payload.len(),
            estimated_tokens = estimate_tokens(&payload),
            "Payload rendered"
        );
        Ok(payload)
    }
}

/// The whole pipeline: text advice for `manager_id`, or a classified error.
///
/// Credentials are checked before any upstream fetch. `show` receives the
/// advice once, after the stream has completed; a run that fails never
/// reaches it.
pub async fn run_pipeline<S, F>(
    pipeline: &Pipeline<S>,
    llm: &LlmClient,
    manager_id: &str,
    show: F,
) -> Result<String, PipelineError>
where
    S: FplSource,
    F: FnOnce(&str),
{
    if matches!(llm, LlmClient::Disabled) {
        return Err(PipelineError::Configuration(
            "OPENAI_API_KEY not set; add it to config/credentials.toml or the environment"
                .to_string(),
        ));
    }
    let payload = pipeline.render(manager_id).await?;
    complete(llm, &payload, show).await
}

/// Stream one completion for `payload`, buffering it until the service
/// signals completion. `show` is called at most once, with the full text.
pub async fn complete<F>(llm: &LlmClient, payload: &str, show: F) -> Result<String, PipelineError>
where
    F: FnOnce(&str),
{
    let (tx, mut rx) = mpsc::channel(256);

    let drain = async {
        let mut outcome = Err(PipelineError::upstream(
            COMPLETION_CONTEXT,
            "stream closed without a result",
        ));
        let mut fragments = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                LlmEvent::Token { .. } => fragments += 1,
                LlmEvent::Complete {
                    full_text,
                    prompt_tokens,
                    completion_tokens,
                } => {
                    info!(
                        fragments,
                        ?prompt_tokens,
                        ?completion_tokens,
                        chars = full_text.len(),
                        "Advice received"
                    );
                    outcome = if full_text.trim().is_empty() {
                        Err(PipelineError::upstream(COMPLETION_CONTEXT, "empty response"))
                    } else {
                        Ok(full_text)
                    };
                }
                LlmEvent::Error { message } => {
                    warn!(%message, "Completion failed");
                    outcome = Err(PipelineError::upstream(COMPLETION_CONTEXT, message));
                }
            }
        }
        outcome
    };

    let (sent, outcome) = tokio::join!(llm.stream_chat(payload, tx), drain);
    sent.map_err(|e| PipelineError::upstream(COMPLETION_CONTEXT, e))?;
    let text = outcome?;
    show(&text);
    Ok(text)
}

/// `squadcast_recs_<id>.md` in the working directory.
pub fn default_output_path(manager_id: &str) -> PathBuf {
    PathBuf::from(format!("squadcast_recs_{}.md", manager_id.trim()))
}

/// Write the advice text verbatim.
pub fn export_advice(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}
