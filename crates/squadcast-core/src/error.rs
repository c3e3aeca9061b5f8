// Pipeline error taxonomy.
//
// Lost per-player history is not an error here: it is absorbed by the
// aggregator and recorded on the bundle as `history_gaps`.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure, timeout, or non-success status from the data
    /// service or the completion service.
    #[error("{context} unavailable: {message}")]
    UpstreamUnavailable { context: String, message: String },

    #[error("manager `{manager_id}` not found; check the id at fantasy.premierleague.com/entry/<ID>")]
    ManagerNotFound { manager_id: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn upstream(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        PipelineError::UpstreamUnavailable {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Short label used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UpstreamUnavailable { .. } => "upstream_unavailable",
            PipelineError::ManagerNotFound { .. } => "manager_not_found",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn messages_distinguish_each_kind() {
        let up = PipelineError::upstream("bootstrap-static", "status 503");
        assert_eq!(up.to_string(), "bootstrap-static unavailable: status 503");
        assert_eq!(up.kind(), "upstream_unavailable");

        let nf = PipelineError::ManagerNotFound {
            manager_id: "42".into(),
        };
        assert!(nf.to_string().contains("manager `42` not found"));

        let cfg: PipelineError = ConfigError::FileNotFound {
            path: PathBuf::from("config/squadcast.toml"),
        }
        .into();
        assert_eq!(cfg.kind(), "configuration");
        assert!(cfg.to_string().contains("squadcast.toml"));
    }
}
