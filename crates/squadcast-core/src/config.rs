// Configuration loading and parsing (squadcast.toml, credentials.toml, environment).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub prompt: PromptConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// squadcast.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire squadcast.toml file.
#[derive(Debug, Clone, Deserialize)]
struct SquadcastFile {
    upstream: UpstreamConfig,
    analysis: AnalysisConfig,
    llm: LlmConfig,
    #[serde(default)]
    prompt: PromptConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub fixture_window: u32,
    pub season_gameweeks: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub top_k: usize,
    pub history_window: usize,
    pub lookahead: usize,
    pub chip_reset_gameweek: u32,
    #[serde(default = "default_free_transfers")]
    pub assumed_free_transfers: u32,
    #[serde(default)]
    pub features: FeatureFlags,
}

fn default_free_transfers() -> u32 {
    1
}

/// Which derived views and optional fields reach the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub advanced_metrics: bool,
    pub recent_history: bool,
    pub classification: bool,
    pub doubles: bool,
    pub calendar_doubles: bool,
    pub blanks: bool,
    pub chips: bool,
    pub price_trends: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            advanced_metrics: true,
            recent_history: true,
            classification: true,
            doubles: true,
            calendar_doubles: true,
            blanks: true,
            chips: true,
            price_trends: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Omitted from the request when absent; some models only accept the default.
    #[serde(default)]
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two stream chunks.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub template_path: Option<String>,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub openai_api_key: Option<String>,
}

impl CredentialsConfig {
    /// The API key, if present and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/squadcast.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not consult the environment; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- squadcast.toml (required) ---
    let main_path = config_dir.join("squadcast.toml");
    let main_text = read_file(&main_path)?;
    let file: SquadcastFile =
        toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
            path: main_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        upstream: file.upstream,
        analysis: file.analysis,
        llm: file.llm,
        prompt: file.prompt,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first, then apply `.env` and environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Environment overrides (highest priority). `lookup` is injected so tests
/// don't touch the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
        config.credentials.openai_api_key = Some(key);
    }
    if let Some(model) = lookup("SQUADCAST_MODEL").filter(|m| !m.trim().is_empty()) {
        config.llm.model = model;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let up = &config.upstream;
    let positive_fields: &[(&str, u64)] = &[
        ("upstream.timeout_secs", up.timeout_secs),
        ("upstream.fixture_window", u64::from(up.fixture_window)),
        ("upstream.season_gameweeks", u64::from(up.season_gameweeks)),
        ("analysis.top_k", config.analysis.top_k as u64),
        ("analysis.lookahead", config.analysis.lookahead as u64),
        ("llm.max_tokens", u64::from(config.llm.max_tokens)),
        ("llm.read_timeout_secs", config.llm.read_timeout_secs),
    ];
    for (name, val) in positive_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    let window = config.analysis.history_window;
    if !(4..=10).contains(&window) {
        return Err(ConfigError::ValidationError {
            field: "analysis.history_window".into(),
            message: format!("must be between 4 and 10 inclusive, got {window}"),
        });
    }

    let reset = config.analysis.chip_reset_gameweek;
    if reset == 0 || reset > up.season_gameweeks {
        return Err(ConfigError::ValidationError {
            field: "analysis.chip_reset_gameweek".into(),
            message: format!(
                "must be between 1 and {} inclusive, got {reset}",
                up.season_gameweeks
            ),
        });
    }

    if let Some(t) = config.llm.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ConfigError::ValidationError {
                field: "llm.temperature".into(),
                message: format!("must be between 0.0 and 2.0 inclusive, got {t}"),
            });
        }
    }

    if !up.base_url.starts_with("http://") && !up.base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError {
            field: "upstream.base_url".into(),
            message: format!("must be an http(s) URL, got {}", up.base_url),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
