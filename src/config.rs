//! Configuration loader and validator for the content-ops service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub site: Site,
    pub gemini: Gemini,
    pub cms: Cms,
    pub blog: Blog,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
}

/// Public site settings, used to build published-post URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub base_url: String,
}

/// Generative-text API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gemini {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

/// CMS write-API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cms {
    pub base_url: String,
    pub token: String,
    pub dataset: String,
}

/// Blog generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blog {
    pub default_author_id: String,
    pub categories: Vec<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if cfg.site.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("site.base_url must be non-empty"));
    }

    if cfg.gemini.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("gemini.api_key must be non-empty"));
    }
    if cfg.gemini.model.trim().is_empty() {
        return Err(ConfigError::Invalid("gemini.model must be non-empty"));
    }
    if !(0.0..=2.0).contains(&cfg.gemini.temperature) {
        return Err(ConfigError::Invalid(
            "gemini.temperature must be within 0.0..=2.0",
        ));
    }

    if cfg.cms.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("cms.base_url must be non-empty"));
    }
    if cfg.cms.token.trim().is_empty() {
        return Err(ConfigError::Invalid("cms.token must be non-empty"));
    }
    if cfg.cms.dataset.trim().is_empty() {
        return Err(ConfigError::Invalid("cms.dataset must be non-empty"));
    }

    if cfg.blog.default_author_id.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "blog.default_author_id must be non-empty",
        ));
    }
    if cfg.blog.categories.is_empty() {
        return Err(ConfigError::Invalid("blog.categories must be non-empty"));
    }
    if cfg.blog.categories.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::Invalid(
            "blog.categories entries must be non-empty",
        ));
    }

    Ok(())
}

/// Example YAML configuration, also used as a fixture by tests.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "127.0.0.1:8080"
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 60

site:
  base_url: "https://www.example.com"

gemini:
  api_key: "YOUR_GEMINI_API_KEY"
  model: "gemini-3-flash-preview"
  temperature: 0.8

cms:
  base_url: "https://api.cms.example.com"
  token: "YOUR_CMS_WRITE_TOKEN"
  dataset: "production"

blog:
  default_author_id: "author-default"
  categories:
    - "National Digital Infrastructure"
    - "Product Engineering"
    - "Applied AI"
    - "Security & Compliance"
    - "Developer Tooling"
"#
}
