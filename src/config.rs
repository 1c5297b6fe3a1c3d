//! Application configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `chat-context.toml` (or the file named by `CHAT_CONTEXT_CONFIG`)
//! 3. Environment variables such as `CHAT_CONTEXT__TOKEN_BUDGET__SAFE_LIMIT`
//!
//! A `.env` file is loaded into the environment before anything is read.

use crate::context::{SummarizerConfig, TokenBudgetConfig};
use crate::conversation::ChatConfig;
use crate::error::{ContextError, Result};
use crate::llm::ModelConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::logging::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "chat-context.toml";
const ENV_PREFIX: &str = "CHAT_CONTEXT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub token_budget: TokenBudgetConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var(format!("{}_CONFIG", ENV_PREFIX))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(&path)
    }

    /// Load configuration from `path` (optional) and the environment
    pub fn from_file(path: &str) -> Result<Self> {
        debug!("Loading configuration from {}", path);
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without the environment
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.token_budget.validate()?;

        if self.model.endpoint.is_empty() {
            return Err(ContextError::Configuration(
                "model.endpoint must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
