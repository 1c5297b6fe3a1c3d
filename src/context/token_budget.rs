//! Token budget for outgoing model requests
//!
//! Two limits govern every request:
//! - Safe limit (3,500 tokens): full history is sent only while it fits here
//! - Hard limit (4,096 tokens): nothing is sent above this; content is cut
//!
//! A fixed framing overhead for role markers and system instructions is
//! added once per request.

use super::token_estimator::{
    TiktokenEstimator, TokenEstimator, WordBasedEstimator, DEFAULT_TOKENS_PER_WORD,
};
use crate::conversation::{join_texts, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Which estimator backs the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    Words,
    Tiktoken,
}

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetConfig {
    /// Absolute ceiling for a request
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,

    /// Full history is sent while the estimate stays at or below this
    #[serde(default = "default_safe_limit")]
    pub safe_limit: usize,

    /// Added once per request for role/system-instruction framing
    #[serde(default = "default_framing_overhead")]
    pub framing_overhead: usize,

    /// Multiplier for the word-based estimator
    #[serde(default = "default_tokens_per_word")]
    pub tokens_per_word: f64,

    #[serde(default = "default_estimator")]
    pub estimator: EstimatorKind,

    /// Tokens kept free for the summary when choosing which recent turns
    /// stay verbatim
    #[serde(default = "default_summary_reserve")]
    pub summary_reserve: usize,

    /// Upper bound on summarization calls per decision
    #[serde(default = "default_max_summary_passes")]
    pub max_summary_passes: usize,

    /// Summarization timeout in milliseconds
    #[serde(default = "default_summary_timeout_ms")]
    pub summary_timeout_ms: u64,
}

fn default_hard_limit() -> usize {
    4096
}

fn default_safe_limit() -> usize {
    3500
}

fn default_framing_overhead() -> usize {
    64
}

fn default_tokens_per_word() -> f64 {
    DEFAULT_TOKENS_PER_WORD
}

fn default_estimator() -> EstimatorKind {
    EstimatorKind::Words
}

fn default_summary_reserve() -> usize {
    500
}

fn default_max_summary_passes() -> usize {
    3
}

fn default_summary_timeout_ms() -> u64 {
    30_000
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            hard_limit: default_hard_limit(),
            safe_limit: default_safe_limit(),
            framing_overhead: default_framing_overhead(),
            tokens_per_word: default_tokens_per_word(),
            estimator: default_estimator(),
            summary_reserve: default_summary_reserve(),
            max_summary_passes: default_max_summary_passes(),
            summary_timeout_ms: default_summary_timeout_ms(),
        }
    }
}

impl TokenBudgetConfig {
    /// Validate that the budget configuration is consistent
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.hard_limit == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "hard_limit must be greater than zero".to_string(),
            ));
        }

        if self.safe_limit > self.hard_limit {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "safe_limit ({}) exceeds hard_limit ({})",
                self.safe_limit, self.hard_limit
            )));
        }

        if self.framing_overhead >= self.hard_limit {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "framing_overhead ({}) leaves no room under hard_limit ({})",
                self.framing_overhead, self.hard_limit
            )));
        }

        if !(self.tokens_per_word.is_finite() && self.tokens_per_word > 0.0) {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "tokens_per_word must be positive, got {}",
                self.tokens_per_word
            )));
        }

        if self.summary_reserve >= self.safe_limit {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "summary_reserve ({}) must be below safe_limit ({})",
                self.summary_reserve, self.safe_limit
            )));
        }

        if self.max_summary_passes == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "max_summary_passes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Read-only limits derived from this configuration
    pub fn budget(&self) -> TokenBudget {
        TokenBudget {
            hard_limit: self.hard_limit,
            safe_limit: self.safe_limit,
            framing_overhead: self.framing_overhead,
        }
    }
}

/// Process-wide request limits. Never mutated once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub hard_limit: usize,
    pub safe_limit: usize,
    pub framing_overhead: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        TokenBudgetConfig::default().budget()
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Invalid budget configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Estimator unavailable: {0}")]
    EstimatorUnavailable(String),
}

/// Applies a [`TokenBudget`] using a [`TokenEstimator`]
#[derive(Clone)]
pub struct TokenBudgetManager {
    config: TokenBudgetConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl TokenBudgetManager {
    /// Create a new budget manager with the estimator named in the config
    pub fn new(config: TokenBudgetConfig) -> Result<Self, BudgetError> {
        config.validate()?;
        let estimator: Arc<dyn TokenEstimator> = match config.estimator {
            EstimatorKind::Words => Arc::new(WordBasedEstimator::new(config.tokens_per_word)),
            EstimatorKind::Tiktoken => Arc::new(
                TiktokenEstimator::new()
                    .map_err(|e| BudgetError::EstimatorUnavailable(e.to_string()))?,
            ),
        };
        Ok(Self { config, estimator })
    }

    /// Create with a caller-supplied estimator
    pub fn with_estimator(
        config: TokenBudgetConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, BudgetError> {
        config.validate()?;
        Ok(Self { config, estimator })
    }

    /// Create with default configuration (4096 / 3500, word heuristic)
    pub fn default() -> Result<Self, BudgetError> {
        Self::new(TokenBudgetConfig::default())
    }

    /// Estimate tokens for a single text
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Estimate for the concatenated texts of `turns`, without framing
    pub fn estimate_turns(&self, turns: &[Turn]) -> usize {
        if turns.is_empty() {
            return 0;
        }
        self.estimator.estimate(&join_texts(turns))
    }

    /// Full request cost: optional summary, verbatim turns, framing overhead
    pub fn estimate_request(&self, summary: Option<&str>, turns: &[Turn]) -> usize {
        let body = match summary {
            Some(summary) if !summary.is_empty() => {
                let mut text = summary.to_string();
                for turn in turns {
                    text.push(' ');
                    text.push_str(turn.text());
                }
                self.estimator.estimate(&text)
            }
            _ => self.estimate_turns(turns),
        };
        body + self.config.framing_overhead
    }

    /// Whether a request estimate may be sent without compression
    pub fn within_safe_limit(&self, tokens: usize) -> bool {
        tokens <= self.config.safe_limit
    }

    /// Whether a request estimate may be sent at all
    pub fn within_hard_limit(&self, tokens: usize) -> bool {
        tokens <= self.config.hard_limit
    }

    /// Room left under the hard limit after framing and `used` tokens
    pub fn hard_room(&self, used: usize) -> usize {
        self.config
            .hard_limit
            .saturating_sub(self.config.framing_overhead + used)
    }

    /// Room left under the safe limit after framing and `used` tokens
    pub fn safe_room(&self, used: usize) -> usize {
        self.config
            .safe_limit
            .saturating_sub(self.config.framing_overhead + used)
    }

    pub fn budget(&self) -> TokenBudget {
        self.config.budget()
    }

    /// Get the configuration
    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }
}
