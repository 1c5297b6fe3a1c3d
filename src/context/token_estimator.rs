//! Token estimation
//!
//! Counts here are approximations used for budgeting decisions, not ground
//! truth for any particular model's tokenizer.

use crate::error::{ContextError, Result};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Default multiplier for the word-based heuristic
pub const DEFAULT_TOKENS_PER_WORD: f64 = 1.3;

/// Token estimator trait for different tokenization strategies.
///
/// Implementations must be deterministic and monotonic in the input: a text
/// never estimates lower than any of its whitespace-delimited prefixes.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Word-based token estimator (~1.3 tokens per word, rounded)
#[derive(Debug, Clone, Copy)]
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }

    pub fn tokens_per_word(&self) -> f64 {
        self.tokens_per_word
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS_PER_WORD)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).round() as usize
    }
}

/// Tiktoken-based token estimator using cl100k_base
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| {
            ContextError::Configuration(format!("Failed to load cl100k_base encoding: {}", e))
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Cut `text` at a word boundary so its estimate fits in `max_tokens`.
///
/// Returns the (possibly shortened) text and whether anything was removed.
/// Whitespace runs inside the kept prefix collapse to single spaces when a
/// cut happens.
pub fn truncate_to_tokens(
    estimator: &dyn TokenEstimator,
    text: &str,
    max_tokens: usize,
) -> (String, bool) {
    if estimator.estimate(text) <= max_tokens {
        return (text.to_string(), false);
    }

    let words: Vec<&str> = text.split_whitespace().collect();

    // Largest word prefix whose estimate fits; estimators are monotonic.
    let (mut lo, mut hi) = (0usize, words.len());
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if estimator.estimate(&words[..mid].join(" ")) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    (words[..lo].join(" "), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_based_estimator() {
        let estimator = WordBasedEstimator::default();
        // 10 words * 1.3 = 13
        let text = "This is a test sentence with ten words in it.";
        assert_eq!(estimator.estimate(text), 13);
    }

    #[test]
    fn test_word_based_rounds_to_nearest() {
        let estimator = WordBasedEstimator::default();
        assert_eq!(estimator.estimate("one"), 1); // 1.3
        assert_eq!(estimator.estimate("one two"), 3); // 2.6
        assert_eq!(estimator.estimate("a b c d e"), 7); // 6.5
    }

    #[test]
    fn test_empty_text_is_zero() {
        let estimator = WordBasedEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("   \n\t "), 0);
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let estimator = WordBasedEstimator::default();
        let text = "the same text estimated twice";
        assert_eq!(estimator.estimate(text), estimator.estimate(text));
    }

    #[test]
    fn test_estimate_batch() {
        let estimator = WordBasedEstimator::new(1.0);
        let counts = estimator.estimate_batch(&["one", "one two", ""]);
        assert_eq!(counts, vec![1, 2, 0]);
    }

    #[test]
    fn test_truncate_noop_when_fits() {
        let estimator = WordBasedEstimator::default();
        let (text, cut) = truncate_to_tokens(&estimator, "short text", 100);
        assert_eq!(text, "short text");
        assert!(!cut);
    }

    #[test]
    fn test_truncate_cuts_at_word_boundary() {
        let estimator = WordBasedEstimator::new(1.0);
        let (text, cut) = truncate_to_tokens(&estimator, "a b c d e f", 4);
        assert_eq!(text, "a b c d");
        assert!(cut);
    }

    #[test]
    fn test_truncate_to_zero() {
        let estimator = WordBasedEstimator::default();
        let (text, cut) = truncate_to_tokens(&estimator, "nothing fits here", 0);
        assert!(text.is_empty());
        assert!(cut);
    }

    #[test]
    fn test_tiktoken_estimator() {
        let estimator = TiktokenEstimator::new().unwrap();
        let tokens = estimator.estimate("Hello, world!");
        assert!(tokens > 0);
        assert!(tokens < 10);
    }
}
