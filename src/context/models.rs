//! Data models for context decisions

use crate::conversation::Turn;
use serde::{Deserialize, Serialize};

/// How history is represented in an outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContextMode {
    Full,
    Summary,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Full => "full",
            ContextMode::Summary => "summary",
        }
    }
}

/// What will actually be sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPayload {
    /// Turns sent verbatim (the whole history, or a window of it)
    Turns { turns: Vec<Turn> },
    /// Condensed summary of older turns followed by recent turns verbatim
    Summary { summary: String, recent: Vec<Turn> },
    /// Produced only by the synchronous evaluation step: history is over
    /// the safe limit and a summary has to be requested first
    SummaryRequested,
}

/// Non-fatal annotations on a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextWarning {
    /// Summarization failed; a sliding window of recent turns is sent instead
    SummarizationFailed { reason: String, dropped_turns: usize },
    /// Payload is above the safe limit but under the hard limit and
    /// cannot be made smaller without cutting content
    ExceedsSafeLimit { estimated_tokens: usize },
    /// Text was cut to fit the hard limit
    Truncated {
        original_tokens: usize,
        kept_tokens: usize,
        target: TruncationTarget,
    },
}

/// Which part of the payload a truncation hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationTarget {
    LatestTurn,
    Summary,
}

/// Per-request result of the budget policy. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDecision {
    pub mode: ContextMode,
    /// Estimate of the payload that will be sent, framing included
    pub estimated_tokens: usize,
    /// Estimate of the untouched history, framing included
    pub history_tokens: usize,
    pub payload: ContextPayload,
    /// Set when summarization failed and a sliding window was used
    pub degraded: bool,
    pub warnings: Vec<ContextWarning>,
}

impl ContextDecision {
    /// Whether any content was lossily cut to fit the hard limit
    pub fn is_truncated(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ContextWarning::Truncated { .. }))
    }

    /// Whether the decision still waits on a summary
    pub fn needs_summary(&self) -> bool {
        matches!(self.payload, ContextPayload::SummaryRequested)
    }

    /// Verbatim turns carried by the payload
    pub fn turns(&self) -> &[Turn] {
        match &self.payload {
            ContextPayload::Turns { turns } => turns,
            ContextPayload::Summary { recent, .. } => recent,
            ContextPayload::SummaryRequested => &[],
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match &self.payload {
            ContextPayload::Summary { summary, .. } => Some(summary),
            _ => None,
        }
    }
}
