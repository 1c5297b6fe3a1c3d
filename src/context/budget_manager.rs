//! Context budget manager
//!
//! Decides, per outgoing request, whether the model gets the full history or
//! a summary of older turns plus the most recent ones:
//! - Full history while its estimate fits the safe limit
//! - Summarize-then-retry when it does not, shrinking the verbatim tail
//!   until the payload fits or only the latest turn is left
//! - Truncation of the latest turn above the hard limit, and of the summary
//!   only when it leaves no room for that turn
//! - Sliding window of recent turns when summarization fails

use super::models::{
    ContextDecision, ContextMode, ContextPayload, ContextWarning, TruncationTarget,
};
use super::summarizer::{Summarizer, SummarizerError};
use super::token_budget::{TokenBudget, TokenBudgetManager};
use super::token_estimator::truncate_to_tokens;
use crate::conversation::{ConversationHistory, Turn};
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound for the summary length requested from the summarizer
const MIN_SUMMARY_TARGET: usize = 128;

/// Room kept for the latest turn when an oversized summary has to be cut
const MIN_LATEST_TURN_ROOM: usize = 128;

/// Budget policy over a conversation history
pub struct ContextBudgetManager {
    budget_manager: TokenBudgetManager,
    summarizer: Arc<dyn Summarizer>,
}

impl ContextBudgetManager {
    pub fn new(budget_manager: TokenBudgetManager, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            budget_manager,
            summarizer,
        }
    }

    /// Get the budget manager
    pub fn budget_manager(&self) -> &TokenBudgetManager {
        &self.budget_manager
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget_manager.budget()
    }

    /// Approximate token count of `text`
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.budget_manager.estimate_tokens(text)
    }

    /// Cost of sending `history` verbatim, framing included
    pub fn estimate_history(&self, history: &ConversationHistory) -> usize {
        self.budget_manager.estimate_request(None, history.turns())
    }

    /// Synchronous half of the policy. Returns a FULL decision carrying the
    /// history, or a SUMMARY decision whose payload only says a summary is
    /// required.
    pub fn evaluate(&self, history: &ConversationHistory) -> ContextDecision {
        let total = self.estimate_history(history);

        if self.budget_manager.within_safe_limit(total) {
            return ContextDecision {
                mode: ContextMode::Full,
                estimated_tokens: total,
                history_tokens: total,
                payload: ContextPayload::Turns {
                    turns: history.turns().to_vec(),
                },
                degraded: false,
                warnings: Vec::new(),
            };
        }

        ContextDecision {
            mode: ContextMode::Summary,
            estimated_tokens: total,
            history_tokens: total,
            payload: ContextPayload::SummaryRequested,
            degraded: false,
            warnings: Vec::new(),
        }
    }

    /// Decide what to send for `history`.
    ///
    /// Never fails on budget grounds; the only error is
    /// [`ContextError::Cancelled`] when summarization was cancelled.
    pub async fn decide(&self, history: &ConversationHistory) -> Result<ContextDecision> {
        let evaluated = self.evaluate(history);
        if !evaluated.needs_summary() {
            debug!(
                "History fits safe limit: {} tokens, {} turns",
                evaluated.estimated_tokens,
                history.len()
            );
            METRICS.record_decision(&evaluated);
            return Ok(evaluated);
        }

        let total = evaluated.history_tokens;
        warn!(
            "History exceeds safe limit: {} > {}",
            total,
            self.budget_manager.config().safe_limit
        );

        let decision = if history.len() < 2 {
            // Nothing older than the latest turn to fold into a summary
            self.finish(
                ContextMode::Full,
                None,
                history.turns().to_vec(),
                total,
                false,
                Vec::new(),
            )
        } else {
            self.summarize_and_retry(history.turns(), total).await?
        };

        METRICS.record_decision(&decision);
        Ok(decision)
    }

    async fn summarize_and_retry(&self, turns: &[Turn], total: usize) -> Result<ContextDecision> {
        let last = turns.len() - 1;
        let max_passes = self.budget_manager.config().max_summary_passes;
        let mut split = self.initial_split(turns);
        let mut pass = 1;

        loop {
            if pass >= max_passes {
                split = last;
            }
            let (dropped, kept) = turns.split_at(split);
            let target = self
                .budget_manager
                .safe_room(self.budget_manager.estimate_turns(kept))
                .max(MIN_SUMMARY_TARGET);

            info!(
                "Summarizing {} turns, keeping {} verbatim (pass {}/{})",
                dropped.len(),
                kept.len(),
                pass,
                max_passes
            );

            let summary = match self.request_summary(dropped, target).await {
                Ok(summary) => summary,
                Err(SummarizerError::Cancelled) => {
                    METRICS.record_summarization("cancelled");
                    return Err(ContextError::Cancelled);
                }
                Err(e) => {
                    METRICS.record_summarization("failed");
                    warn!("Summarization failed, using sliding window: {}", e);
                    return Ok(self.sliding_window(turns, total, &e));
                }
            };
            METRICS.record_summarization("success");

            let estimated = self.budget_manager.estimate_request(Some(&summary), kept);
            if self.budget_manager.within_safe_limit(estimated) || kept.len() == 1 {
                debug!(
                    "Summary pass {} produced {} tokens (history: {})",
                    pass, estimated, total
                );
                return Ok(self.finish(
                    ContextMode::Summary,
                    Some(summary),
                    kept.to_vec(),
                    total,
                    false,
                    Vec::new(),
                ));
            }

            split = self.shrink_split(turns, split, &summary);
            pass += 1;
        }
    }

    /// Start of the longest suffix that fits the safe limit with room left
    /// for a summary. Always leaves at least one turn to summarize and keeps
    /// at least the latest turn.
    fn initial_split(&self, turns: &[Turn]) -> usize {
        let last = turns.len() - 1;
        let reserve = self.budget_manager.config().summary_reserve;
        let mut split = last;

        for start in (1..last).rev() {
            let tokens = self.budget_manager.estimate_request(None, &turns[start..]);
            if !self.budget_manager.within_safe_limit(tokens + reserve) {
                break;
            }
            split = start;
        }
        split
    }

    /// Next split after a summary came back too long: move older kept turns
    /// into the summarized prefix until the current summary would fit.
    fn shrink_split(&self, turns: &[Turn], split: usize, summary: &str) -> usize {
        let last = turns.len() - 1;
        let mut candidate = split + 1;

        while candidate < last {
            let tokens = self
                .budget_manager
                .estimate_request(Some(summary), &turns[candidate..]);
            if self.budget_manager.within_safe_limit(tokens) {
                break;
            }
            candidate += 1;
        }
        candidate.min(last)
    }

    async fn request_summary(
        &self,
        turns: &[Turn],
        target_tokens: usize,
    ) -> std::result::Result<String, SummarizerError> {
        let timeout = Duration::from_millis(self.budget_manager.config().summary_timeout_ms);
        let summarize = self.summarizer.summarize(turns, target_tokens);
        match tokio::time::timeout(timeout, summarize).await {
            Ok(result) => result,
            Err(_) => Err(SummarizerError::Timeout(timeout)),
        }
    }

    /// Degraded fallback: the newest turns that fit the hard limit, never the
    /// whole history.
    fn sliding_window(
        &self,
        turns: &[Turn],
        total: usize,
        error: &SummarizerError,
    ) -> ContextDecision {
        let last = turns.len() - 1;
        let mut start = last;

        for candidate in (1..last).rev() {
            let tokens = self.budget_manager.estimate_request(None, &turns[candidate..]);
            if !self.budget_manager.within_hard_limit(tokens) {
                break;
            }
            start = candidate;
        }

        info!(
            "Sliding window keeps {} of {} turns",
            turns.len() - start,
            turns.len()
        );

        let warnings = vec![ContextWarning::SummarizationFailed {
            reason: error.to_string(),
            dropped_turns: start,
        }];
        self.finish(
            ContextMode::Full,
            None,
            turns[start..].to_vec(),
            total,
            true,
            warnings,
        )
    }

    /// Build the final decision, cutting content above the hard limit.
    ///
    /// Callers only pass more than one kept turn when the payload is already
    /// under the hard limit, so truncation only ever touches a lone latest
    /// turn and the summary.
    fn finish(
        &self,
        mode: ContextMode,
        mut summary: Option<String>,
        mut kept: Vec<Turn>,
        total: usize,
        degraded: bool,
        mut warnings: Vec<ContextWarning>,
    ) -> ContextDecision {
        let mut estimated = self
            .budget_manager
            .estimate_request(summary.as_deref(), &kept);

        if !self.budget_manager.within_hard_limit(estimated) {
            debug_assert_eq!(kept.len(), 1);
            if let Some(latest) = kept.pop() {
                let latest = self.truncate_to_hard_limit(&mut summary, latest, &mut warnings);
                kept.push(latest);
            }
            estimated = self
                .budget_manager
                .estimate_request(summary.as_deref(), &kept);
            warn!("Payload truncated to {} tokens", estimated);
        }

        if !self.budget_manager.within_safe_limit(estimated) {
            warnings.push(ContextWarning::ExceedsSafeLimit {
                estimated_tokens: estimated,
            });
        }

        let payload = match summary {
            Some(summary) => ContextPayload::Summary {
                summary,
                recent: kept,
            },
            None => ContextPayload::Turns { turns: kept },
        };

        ContextDecision {
            mode,
            estimated_tokens: estimated,
            history_tokens: total,
            payload,
            degraded,
            warnings,
        }
    }

    /// The latest turn absorbs the cut. The summary is cut only when it alone
    /// leaves less than [`MIN_LATEST_TURN_ROOM`] under the hard limit.
    fn truncate_to_hard_limit(
        &self,
        summary: &mut Option<String>,
        latest: Turn,
        warnings: &mut Vec<ContextWarning>,
    ) -> Turn {
        let estimator = self.budget_manager.estimator();
        let body_room = self.budget_manager.hard_room(0);
        let latest_tokens = estimator.estimate(latest.text());

        let mut summary_tokens = 0;
        if let Some(text) = summary.as_mut() {
            summary_tokens = estimator.estimate(text);
            let summary_room =
                body_room.saturating_sub(latest_tokens.min(MIN_LATEST_TURN_ROOM));
            if summary_tokens > summary_room {
                let (cut, _) = truncate_to_tokens(estimator, text, summary_room);
                let kept_tokens = estimator.estimate(&cut);
                warnings.push(ContextWarning::Truncated {
                    original_tokens: summary_tokens,
                    kept_tokens,
                    target: TruncationTarget::Summary,
                });
                *text = cut;
                summary_tokens = kept_tokens;
            }
        }

        // Joined text can round one token above the sum of its parts.
        let mut turn_room = body_room.saturating_sub(summary_tokens);
        loop {
            let (text, cut) = truncate_to_tokens(estimator, latest.text(), turn_room);
            let candidate = latest.with_text(text);
            let tokens = self
                .budget_manager
                .estimate_request(summary.as_deref(), std::slice::from_ref(&candidate));

            if self.budget_manager.within_hard_limit(tokens) || turn_room == 0 {
                if cut {
                    warnings.push(ContextWarning::Truncated {
                        original_tokens: latest_tokens,
                        kept_tokens: estimator.estimate(candidate.text()),
                        target: TruncationTarget::LatestTurn,
                    });
                }
                return candidate;
            }
            turn_room -= 1;
        }
    }
}
