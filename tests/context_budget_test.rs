//! Integration tests for the context budget policy
//!
//! These exercise the public API end to end with scripted summarizers in
//! place of a real model.

use async_trait::async_trait;
use chat_context::prelude::*;
use chat_context::context::TruncationTarget;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Returns a summary of `words` words and counts the turns it was given
struct ScriptedSummarizer {
    words: usize,
    calls: AtomicUsize,
    last_turn_count: AtomicUsize,
}

impl ScriptedSummarizer {
    fn new(words: usize) -> Arc<Self> {
        Arc::new(Self {
            words,
            calls: AtomicUsize::new(0),
            last_turn_count: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(
        &self,
        turns: &[Turn],
        _target_tokens: usize,
    ) -> std::result::Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_turn_count.store(turns.len(), Ordering::SeqCst);
        Ok(vec!["summary"; self.words].join(" "))
    }
}

struct FailingSummarizer(SummarizerError);

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(
        &self,
        _turns: &[Turn],
        _target_tokens: usize,
    ) -> std::result::Result<String, SummarizerError> {
        Err(self.0.clone())
    }
}

/// Hangs on its first call, then answers; records when a pending call is dropped
struct StallingSummarizer {
    calls: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Summarizer for StallingSummarizer {
    async fn summarize(
        &self,
        _turns: &[Turn],
        _target_tokens: usize,
    ) -> std::result::Result<String, SummarizerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let _guard = SetOnDrop(self.dropped.clone());
            std::future::pending::<()>().await;
        }
        Ok("a short recap".to_string())
    }
}

fn words(n: usize) -> String {
    vec!["token"; n].join(" ")
}

fn conversation(turns: usize, words_per_turn: usize) -> ConversationHistory {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                Turn::user(words(words_per_turn))
            } else {
                Turn::assistant(words(words_per_turn))
            }
        })
        .collect()
}

fn manager(summarizer: Arc<dyn Summarizer>) -> ContextBudgetManager {
    ContextBudgetManager::new(TokenBudgetManager::default().unwrap(), summarizer)
}

#[tokio::test]
async fn test_short_history_is_sent_in_full() {
    // 10 turns * 5 words * 1.3 = 65 tokens plus framing
    let summarizer = ScriptedSummarizer::new(10);
    let manager = manager(summarizer.clone());
    let history = conversation(10, 5);

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Full);
    assert_eq!(decision.turns(), history.turns());
    assert!(decision.estimated_tokens < 200);
    assert!(!decision.degraded);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_long_history_is_summarized_and_re_estimated() {
    // 500 turns * 20 words * 1.3 = 13,000 tokens
    let summarizer = ScriptedSummarizer::new(100);
    let manager = manager(summarizer.clone());
    let history = conversation(500, 20);

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Summary);
    assert!(decision.history_tokens > 13_000);
    assert!(decision.estimated_tokens <= manager.budget().safe_limit);

    let summary = decision.summary().unwrap();
    let recomputed = manager
        .budget_manager()
        .estimate_request(Some(summary), decision.turns());
    assert_eq!(decision.estimated_tokens, recomputed);

    // Summarized prefix plus verbatim tail covers the whole history
    let summarized = summarizer.last_turn_count.load(Ordering::SeqCst);
    assert_eq!(summarized + decision.turns().len(), history.len());
    assert_eq!(decision.turns().last(), history.last());
}

#[tokio::test]
async fn test_summarization_failure_uses_sliding_window() {
    let manager = manager(Arc::new(FailingSummarizer(SummarizerError::ModelUnavailable(
        "model assets not downloaded".to_string(),
    ))));
    let history = conversation(500, 20);

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Full);
    assert!(decision.degraded);
    assert!(decision.estimated_tokens <= manager.budget().hard_limit);

    let window = decision.turns();
    assert!(window.len() < history.len());
    // Window is a suffix of the history
    assert_eq!(window, &history.turns()[history.len() - window.len()..]);
    assert!(matches!(
        decision.warnings[0],
        ContextWarning::SummarizationFailed { .. }
    ));
}

#[tokio::test]
async fn test_every_summarizer_failure_kind_degrades() {
    let failures = vec![
        SummarizerError::ModelUnavailable("offline".to_string()),
        SummarizerError::GuardrailViolation("unsafe content".to_string()),
        SummarizerError::UnsupportedLocale("xx-XX".to_string()),
    ];

    for failure in failures {
        let manager = manager(Arc::new(FailingSummarizer(failure)));
        let decision = assert_ok!(manager.decide(&conversation(50, 100)).await);
        assert!(decision.degraded);
        assert_eq!(decision.mode, ContextMode::Full);
    }
}

#[tokio::test]
async fn test_cancelled_summarization_is_an_error() {
    let manager = manager(Arc::new(FailingSummarizer(SummarizerError::Cancelled)));
    let result = manager.decide(&conversation(500, 20)).await;
    let err = assert_err!(result);
    assert!(matches!(err, ContextError::Cancelled));
}

#[tokio::test]
async fn test_latest_turn_truncated_above_hard_limit() {
    let manager = manager(ScriptedSummarizer::new(50));
    let mut history = conversation(20, 50);
    history.push(Turn::user(words(6000)));

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Summary);
    assert!(decision.is_truncated());
    assert!(decision.estimated_tokens <= manager.budget().hard_limit);
    assert!(decision.warnings.iter().any(|w| matches!(
        w,
        ContextWarning::Truncated {
            target: TruncationTarget::LatestTurn,
            ..
        }
    )));
    assert_eq!(decision.turns().len(), 1);
    assert!(decision.turns()[0].text().len() < history.last().unwrap().text().len());
}

#[tokio::test]
async fn test_summary_survives_when_latest_turn_can_be_cut() {
    // Summary and latest turn are 2308 words (3000 tokens) each
    let manager = manager(ScriptedSummarizer::new(2308));
    let mut history = conversation(2, 300);
    history.push(Turn::user(words(2308)));

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Summary);
    assert!(decision.estimated_tokens <= manager.budget().hard_limit);
    assert_eq!(manager.estimate_tokens(decision.summary().unwrap()), 3000);

    let truncated: Vec<_> = decision
        .warnings
        .iter()
        .filter_map(|w| match w {
            ContextWarning::Truncated {
                target, kept_tokens, ..
            } => Some((*target, *kept_tokens)),
            _ => None,
        })
        .collect();
    assert_eq!(truncated, vec![(TruncationTarget::LatestTurn, 1031)]);
}

#[tokio::test]
async fn test_dropping_decide_leaves_manager_usable() {
    let dropped = Arc::new(AtomicBool::new(false));
    let summarizer = Arc::new(StallingSummarizer {
        calls: AtomicUsize::new(0),
        dropped: dropped.clone(),
    });
    let manager = manager(summarizer.clone());
    let history = conversation(500, 20);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), manager.decide(&history)).await;
    assert!(abandoned.is_err());
    assert!(dropped.load(Ordering::SeqCst));

    let decision = assert_ok!(manager.decide(&history).await);
    assert_eq!(decision.mode, ContextMode::Summary);
    assert!(!decision.degraded);
    assert_eq!(decision.summary(), Some("a short recap"));
    assert!(decision.estimated_tokens <= manager.budget().safe_limit);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_estimate_is_monotonic_in_appended_turns() {
    let manager = manager(ScriptedSummarizer::new(1));
    let mut history = ConversationHistory::new();
    let mut previous = manager.estimate_history(&history);

    for i in 0..50 {
        history.push(Turn::user(words(i % 7)));
        let current = manager.estimate_history(&history);
        assert!(current >= previous);
        previous = current;
    }
}

#[test]
fn test_estimate_is_idempotent() {
    let manager = manager(ScriptedSummarizer::new(1));
    let text = "How do I wire a language model session into a chat view?";
    assert_eq!(manager.estimate_tokens(text), manager.estimate_tokens(text));
    assert_eq!(manager.estimate_tokens(""), 0);
}

#[test]
fn test_evaluate_never_calls_out() {
    let summarizer = ScriptedSummarizer::new(1);
    let manager = manager(summarizer.clone());

    let decision = manager.evaluate(&conversation(500, 20));
    assert!(decision.needs_summary());
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
}
