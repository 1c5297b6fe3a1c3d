use anyhow::{Context, Result};
use chat_context::config::Config;
use chat_context::context::{
    ContextBudgetManager, ContextWarning, ModelSummarizer, TokenBudgetManager,
};
use chat_context::conversation::{ChatOrchestrator, ConversationStore};
use chat_context::llm::{LanguageModel, ModelAvailability, OpenAiCompatibleModel};
use chat_context::logging::init_logging;
use chat_context::metrics::METRICS;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config.logging)?;

    let model: Arc<dyn LanguageModel> = Arc::new(
        OpenAiCompatibleModel::new(config.model.clone()).context("failed to build model client")?,
    );
    let summarizer = Arc::new(ModelSummarizer::new(model.clone(), config.summarizer.clone()));
    let budget = TokenBudgetManager::new(config.token_budget.clone())?;
    let orchestrator = ChatOrchestrator::new(
        Arc::new(ConversationStore::new()),
        ContextBudgetManager::new(budget, summarizer),
        model,
        config.chat.clone(),
    );

    let mut conversation = orchestrator.store().create("cli session");
    info!(
        "Chatting with {} (safe limit {}, hard limit {})",
        config.model.model, config.token_budget.safe_limit, config.token_budget.hard_limit
    );
    eprintln!("Type a message. Commands: /reset, /context, /metrics, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/metrics" => {
                println!("{}", METRICS.export_prometheus());
                continue;
            }
            "/context" => {
                let current = orchestrator.store().get(conversation)?;
                let decision = orchestrator.preview(conversation)?;
                println!(
                    "{}: {} turns, mode: {}, estimated tokens: {}",
                    current.title,
                    current.history.len(),
                    decision.mode.as_str(),
                    decision.estimated_tokens
                );
                continue;
            }
            "/reset" => {
                orchestrator.delete_conversation(conversation)?;
                conversation = orchestrator.store().create("cli session");
                eprintln!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match orchestrator
            .send(conversation, line, &ModelAvailability::Available)
            .await
        {
            Ok(reply) => {
                println!("{}", reply.text);
                if reply.degraded {
                    eprintln!("[warning] summarization failed; older messages were left out");
                }
                for warning in &reply.warnings {
                    if let ContextWarning::Truncated { target, .. } = warning {
                        eprintln!("[warning] context was truncated ({:?})", target);
                    }
                }
            }
            Err(e) => eprintln!("[error] {}", e),
        }
    }

    Ok(())
}
