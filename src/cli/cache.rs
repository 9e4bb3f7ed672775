use std::path::Path;

use anyhow::Context;
use serde_json::json;
use tracing::info;

use super::{Cli, Command, PromptArgs};
use crate::config::AppConfig;
use crate::domain::{CancelSignal, ChatMessage, SemanticCacheService};
use crate::infrastructure::logging;
use crate::infrastructure::services::DefaultSemanticCacheService;

/// Run one cache operation and print its result
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().unwrap_or_default();
    if let Some(path) = cli.snapshot.clone() {
        config.semantic_cache.snapshot_path = Some(path);
    }
    logging::init_logging(&config.logging);

    let service = crate::create_semantic_cache_with_config(&config).await?;

    if let Some(min_relevance) = cli.min_relevance {
        service.set_min_relevance_override(min_relevance)?;
    }

    let output = execute(&service, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if service.config().snapshot_path.is_some() {
        service.persist().await?;
        info!("Semantic cache snapshot persisted");
    }

    Ok(())
}

async fn execute(
    service: &DefaultSemanticCacheService,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    let output = match command {
        Command::Lookup(args) => {
            let history = load_history(args.history.as_deref()).await?;
            let lookup = service.get_cache_item(&args.prompt, &history).await?;
            serde_json::to_value(lookup)?
        }
        Command::Store { prompt, response } => {
            let history = load_history(prompt.history.as_deref()).await?;
            let entry = service
                .cache_response(
                    &prompt.prompt,
                    &history,
                    parse_response(&response),
                    CancelSignal::never(),
                )
                .await?;
            json!({
                "id": entry.id(),
                "hit_count": entry.hit_count(),
                "created_at": entry.created_at(),
            })
        }
        Command::Remove(PromptArgs { prompt, history }) => {
            let history = load_history(history.as_deref()).await?;
            let removed = service.remove_cache_item(&prompt, &history).await?;
            json!({ "removed": removed })
        }
        Command::Reset => {
            service.reset().await?;
            json!({ "reset": true })
        }
        Command::Stats => {
            let stats = service.stats().await?;
            json!({
                "total_entries": stats.total_entries,
                "hits": stats.hits,
                "misses": stats.misses,
                "evictions": stats.evictions,
                "embedding_failures": stats.embedding_failures,
                "avg_hit_similarity": stats.avg_hit_similarity,
                "hit_rate": stats.hit_rate(),
                "min_relevance": service.min_relevance().value(),
            })
        }
        Command::Purge => {
            let purged = service.purge_expired().await?;
            json!({ "purged": purged })
        }
    };

    Ok(output)
}

async fn load_history(path: Option<&Path>) -> anyhow::Result<Vec<ChatMessage>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read history file {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("history file {} is not a message array", path.display()))
}

fn parse_response(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response(r#"{"answer": 42}"#), json!({"answer": 42}));
        assert_eq!(parse_response("Paris"), json!("Paris"));
    }

    #[tokio::test]
    async fn test_load_history() {
        assert!(load_history(None).await.unwrap().is_empty());

        let path = std::env::temp_dir().join(format!("history-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"role": "system", "content": "Be brief"}, {"role": "user", "content": "hi"}]"#,
        )
        .await
        .unwrap();

        let history = load_history(Some(&path)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::System);

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(load_history(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_store_lookup_stats() {
        let service = crate::create_semantic_cache().await.unwrap();
        let args = PromptArgs {
            prompt: "What is the capital of France?".to_string(),
            history: None,
        };

        execute(
            &service,
            Command::Store {
                prompt: args.clone(),
                response: "Paris".to_string(),
            },
        )
        .await
        .unwrap();

        let lookup = execute(&service, Command::Lookup(args.clone())).await.unwrap();
        assert_eq!(lookup["outcome"], "hit");
        assert_eq!(lookup["entry"]["response"], "Paris");

        let stats = execute(&service, Command::Stats).await.unwrap();
        assert_eq!(stats["total_entries"], 1);
        assert_eq!(stats["hits"], 1);

        let removed = execute(&service, Command::Remove(args)).await.unwrap();
        assert_eq!(removed["removed"], true);
    }
}
