//! Search commands: strategy queries and entity-centric retrieval.

use anyhow::{anyhow, bail, Result};
use tokio_util::sync::CancellationToken;

use trellis_core::{QueryConfig, RetrievalResult, Store, Strategy};

use crate::config::Config;
use crate::db;

/// Per-invocation overrides on top of the configured retrieval defaults.
#[derive(Debug, Default, Clone)]
pub struct SearchOverrides {
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub max_hops: Option<usize>,
    pub documents: Vec<String>,
    pub json: bool,
}

fn apply_overrides(config: &Config, overrides: &SearchOverrides) -> QueryConfig {
    let mut query = config.retrieval.query_config();
    if let Some(top_k) = overrides.top_k {
        query.top_k = top_k;
    }
    if let Some(threshold) = overrides.threshold {
        query.similarity_threshold = threshold;
    }
    if let Some(max_hops) = overrides.max_hops {
        query.max_hops = max_hops;
    }
    query
}

pub async fn run_search(
    config: &Config,
    cancel: &CancellationToken,
    query_text: &str,
    strategy: &str,
    overrides: &SearchOverrides,
) -> Result<()> {
    let strategy: Strategy = strategy.parse().map_err(|e: String| anyhow!(e))?;
    let pool = db::connect(config).await?;
    let retriever = crate::build_retriever(config, pool, false)?;
    let query_config = apply_overrides(config, overrides);

    let results = if overrides.documents.is_empty() {
        retriever
            .search(query_text, strategy, &query_config, cancel)
            .await?
    } else {
        let mut ids = Vec::with_capacity(overrides.documents.len());
        for reference in &overrides.documents {
            let doc = resolve_document(retriever.store().as_ref(), reference).await?;
            ids.push(doc);
        }
        retriever
            .search_documents(query_text, strategy, &ids, &query_config, cancel)
            .await?
    };

    render_results(&results, overrides.json)?;
    Ok(())
}

pub async fn run_entity_search(
    config: &Config,
    cancel: &CancellationToken,
    name: &str,
    entity_type: &str,
    overrides: &SearchOverrides,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let entity_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM entities WHERE name = $1 AND entity_type = $2")
            .bind(name)
            .bind(entity_type)
            .fetch_optional(&pool)
            .await?;
    let Some(entity_id) = entity_id else {
        bail!("no entity named {name:?} of type {entity_type:?}");
    };

    let retriever = crate::build_retriever(config, pool, false)?;
    let query_config = apply_overrides(config, overrides);
    let results = retriever
        .search_entity(entity_id, &query_config, cancel)
        .await?;

    render_results(&results, overrides.json)?;
    Ok(())
}

/// Accepts either an internal document id or an external ref_id.
async fn resolve_document(store: &dyn Store, reference: &str) -> Result<i64> {
    if let Ok(id) = reference.parse::<i64>() {
        if let Ok(doc) = store.get_document(id).await {
            return Ok(doc.id);
        }
    }
    Ok(store.get_document_by_ref(reference).await?.id)
}

fn render_results(results: &[RetrievalResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        let snippet: String = result.chunk.content.chars().take(160).collect();
        println!(
            "{:>2}. [{:.4}] {} d={} {}",
            rank + 1,
            result.score,
            result.method,
            result.graph_distance,
            result.chunk.path
        );
        println!("      {snippet}");
    }
    Ok(())
}
