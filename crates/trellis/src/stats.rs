//! Corpus statistics command.

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::db;

#[derive(Debug, Serialize)]
pub struct CorpusStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub entities: i64,
    pub edges: i64,
    pub entity_mention_edges: i64,
}

pub async fn gather(pool: &PgPool) -> Result<CorpusStats> {
    let documents = sqlx::query_scalar("SELECT count(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let chunks = sqlx::query_scalar("SELECT count(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let embedded_chunks =
        sqlx::query_scalar("SELECT count(*) FROM chunks WHERE embedding IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let entities = sqlx::query_scalar("SELECT count(*) FROM entities")
        .fetch_one(pool)
        .await?;
    let edges = sqlx::query_scalar("SELECT count(*) FROM edges")
        .fetch_one(pool)
        .await?;
    let entity_mention_edges =
        sqlx::query_scalar("SELECT count(*) FROM edges WHERE edge_type = 'entity_mention'")
            .fetch_one(pool)
            .await?;

    Ok(CorpusStats {
        documents,
        chunks,
        embedded_chunks,
        entities,
        edges,
        entity_mention_edges,
    })
}

pub async fn run_stats(config: &Config, json_out: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = gather(&pool).await?;

    if json_out {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("documents:            {}", stats.documents);
    println!("chunks:               {}", stats.chunks);
    println!("  with embeddings:    {}", stats.embedded_chunks);
    println!("entities:             {}", stats.entities);
    println!("edges:                {}", stats.edges);
    println!("  entity mentions:    {}", stats.entity_mention_edges);
    Ok(())
}
