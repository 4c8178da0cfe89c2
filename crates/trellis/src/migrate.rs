//! Database schema migrations.
//!
//! Creates the pgvector extension, all tables (documents, chunks, entities,
//! edges), supporting indexes, and the configured vector index. Idempotent;
//! run via `trellis init`. The vector column is sized from
//! `embedding.dims`, so changing dimensionality requires a fresh schema.

use anyhow::Result;
use sqlx::PgPool;

use crate::config::{Config, IndexConfig};

pub async fn run_migrations(pool: &PgPool, config: &Config) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id BIGSERIAL PRIMARY KEY,
            ref_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            origin TEXT NOT NULL DEFAULT '',
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id BIGSERIAL PRIMARY KEY,
            document_id BIGINT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            content TEXT NOT NULL,
            path TEXT NOT NULL,
            embedding vector({dims}),
            start_offset BIGINT,
            end_offset BIGINT,
            chunk_index BIGINT,
            metadata JSONB NOT NULL DEFAULT '{{}}',
            UNIQUE (document_id, path)
        )
        "#,
        dims = config.embedding.dims
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            UNIQUE (name, entity_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Exactly one endpoint on each side; deleting a chunk or entity takes
    // its edges with it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edges (
            id BIGSERIAL PRIMARY KEY,
            source_chunk_id BIGINT REFERENCES chunks(id) ON DELETE CASCADE,
            source_entity_id BIGINT REFERENCES entities(id) ON DELETE CASCADE,
            target_chunk_id BIGINT REFERENCES chunks(id) ON DELETE CASCADE,
            target_entity_id BIGINT REFERENCES entities(id) ON DELETE CASCADE,
            edge_type TEXT NOT NULL,
            weight DOUBLE PRECISION NOT NULL DEFAULT 1.0,
            bidirectional BOOLEAN NOT NULL DEFAULT FALSE,
            metadata JSONB NOT NULL DEFAULT '{}',
            CHECK ((source_chunk_id IS NULL) <> (source_entity_id IS NULL)),
            CHECK ((target_chunk_id IS NULL) <> (target_entity_id IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path text_pattern_ops)",
        "CREATE INDEX IF NOT EXISTS idx_edges_source_chunk ON edges(source_chunk_id)",
        "CREATE INDEX IF NOT EXISTS idx_edges_target_chunk ON edges(target_chunk_id)",
        "CREATE INDEX IF NOT EXISTS idx_edges_source_entity ON edges(source_entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_edges_target_entity ON edges(target_entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    create_vector_index(pool, &config.index).await?;

    Ok(())
}

fn index_name(kind: &str) -> String {
    format!("chunks_embedding_{kind}")
}

/// DDL for the configured ANN index over the embedding column.
fn vector_index_ddl(index: &IndexConfig) -> String {
    match index.kind.as_str() {
        "ivfflat" => format!(
            "CREATE INDEX IF NOT EXISTS {} ON chunks \
             USING ivfflat (embedding vector_cosine_ops) WITH (lists = {})",
            index_name("ivfflat"),
            index.lists
        ),
        _ => format!(
            "CREATE INDEX IF NOT EXISTS {} ON chunks \
             USING hnsw (embedding vector_cosine_ops) WITH (m = {}, ef_construction = {})",
            index_name("hnsw"),
            index.m,
            index.ef_construction
        ),
    }
}

pub async fn create_vector_index(pool: &PgPool, index: &IndexConfig) -> Result<()> {
    sqlx::query(&vector_index_ddl(index)).execute(pool).await?;
    Ok(())
}

/// Switch the vector index kind online: build the new index first, then
/// drop the other kind's index if present. Data is untouched.
pub async fn reindex(pool: &PgPool, index: &IndexConfig) -> Result<()> {
    create_vector_index(pool, index).await?;
    let other = match index.kind.as_str() {
        "ivfflat" => "hnsw",
        _ => "ivfflat",
    };
    sqlx::query(&format!("DROP INDEX IF EXISTS {}", index_name(other)))
        .execute(pool)
        .await?;
    Ok(())
}
