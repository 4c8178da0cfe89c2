//! # Trellis
//!
//! Hybrid document retrieval over Postgres + pgvector: dense-vector
//! similarity fused with typed graph traversal and document-hierarchy
//! proximity. The engine itself lives in [`trellis_core`]; this crate
//! supplies everything around it:
//!
//! - [`config`] — TOML configuration parsing and validation
//! - [`db`] / [`migrate`] — Postgres connection and schema management,
//!   including the `hnsw`/`ivfflat` vector index
//! - [`pg_store`] — the pgvector-backed storage contract implementation
//! - [`embedding`] — OpenAI-compatible / Ollama embedding providers
//! - [`chunker`] — heading-aware chunking with dotted tree paths
//! - [`extract`] — pattern-based entities and co-occurrence relations
//! - [`ingest`], [`search`], [`get`], [`stats`] — CLI command drivers

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod pg_store;
pub mod search;
pub mod stats;

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use trellis_core::{Pipeline, Retriever};

use crate::chunker::HeadingChunker;
use crate::config::Config;
use crate::extract::{CooccurrenceRelationExtractor, PatternEntityExtractor};
use crate::pg_store::PgStore;

/// Wire a [`Retriever`] from config and a connected pool.
///
/// `with_extraction = false` skips the entity/relation extractors even when
/// the config enables them (used by `ingest --no-extract`).
pub fn build_retriever(config: &Config, pool: PgPool, with_extraction: bool) -> Result<Retriever> {
    let store = Arc::new(PgStore::new(pool, config.embedding.dims));
    let embedder = embedding::create_embedder(&config.embedding)?;
    let chunker = Arc::new(HeadingChunker::new(config.chunking.max_chars));

    let mut pipeline = Pipeline::new(chunker, embedder);
    if with_extraction && config.extraction.enabled {
        pipeline = pipeline
            .with_entity_extractor(Arc::new(PatternEntityExtractor::new()?))
            .with_relation_extractor(Arc::new(CooccurrenceRelationExtractor::new(
                config.extraction.max_pairs_per_chunk,
            )));
    }

    Ok(Retriever::new(store, pipeline)?)
}
