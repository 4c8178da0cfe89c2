//! Configuration parsing and validation.
//!
//! Trellis is configured via a TOML file (default: `trellis.toml`). The
//! config defines the database connection, chunking parameters, embedding
//! provider settings, retrieval defaults, the vector index, and graph
//! extraction switches.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use trellis_core::QueryConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL, e.g. `postgres://localhost/trellis`.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk before a hard split.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Vector dimensionality; must match the database schema.
    pub dims: usize,
    /// Base URL override (OpenAI-compatible gateways, local Ollama).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Defaults for every [`QueryConfig`] knob, overridable per query on the
/// command line.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default)]
    pub include_ancestors: bool,
    #[serde(default)]
    pub include_descendants: bool,
    #[serde(default = "default_true")]
    pub include_siblings: bool,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f64,
    #[serde(default = "default_hierarchy_weight")]
    pub hierarchy_weight: f64,
    #[serde(default = "default_entity_weight")]
    pub entity_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            max_hops: default_max_hops(),
            include_ancestors: false,
            include_descendants: false,
            include_siblings: true,
            vector_weight: default_vector_weight(),
            graph_weight: default_graph_weight(),
            hierarchy_weight: default_hierarchy_weight(),
            entity_weight: default_entity_weight(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_max_hops() -> usize {
    2
}
fn default_true() -> bool {
    true
}
fn default_vector_weight() -> f64 {
    0.6
}
fn default_graph_weight() -> f64 {
    0.3
}
fn default_hierarchy_weight() -> f64 {
    0.1
}
fn default_entity_weight() -> f64 {
    0.5
}

impl RetrievalConfig {
    /// Materialize a [`QueryConfig`] from the configured defaults.
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            top_k: self.top_k,
            similarity_threshold: self.similarity_threshold,
            max_hops: self.max_hops,
            include_ancestors: self.include_ancestors,
            include_descendants: self.include_descendants,
            include_siblings: self.include_siblings,
            vector_weight: self.vector_weight,
            graph_weight: self.graph_weight,
            hierarchy_weight: self.hierarchy_weight,
            entity_weight: self.entity_weight,
            ..QueryConfig::default()
        }
    }
}

/// Vector index selection. Changes are applied online by `trellis reindex`.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `hnsw` (high-recall graph index) or `ivfflat` (partitioned lists).
    #[serde(default = "default_index_kind")]
    pub kind: String,
    /// HNSW: max connections per node.
    #[serde(default = "default_hnsw_m")]
    pub m: u32,
    /// HNSW: candidate list size during build.
    #[serde(default = "default_hnsw_ef_construction")]
    pub ef_construction: u32,
    /// IVFFlat: number of inverted lists.
    #[serde(default = "default_ivfflat_lists")]
    pub lists: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: default_index_kind(),
            m: default_hnsw_m(),
            ef_construction: default_hnsw_ef_construction(),
            lists: default_ivfflat_lists(),
        }
    }
}

fn default_index_kind() -> String {
    "hnsw".to_string()
}
fn default_hnsw_m() -> u32 {
    16
}
fn default_hnsw_ef_construction() -> u32 {
    64
}
fn default_ivfflat_lists() -> u32 {
    100
}

/// Entity/relation extraction switches.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cap on co-occurrence pairs linked per chunk.
    #[serde(default = "default_max_pairs")]
    pub max_pairs_per_chunk: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pairs_per_chunk: default_max_pairs(),
        }
    }
}

fn default_max_pairs() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }
    for (name, weight) in [
        ("vector_weight", config.retrieval.vector_weight),
        ("graph_weight", config.retrieval.graph_weight),
        ("hierarchy_weight", config.retrieval.hierarchy_weight),
        ("entity_weight", config.retrieval.entity_weight),
    ] {
        if weight < 0.0 {
            anyhow::bail!("retrieval.{name} must be >= 0");
        }
    }

    match config.index.kind.as_str() {
        "hnsw" | "ivfflat" => {}
        other => anyhow::bail!("Unknown index kind: '{}'. Must be hnsw or ivfflat.", other),
    }

    Ok(config)
}
