//! Pluggable ingestion pipeline: chunking, embedding, and graph extraction.
//!
//! The engine consumes these traits and never touches a model or an API
//! directly. Chunking and extraction are synchronous (pure text work);
//! embedding is async because production providers sit behind HTTP.
//!
//! Entity and relation extraction are optional: a pipeline without them
//! ingests chunks with no entities or edges, and entity-centric retrieval
//! simply finds nothing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkWithPath, Entity, EdgeType, Metadata, NewEdge};
use crate::path::ChunkPath;

/// Splits document text into chunks positioned under a base path.
pub trait Chunker: Send + Sync {
    /// Chunk `text` into ordered pieces whose paths are rooted at `base`.
    ///
    /// Implementations must return at least one chunk for non-empty text and
    /// assign contiguous indices starting at 0.
    fn chunk(&self, text: &str, base: &ChunkPath) -> Result<Vec<ChunkWithPath>>;
}

/// Produces dense embeddings of a fixed dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. The returned vector must be exactly
    /// [`dims`](Embedder::dims) long.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality this embedder produces.
    fn dims(&self) -> usize;

    /// Model identifier, for logging and stats.
    fn model_name(&self) -> &str;
}

/// An entity mention found in chunk text, before persistence.
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    /// May carry `confidence` and span offsets; merged into the stored
    /// entity's metadata.
    pub metadata: Metadata,
}

impl ExtractedEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata
            .insert("confidence".into(), serde_json::json!(confidence));
        self
    }

    /// Confidence score read from metadata, defaulting to 0.
    pub fn confidence(&self) -> f64 {
        self.metadata
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// Key used for within-document deduplication.
    pub fn dedup_key(&self) -> (String, String) {
        (self.name.to_lowercase(), self.entity_type.clone())
    }
}

/// A relation between two extracted entities, referenced by name because
/// neither side has an id yet.
#[derive(Debug, Clone)]
pub struct ExtractedRelation {
    pub source_name: String,
    pub target_name: String,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub bidirectional: bool,
    pub metadata: Metadata,
}

/// Finds entity mentions in chunk text.
pub trait EntityExtractor: Send + Sync {
    fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>>;
}

/// Derives edges from chunk text and the entities already persisted for it.
pub trait RelationExtractor: Send + Sync {
    /// `entities` are the stored records mentioned in this chunk, so the
    /// returned edges can reference real ids.
    fn extract_relations(
        &self,
        text: &str,
        chunk_id: i64,
        entities: &[Entity],
    ) -> Result<Vec<NewEdge>>;
}

/// Joint entity + relation extraction. When configured, takes precedence
/// over the separate [`EntityExtractor`] / [`RelationExtractor`] pair.
pub trait GraphExtractor: Send + Sync {
    fn extract_graph(&self, text: &str)
        -> Result<(Vec<ExtractedEntity>, Vec<ExtractedRelation>)>;
}

/// Bundle of pipeline stages handed to the retriever.
#[derive(Clone)]
pub struct Pipeline {
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub entity_extractor: Option<Arc<dyn EntityExtractor>>,
    pub relation_extractor: Option<Arc<dyn RelationExtractor>>,
    pub graph_extractor: Option<Arc<dyn GraphExtractor>>,
}

impl Pipeline {
    pub fn new(chunker: Arc<dyn Chunker>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            chunker,
            embedder,
            entity_extractor: None,
            relation_extractor: None,
            graph_extractor: None,
        }
    }

    #[must_use]
    pub fn with_entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_relation_extractor(mut self, extractor: Arc<dyn RelationExtractor>) -> Self {
        self.relation_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_graph_extractor(mut self, extractor: Arc<dyn GraphExtractor>) -> Self {
        self.graph_extractor = Some(extractor);
        self
    }

    /// True if any form of graph extraction is configured.
    pub fn extracts_graph(&self) -> bool {
        self.graph_extractor.is_some() || self.entity_extractor.is_some()
    }
}
