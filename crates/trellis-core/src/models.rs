//! Core data models flowing through ingestion and retrieval.
//!
//! Stored records (`Document`, `Chunk`, `Entity`, `Edge`) carry a
//! store-assigned `i64` id; their `New*` counterparts are what callers hand
//! to a [`Store`](crate::store::Store) for insertion. Edge endpoints are a
//! sum type so malformed edges (no endpoint, two endpoints on one side) are
//! unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::ChunkPath;

/// Free-form JSON metadata bag carried by every record.
///
/// Preserved losslessly through the storage layer; the engine never
/// interprets it except where documented (entity `confidence`).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A source document. Owns its chunks; deletion cascades.
///
/// Document content is never stored on the row itself — it is split into
/// chunks at ingest and only those carry text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned internal id.
    pub id: i64,
    /// Opaque external reference id, unique per store.
    pub ref_id: String,
    pub title: String,
    /// Origin tag naming where the document came from (file path, URL, feed).
    pub origin: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertion form of [`Document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub ref_id: String,
    pub title: String,
    pub origin: String,
    pub metadata: Metadata,
}

impl NewDocument {
    /// New document with a generated UUID reference id.
    pub fn new(title: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            ref_id: Uuid::new_v4().to_string(),
            title: title.into(),
            origin: origin.into(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The retrievable unit: a span of document text with a tree position and,
/// usually, an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    /// Position in the document tree; unique within the document.
    pub path: ChunkPath,
    /// Dense vector of the store's configured dimensionality, if embedded.
    pub embedding: Option<Vec<f32>>,
    /// Offsets of this chunk within the original document text.
    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,
    /// Zero-based position among the document's chunks.
    pub chunk_index: Option<i64>,
    pub metadata: Metadata,
}

/// Insertion form of [`Chunk`].
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: i64,
    pub content: String,
    pub path: ChunkPath,
    pub embedding: Option<Vec<f32>>,
    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,
    pub chunk_index: Option<i64>,
    pub metadata: Metadata,
}

impl NewChunk {
    pub fn new(document_id: i64, content: impl Into<String>, path: ChunkPath) -> Self {
        Self {
            document_id,
            content: content.into(),
            path,
            embedding: None,
            start_offset: None,
            end_offset: None,
            chunk_index: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: i64) -> Self {
        self.chunk_index = Some(index);
        self
    }
}

/// Chunker output: content plus the tree position it should be stored at.
#[derive(Debug, Clone)]
pub struct ChunkWithPath {
    pub content: String,
    /// Absolute path, rooted at the base path handed to the chunker.
    pub path: ChunkPath,
    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,
    /// Zero-based position within the document.
    pub index: i64,
    pub metadata: Metadata,
}

/// A named concept (person, place, organization, topic, ...).
///
/// `(name, entity_type)` is unique; re-insertion merges metadata into the
/// existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub entity_type: String,
    pub metadata: Metadata,
}

/// Insertion form of [`Entity`].
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    pub metadata: Metadata,
}

impl NewEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Confidence score read from metadata, defaulting to 0.
    pub fn confidence(&self) -> f64 {
        self.metadata
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}

/// One endpoint of an edge: a chunk or an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Chunk(i64),
    Entity(i64),
}

impl NodeRef {
    /// The chunk id, if this endpoint is a chunk.
    pub fn chunk_id(&self) -> Option<i64> {
        match self {
            NodeRef::Chunk(id) => Some(*id),
            NodeRef::Entity(_) => None,
        }
    }

    /// The entity id, if this endpoint is an entity.
    pub fn entity_id(&self) -> Option<i64> {
        match self {
            NodeRef::Entity(id) => Some(*id),
            NodeRef::Chunk(_) => None,
        }
    }
}

/// Relation categories an edge can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Semantic,
    Hierarchical,
    Reference,
    EntityMention,
    Temporal,
    Causal,
    Custom,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Semantic => "semantic",
            EdgeType::Hierarchical => "hierarchical",
            EdgeType::Reference => "reference",
            EdgeType::EntityMention => "entity_mention",
            EdgeType::Temporal => "temporal",
            EdgeType::Causal => "causal",
            EdgeType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<EdgeType> {
        match s {
            "semantic" => Some(EdgeType::Semantic),
            "hierarchical" => Some(EdgeType::Hierarchical),
            "reference" => Some(EdgeType::Reference),
            "entity_mention" => Some(EdgeType::EntityMention),
            "temporal" => Some(EdgeType::Temporal),
            "causal" => Some(EdgeType::Causal),
            "custom" => Some(EdgeType::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed directed relation between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: i64,
    pub source: NodeRef,
    pub target: NodeRef,
    pub edge_type: EdgeType,
    pub weight: f64,
    /// When true, the edge may also be traversed from target back to source.
    pub bidirectional: bool,
    pub metadata: Metadata,
}

/// Insertion form of [`Edge`].
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source: NodeRef,
    pub target: NodeRef,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub bidirectional: bool,
    pub metadata: Metadata,
}

impl NewEdge {
    pub fn new(source: NodeRef, target: NodeRef, edge_type: EdgeType) -> Self {
        Self {
            source,
            target,
            edge_type,
            weight: 1.0,
            bidirectional: false,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A chunk returned from similarity search with its cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// `1 − cosine distance`; higher is more similar.
    pub similarity: f64,
}

/// A row from context-expanded similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ContextualChunk {
    pub chunk: Chunk,
    /// Similarity on primary hits; absent on context rows.
    pub similarity: Option<f64>,
    /// True for the top-k matches, false for ancestor/descendant expansions.
    pub is_match: bool,
}

/// A chunk reached by graph traversal.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalResult {
    pub chunk: Chunk,
    /// Hops from the traversal source; 0 for the source itself.
    pub distance: usize,
    /// Chunk ids walked from source to this chunk, inclusive on both ends.
    /// Always `distance + 1` long and owned per result.
    pub path: Vec<i64>,
}

/// Which retrieval stage produced (or first produced) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Vector,
    GraphNeighbor,
    Hierarchical,
    MultiHop,
    Hybrid,
    EntityCentric,
    EntityFanout,
}

impl std::fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetrievalMethod::Vector => "vector",
            RetrievalMethod::GraphNeighbor => "graph_neighbor",
            RetrievalMethod::Hierarchical => "hierarchical",
            RetrievalMethod::MultiHop => "multi_hop",
            RetrievalMethod::Hybrid => "hybrid",
            RetrievalMethod::EntityCentric => "entity_centric",
            RetrievalMethod::EntityFanout => "entity_fanout",
        };
        f.write_str(s)
    }
}

/// A fused retrieval result returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Combined score after weighting; ordering key for final ranking.
    pub score: f64,
    /// Raw cosine similarity for vector hits; 0 for purely structural hits.
    pub similarity: f64,
    /// Graph distance from the seed that pulled this chunk in; 0 for
    /// non-graph results.
    pub graph_distance: usize,
    pub method: RetrievalMethod,
}
