//! Storage abstraction the retrieval engine is written against.
//!
//! The [`Store`] trait defines every persistence operation the engine
//! consumes: chunk/document/entity/edge CRUD, vector similarity, hierarchy
//! queries over dotted paths, and edge lookup by endpoint and type. Concrete
//! backends (Postgres + pgvector, in-memory) implement it; the engine holds
//! an `Arc<dyn Store>` and nothing else.
//!
//! Implementations must be `Send + Sync`; individual calls are serializable
//! and the engine never assumes transactional grouping across calls.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Chunk, ContextualChunk, Document, Edge, EdgeType, Entity, Metadata, NewChunk, NewDocument,
    NewEdge, NewEntity, ScoredChunk,
};
use crate::path::ChunkPath;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) … [`delete_document`](Store::delete_document) | Document lifecycle; deletion cascades to chunks and their edges |
/// | [`insert_chunk`](Store::insert_chunk) … [`delete_chunk`](Store::delete_chunk) | Chunk lifecycle, including embedding-only update |
/// | [`similar_chunks`](Store::similar_chunks) | Cosine-similarity search over embedded chunks |
/// | [`similar_chunks_with_context`](Store::similar_chunks_with_context) | Similarity search plus ancestor/descendant rows |
/// | [`chunks_by_path_ancestor`](Store::chunks_by_path_ancestor) etc. | Hierarchy queries over dotted paths |
/// | [`insert_entity`](Store::insert_entity) … [`chunks_by_entity`](Store::chunks_by_entity) | Entity upsert and mention lookup |
/// | [`insert_edge`](Store::insert_edge) … [`edges_to_entity`](Store::edges_to_entity) | Edge lifecycle and lookup by endpoint + type |
///
/// # Guarantees
///
/// - Every mutating call is atomic.
/// - Similarity results are ordered by descending similarity, carry the
///   similarity score, contain no duplicate ids, and only include chunks
///   that have an embedding.
/// - Embedding writes of a length other than [`dims`](Store::dims) fail
///   with `InvalidInput`.
/// - `(document_id, path)` is unique; `(name, entity_type)` upserts.
#[async_trait]
pub trait Store: Send + Sync {
    /// Vector dimensionality this store was initialized with.
    fn dims(&self) -> usize;

    // ── Documents ─────────────────────────────────────────────────────

    async fn insert_document(&self, doc: NewDocument) -> Result<Document>;

    async fn get_document(&self, id: i64) -> Result<Document>;

    /// Look up a document by its external reference id.
    async fn get_document_by_ref(&self, ref_id: &str) -> Result<Document>;

    /// Replace the document's metadata bag and bump `updated_at`.
    async fn update_document_metadata(&self, id: i64, metadata: Metadata) -> Result<Document>;

    /// Delete a document, its chunks, and all edges referencing them.
    async fn delete_document(&self, id: i64) -> Result<()>;

    // ── Chunks ────────────────────────────────────────────────────────

    async fn insert_chunk(&self, chunk: NewChunk) -> Result<Chunk>;

    async fn get_chunk(&self, id: i64) -> Result<Chunk>;

    /// Overwrite a chunk's embedding in place.
    async fn update_chunk_embedding(&self, id: i64, embedding: &[f32]) -> Result<()>;

    /// Delete a chunk and all edges referencing it.
    async fn delete_chunk(&self, id: i64) -> Result<()>;

    /// All chunks of a document, ordered by chunk index.
    async fn chunks_by_document(&self, document_id: i64) -> Result<Vec<Chunk>>;

    // ── Similarity ────────────────────────────────────────────────────

    /// Top-`k` chunks by cosine similarity to `query`.
    ///
    /// Only chunks with similarity ≥ `threshold` are returned. A non-empty
    /// `doc_filter` restricts results to chunks of those documents.
    async fn similar_chunks(
        &self,
        query: &[f32],
        k: usize,
        threshold: f64,
        doc_filter: &[i64],
    ) -> Result<Vec<ScoredChunk>>;

    /// Top-`k` similar chunks plus, per hit, its ancestor and/or descendant
    /// chunks. Primary hits carry `is_match = true` and a similarity score;
    /// context rows carry neither.
    async fn similar_chunks_with_context(
        &self,
        query: &[f32],
        k: usize,
        include_ancestors: bool,
        include_descendants: bool,
        threshold: f64,
        doc_filter: &[i64],
    ) -> Result<Vec<ContextualChunk>>;

    // ── Hierarchy ─────────────────────────────────────────────────────

    /// Chunks whose path is an ancestor of (or equal to) `path`, ordered by
    /// depth ascending.
    async fn chunks_by_path_ancestor(&self, path: &ChunkPath) -> Result<Vec<Chunk>>;

    /// Chunks whose path is a descendant of (or equal to) `path`.
    async fn chunks_by_path_descendant(&self, path: &ChunkPath) -> Result<Vec<Chunk>>;

    /// Chunks sharing `path`'s parent at the same depth, excluding `path`
    /// itself. Empty for depth-1 paths.
    async fn sibling_chunks(&self, path: &ChunkPath) -> Result<Vec<Chunk>>;

    // ── Entities ──────────────────────────────────────────────────────

    /// Insert an entity, or merge metadata into the existing record with
    /// the same `(name, entity_type)`. New metadata keys win.
    async fn insert_entity(&self, entity: NewEntity) -> Result<Entity>;

    async fn get_entity(&self, id: i64) -> Result<Entity>;

    /// Delete an entity and all edges referencing it.
    async fn delete_entity(&self, id: i64) -> Result<()>;

    /// Chunks connected to the entity by any `entity_mention` edge,
    /// regardless of edge direction.
    async fn chunks_by_entity(&self, entity_id: i64) -> Result<Vec<Chunk>>;

    // ── Edges ─────────────────────────────────────────────────────────

    async fn insert_edge(&self, edge: NewEdge) -> Result<Edge>;

    async fn get_edge(&self, id: i64) -> Result<Edge>;

    /// Replace an edge's weight and metadata in place.
    async fn update_edge(&self, id: i64, weight: f64, metadata: Metadata) -> Result<Edge>;

    async fn delete_edge(&self, id: i64) -> Result<()>;

    /// Edges whose source is the given chunk. An empty `edge_types` slice
    /// admits all types.
    async fn edges_from_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>>;

    /// Edges whose target is the given chunk.
    async fn edges_to_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>>;

    /// Edges whose source is the given entity.
    async fn edges_from_entity(&self, entity_id: i64, edge_types: &[EdgeType])
        -> Result<Vec<Edge>>;

    /// Edges whose target is the given entity.
    async fn edges_to_entity(&self, entity_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>>;
}

/// True if `edge_type` passes the allow-list (empty list admits all).
pub fn edge_type_allowed(edge_types: &[EdgeType], edge_type: EdgeType) -> bool {
    edge_types.is_empty() || edge_types.contains(&edge_type)
}
