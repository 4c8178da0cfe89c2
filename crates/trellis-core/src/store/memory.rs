//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Records live in `BTreeMap`s behind a `std::sync::RwLock`, so iteration
//! order is id order, which equals insertion order (ids are monotonic).
//! Vector search is brute-force cosine similarity over all stored
//! embeddings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{
    Chunk, ContextualChunk, Document, Edge, EdgeType, Entity, Metadata, NewChunk, NewDocument,
    NewEdge, NewEntity, NodeRef, ScoredChunk,
};
use crate::path::ChunkPath;
use crate::vector::{check_dims, cosine_similarity};

use super::{edge_type_allowed, Store};

#[derive(Default)]
struct Inner {
    documents: BTreeMap<i64, Document>,
    chunks: BTreeMap<i64, Chunk>,
    entities: BTreeMap<i64, Entity>,
    edges: BTreeMap<i64, Edge>,
}

/// In-memory store with brute-force similarity search.
pub struct MemoryStore {
    dims: usize,
    next_id: AtomicI64,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store for embeddings of length `dims`.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            next_id: AtomicI64::new(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Inner {
    fn remove_edges_referencing(&mut self, node: NodeRef) {
        self.edges
            .retain(|_, e| e.source != node && e.target != node);
    }

    fn chunk_ids_of_document(&self, document_id: i64) -> Vec<i64> {
        self.chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id)
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn insert_document(&self, doc: NewDocument) -> Result<Document> {
        let mut inner = self.inner.write().unwrap();
        if inner.documents.values().any(|d| d.ref_id == doc.ref_id) {
            return Err(Error::InvalidInput(format!(
                "document ref_id already exists: {}",
                doc.ref_id
            )));
        }
        let now = Utc::now();
        let stored = Document {
            id: self.alloc_id(),
            ref_id: doc.ref_id,
            title: doc.title,
            origin: doc.origin,
            metadata: doc.metadata,
            created_at: now,
            updated_at: now,
        };
        inner.documents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_document(&self, id: i64) -> Result<Document> {
        let inner = self.inner.read().unwrap();
        inner
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("document", id))
    }

    async fn get_document_by_ref(&self, ref_id: &str) -> Result<Document> {
        let inner = self.inner.read().unwrap();
        inner
            .documents
            .values()
            .find(|d| d.ref_id == ref_id)
            .cloned()
            .ok_or_else(|| Error::not_found("document", ref_id))
    }

    async fn update_document_metadata(&self, id: i64, metadata: Metadata) -> Result<Document> {
        let mut inner = self.inner.write().unwrap();
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("document", id))?;
        doc.metadata = metadata;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn delete_document(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.documents.remove(&id).is_none() {
            return Err(Error::not_found("document", id));
        }
        let chunk_ids = inner.chunk_ids_of_document(id);
        for chunk_id in chunk_ids {
            inner.chunks.remove(&chunk_id);
            inner.remove_edges_referencing(NodeRef::Chunk(chunk_id));
        }
        Ok(())
    }

    async fn insert_chunk(&self, chunk: NewChunk) -> Result<Chunk> {
        let mut inner = self.inner.write().unwrap();
        if !inner.documents.contains_key(&chunk.document_id) {
            return Err(Error::not_found("document", chunk.document_id));
        }
        if let Some(ref embedding) = chunk.embedding {
            check_dims(self.dims, embedding)?;
        }
        if inner
            .chunks
            .values()
            .any(|c| c.document_id == chunk.document_id && c.path == chunk.path)
        {
            return Err(Error::InvalidInput(format!(
                "chunk path already exists in document {}: {}",
                chunk.document_id, chunk.path
            )));
        }
        let stored = Chunk {
            id: self.alloc_id(),
            document_id: chunk.document_id,
            content: chunk.content,
            path: chunk.path,
            embedding: chunk.embedding,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            chunk_index: chunk.chunk_index,
            metadata: chunk.metadata,
        };
        inner.chunks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_chunk(&self, id: i64) -> Result<Chunk> {
        let inner = self.inner.read().unwrap();
        inner
            .chunks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("chunk", id))
    }

    async fn update_chunk_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        check_dims(self.dims, embedding)?;
        let mut inner = self.inner.write().unwrap();
        let chunk = inner
            .chunks
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("chunk", id))?;
        chunk.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn delete_chunk(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.chunks.remove(&id).is_none() {
            return Err(Error::not_found("chunk", id));
        }
        inner.remove_edges_referencing(NodeRef::Chunk(id));
        Ok(())
    }

    async fn chunks_by_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        if !inner.documents.contains_key(&document_id) {
            return Err(Error::not_found("document", document_id));
        }
        let mut chunks: Vec<Chunk> = inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| (c.chunk_index.is_none(), c.chunk_index, c.id));
        Ok(chunks)
    }

    async fn similar_chunks(
        &self,
        query: &[f32],
        k: usize,
        threshold: f64,
        doc_filter: &[i64],
    ) -> Result<Vec<ScoredChunk>> {
        check_dims(self.dims, query)?;
        let inner = self.inner.read().unwrap();
        let mut scored: Vec<ScoredChunk> = inner
            .chunks
            .values()
            .filter(|c| doc_filter.is_empty() || doc_filter.contains(&c.document_id))
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let similarity = cosine_similarity(query, embedding);
                if similarity >= threshold {
                    Some(ScoredChunk {
                        chunk: c.clone(),
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn similar_chunks_with_context(
        &self,
        query: &[f32],
        k: usize,
        include_ancestors: bool,
        include_descendants: bool,
        threshold: f64,
        doc_filter: &[i64],
    ) -> Result<Vec<ContextualChunk>> {
        let matches = self
            .similar_chunks(query, k, threshold, doc_filter)
            .await?;

        let inner = self.inner.read().unwrap();
        let mut out: Vec<ContextualChunk> = Vec::new();
        let mut seen: std::collections::HashSet<i64> = std::collections::HashSet::new();

        for hit in matches {
            seen.insert(hit.chunk.id);
            let path = hit.chunk.path.clone();
            out.push(ContextualChunk {
                chunk: hit.chunk,
                similarity: Some(hit.similarity),
                is_match: true,
            });

            let mut context: Vec<&Chunk> = Vec::new();
            if include_ancestors {
                let mut ancestors: Vec<&Chunk> = inner
                    .chunks
                    .values()
                    .filter(|c| c.path.is_ancestor_of(&path))
                    .collect();
                ancestors.sort_by_key(|c| c.path.depth());
                context.extend(ancestors);
            }
            if include_descendants {
                context.extend(
                    inner
                        .chunks
                        .values()
                        .filter(|c| c.path.is_descendant_of(&path)),
                );
            }
            for c in context {
                if seen.insert(c.id) {
                    out.push(ContextualChunk {
                        chunk: c.clone(),
                        similarity: None,
                        is_match: false,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn chunks_by_path_ancestor(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        let mut chunks: Vec<Chunk> = inner
            .chunks
            .values()
            .filter(|c| c.path == *path || c.path.is_ancestor_of(path))
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.path.depth());
        Ok(chunks)
    }

    async fn chunks_by_path_descendant(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .chunks
            .values()
            .filter(|c| c.path == *path || c.path.is_descendant_of(path))
            .cloned()
            .collect())
    }

    async fn sibling_chunks(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .chunks
            .values()
            .filter(|c| c.path.is_sibling_of(path))
            .cloned()
            .collect())
    }

    async fn insert_entity(&self, entity: NewEntity) -> Result<Entity> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner
            .entities
            .values_mut()
            .find(|e| e.name == entity.name && e.entity_type == entity.entity_type)
        {
            // Shallow merge; incoming keys win.
            for (key, value) in entity.metadata {
                existing.metadata.insert(key, value);
            }
            return Ok(existing.clone());
        }
        let stored = Entity {
            id: self.alloc_id(),
            name: entity.name,
            entity_type: entity.entity_type,
            metadata: entity.metadata,
        };
        inner.entities.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_entity(&self, id: i64) -> Result<Entity> {
        let inner = self.inner.read().unwrap();
        inner
            .entities
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("entity", id))
    }

    async fn delete_entity(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.entities.remove(&id).is_none() {
            return Err(Error::not_found("entity", id));
        }
        inner.remove_edges_referencing(NodeRef::Entity(id));
        Ok(())
    }

    async fn chunks_by_entity(&self, entity_id: i64) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        if !inner.entities.contains_key(&entity_id) {
            return Err(Error::not_found("entity", entity_id));
        }
        let node = NodeRef::Entity(entity_id);
        let mut seen = std::collections::HashSet::new();
        let mut chunks = Vec::new();
        for edge in inner.edges.values() {
            if edge.edge_type != EdgeType::EntityMention {
                continue;
            }
            let other = if edge.source == node {
                edge.target
            } else if edge.target == node {
                edge.source
            } else {
                continue;
            };
            if let Some(chunk_id) = other.chunk_id() {
                if seen.insert(chunk_id) {
                    if let Some(chunk) = inner.chunks.get(&chunk_id) {
                        chunks.push(chunk.clone());
                    }
                }
            }
        }
        Ok(chunks)
    }

    async fn insert_edge(&self, edge: NewEdge) -> Result<Edge> {
        let mut inner = self.inner.write().unwrap();
        for endpoint in [edge.source, edge.target] {
            match endpoint {
                NodeRef::Chunk(id) if !inner.chunks.contains_key(&id) => {
                    return Err(Error::not_found("chunk", id));
                }
                NodeRef::Entity(id) if !inner.entities.contains_key(&id) => {
                    return Err(Error::not_found("entity", id));
                }
                _ => {}
            }
        }
        let stored = Edge {
            id: self.alloc_id(),
            source: edge.source,
            target: edge.target,
            edge_type: edge.edge_type,
            weight: edge.weight,
            bidirectional: edge.bidirectional,
            metadata: edge.metadata,
        };
        inner.edges.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_edge(&self, id: i64) -> Result<Edge> {
        let inner = self.inner.read().unwrap();
        inner
            .edges
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("edge", id))
    }

    async fn update_edge(&self, id: i64, weight: f64, metadata: Metadata) -> Result<Edge> {
        let mut inner = self.inner.write().unwrap();
        let edge = inner
            .edges
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("edge", id))?;
        edge.weight = weight;
        edge.metadata = metadata;
        Ok(edge.clone())
    }

    async fn delete_edge(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .edges
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("edge", id))
    }

    async fn edges_from_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .edges
            .values()
            .filter(|e| e.source == NodeRef::Chunk(chunk_id))
            .filter(|e| edge_type_allowed(edge_types, e.edge_type))
            .cloned()
            .collect())
    }

    async fn edges_to_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .edges
            .values()
            .filter(|e| e.target == NodeRef::Chunk(chunk_id))
            .filter(|e| edge_type_allowed(edge_types, e.edge_type))
            .cloned()
            .collect())
    }

    async fn edges_from_entity(
        &self,
        entity_id: i64,
        edge_types: &[EdgeType],
    ) -> Result<Vec<Edge>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .edges
            .values()
            .filter(|e| e.source == NodeRef::Entity(entity_id))
            .filter(|e| edge_type_allowed(edge_types, e.edge_type))
            .cloned()
            .collect())
    }

    async fn edges_to_entity(&self, entity_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .edges
            .values()
            .filter(|e| e.target == NodeRef::Entity(entity_id))
            .filter(|e| edge_type_allowed(edge_types, e.edge_type))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ChunkPath {
        s.parse().unwrap()
    }

    async fn store_with_doc() -> (MemoryStore, Document) {
        let store = MemoryStore::new(3);
        let doc = store
            .insert_document(NewDocument::new("Test", "unit"))
            .await
            .unwrap();
        (store, doc)
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let (store, doc) = store_with_doc().await;
        let fetched = store.get_document(doc.id).await.unwrap();
        assert_eq!(fetched.title, "Test");
        assert_eq!(fetched.ref_id, doc.ref_id);
        let by_ref = store.get_document_by_ref(&doc.ref_id).await.unwrap();
        assert_eq!(by_ref.id, doc.id);
    }

    #[tokio::test]
    async fn test_duplicate_ref_id_rejected() {
        let (store, doc) = store_with_doc().await;
        let dup = NewDocument::new("Other", "unit").with_ref_id(doc.ref_id.clone());
        assert!(matches!(
            store.insert_document(dup).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_chunk_dimension_enforced() {
        let (store, doc) = store_with_doc().await;
        let bad = NewChunk::new(doc.id, "text", path("d.p1")).with_embedding(vec![1.0, 2.0]);
        assert!(matches!(
            store.insert_chunk(bad).await,
            Err(Error::InvalidInput(_))
        ));
        let good =
            NewChunk::new(doc.id, "text", path("d.p1")).with_embedding(vec![1.0, 0.0, 0.0]);
        let chunk = store.insert_chunk(good).await.unwrap();
        assert!(store
            .update_chunk_embedding(chunk.id, &[0.0, 1.0])
            .await
            .is_err());
        assert!(store
            .update_chunk_embedding(chunk.id, &[0.0, 1.0, 0.0])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_path_rejected_within_document() {
        let (store, doc) = store_with_doc().await;
        store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        assert!(store
            .insert_chunk(NewChunk::new(doc.id, "b", path("d.p1")))
            .await
            .is_err());

        // Same path in another document is allowed.
        let other = store
            .insert_document(NewDocument::new("Other", "unit"))
            .await
            .unwrap();
        assert!(store
            .insert_chunk(NewChunk::new(other.id, "c", path("d.p1")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_similarity_ordering_and_threshold() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(
                NewChunk::new(doc.id, "one", path("d.p1")).with_embedding(vec![1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .insert_chunk(
                NewChunk::new(doc.id, "two", path("d.p2")).with_embedding(vec![0.0, 1.0, 0.0]),
            )
            .await
            .unwrap();
        // No embedding: never returned.
        store
            .insert_chunk(NewChunk::new(doc.id, "three", path("d.p3")))
            .await
            .unwrap();

        let hits = store
            .similar_chunks(&[1.0, 0.0, 0.0], 1, 0.0, &[])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, c1.id);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);

        let none = store
            .similar_chunks(&[1.0, 0.0, 0.0], 5, 0.99, &[])
            .await
            .unwrap();
        assert_eq!(none.len(), 1, "only the exact match clears 0.99");

        let strict = store
            .similar_chunks(&[0.5, 0.5, 0.0], 5, 0.99, &[])
            .await
            .unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_similarity_doc_filter() {
        let (store, doc) = store_with_doc().await;
        let other = store
            .insert_document(NewDocument::new("Other", "unit"))
            .await
            .unwrap();
        store
            .insert_chunk(
                NewChunk::new(doc.id, "a", path("a.p1")).with_embedding(vec![1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        let wanted = store
            .insert_chunk(
                NewChunk::new(other.id, "b", path("b.p1")).with_embedding(vec![1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();

        let hits = store
            .similar_chunks(&[1.0, 0.0, 0.0], 10, 0.0, &[other.id])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, wanted.id);
    }

    #[tokio::test]
    async fn test_similarity_with_context_marks_matches() {
        let (store, doc) = store_with_doc().await;
        store
            .insert_chunk(NewChunk::new(doc.id, "root", path("d")))
            .await
            .unwrap();
        let mid = store
            .insert_chunk(
                NewChunk::new(doc.id, "mid", path("d.s1")).with_embedding(vec![1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .insert_chunk(NewChunk::new(doc.id, "leaf", path("d.s1.p1")))
            .await
            .unwrap();

        let rows = store
            .similar_chunks_with_context(&[1.0, 0.0, 0.0], 5, true, true, 0.5, &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        let hit = rows.iter().find(|r| r.chunk.id == mid.id).unwrap();
        assert!(hit.is_match);
        assert!(hit.similarity.is_some());
        for row in rows.iter().filter(|r| r.chunk.id != mid.id) {
            assert!(!row.is_match);
            assert!(row.similarity.is_none());
        }
    }

    #[tokio::test]
    async fn test_hierarchy_queries() {
        let (store, doc) = store_with_doc().await;
        for p in ["root", "root.s1", "root.s1.p1", "root.s1.p2", "root.s2.p1"] {
            store
                .insert_chunk(NewChunk::new(doc.id, p, path(p)))
                .await
                .unwrap();
        }

        let ancestors = store
            .chunks_by_path_ancestor(&path("root.s1.p1"))
            .await
            .unwrap();
        let paths: Vec<String> = ancestors.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["root", "root.s1", "root.s1.p1"]);

        let descendants = store
            .chunks_by_path_descendant(&path("root.s1"))
            .await
            .unwrap();
        assert_eq!(descendants.len(), 3);

        let siblings = store.sibling_chunks(&path("root.s1.p1")).await.unwrap();
        let sib_paths: Vec<String> = siblings.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(sib_paths, vec!["root.s1.p2"]);

        assert!(store.sibling_chunks(&path("root")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entity_upsert_merges_metadata() {
        let store = MemoryStore::new(3);
        let mut meta = Metadata::new();
        meta.insert("confidence".into(), serde_json::json!(0.5));
        let first = store
            .insert_entity(NewEntity::new("Ada", "person").with_metadata(meta))
            .await
            .unwrap();

        let mut meta2 = Metadata::new();
        meta2.insert("confidence".into(), serde_json::json!(0.9));
        meta2.insert("source".into(), serde_json::json!("unit"));
        let second = store
            .insert_entity(NewEntity::new("Ada", "person").with_metadata(meta2))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.metadata["confidence"], serde_json::json!(0.9));
        assert_eq!(second.metadata["source"], serde_json::json!("unit"));

        // Different type is a different entity.
        let topic = store.insert_entity(NewEntity::new("Ada", "topic")).await.unwrap();
        assert_ne!(topic.id, first.id);
    }

    #[tokio::test]
    async fn test_chunks_by_entity_direction_agnostic() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        let c2 = store
            .insert_chunk(NewChunk::new(doc.id, "b", path("d.p2")))
            .await
            .unwrap();
        let entity = store.insert_entity(NewEntity::new("Ada", "person")).await.unwrap();

        store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Entity(entity.id),
                EdgeType::EntityMention,
            ))
            .await
            .unwrap();
        store
            .insert_edge(NewEdge::new(
                NodeRef::Entity(entity.id),
                NodeRef::Chunk(c2.id),
                EdgeType::EntityMention,
            ))
            .await
            .unwrap();
        // Non-mention edges are ignored.
        store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Entity(entity.id),
                EdgeType::Semantic,
            ))
            .await
            .unwrap();

        let chunks = store.chunks_by_entity(entity.id).await.unwrap();
        let ids: Vec<i64> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c1.id, c2.id]);

        assert!(store.chunks_by_entity(9999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_document_delete_cascades() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        let c2 = store
            .insert_chunk(NewChunk::new(doc.id, "b", path("d.p2")))
            .await
            .unwrap();
        let edge = store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Chunk(c2.id),
                EdgeType::Semantic,
            ))
            .await
            .unwrap();

        store.delete_document(doc.id).await.unwrap();
        assert!(store.get_chunk(c1.id).await.unwrap_err().is_not_found());
        assert!(store.get_edge(edge.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_edge_lookup_filters_by_type() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        let c2 = store
            .insert_chunk(NewChunk::new(doc.id, "b", path("d.p2")))
            .await
            .unwrap();
        store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Chunk(c2.id),
                EdgeType::Semantic,
            ))
            .await
            .unwrap();
        store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Chunk(c2.id),
                EdgeType::Reference,
            ))
            .await
            .unwrap();

        let all = store.edges_from_chunk(c1.id, &[]).await.unwrap();
        assert_eq!(all.len(), 2);
        let semantic = store
            .edges_from_chunk(c1.id, &[EdgeType::Semantic])
            .await
            .unwrap();
        assert_eq!(semantic.len(), 1);
        let to = store.edges_to_chunk(c2.id, &[]).await.unwrap();
        assert_eq!(to.len(), 2);
    }

    #[tokio::test]
    async fn test_edge_update_roundtrip() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        let c2 = store
            .insert_chunk(NewChunk::new(doc.id, "b", path("d.p2")))
            .await
            .unwrap();
        let edge = store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Chunk(c2.id),
                EdgeType::Reference,
            ))
            .await
            .unwrap();
        assert_eq!(edge.weight, 1.0);

        let mut meta = Metadata::new();
        meta.insert("provenance".into(), serde_json::json!("manual"));
        let updated = store.update_edge(edge.id, 2.5, meta).await.unwrap();
        assert_eq!(updated.weight, 2.5);

        let fetched = store.get_edge(edge.id).await.unwrap();
        assert_eq!(fetched.weight, 2.5);
        assert_eq!(fetched.metadata["provenance"], serde_json::json!("manual"));
        assert_eq!(fetched.source, NodeRef::Chunk(c1.id));

        assert!(store
            .update_edge(9999, 1.0, Metadata::new())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_edge_requires_existing_endpoints() {
        let (store, doc) = store_with_doc().await;
        let c1 = store
            .insert_chunk(NewChunk::new(doc.id, "a", path("d.p1")))
            .await
            .unwrap();
        let err = store
            .insert_edge(NewEdge::new(
                NodeRef::Chunk(c1.id),
                NodeRef::Chunk(424242),
                EdgeType::Semantic,
            ))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
