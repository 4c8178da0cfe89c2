//! The retrieval facade: query text in, fused results out.
//!
//! [`Retriever`] owns an `Arc<dyn Store>` and a [`Pipeline`] and exposes the
//! public surface: text queries are embedded through the pipeline and
//! dispatched to a strategy; document ingestion runs the full
//! chunk → embed → extract → persist sequence. The retriever holds no other
//! state, so it is cheap to clone and safe to share across tasks.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{
    ContextualChunk, Document, Entity, EdgeType, NewChunk, NewDocument, NewEdge, NewEntity,
    NodeRef, RetrievalResult,
};
use crate::path::ChunkPath;
use crate::pipeline::{
    Chunker, Embedder, EntityExtractor, ExtractedEntity, ExtractedRelation, GraphExtractor,
    Pipeline, RelationExtractor,
};
use crate::query::{QueryConfig, Strategy};
use crate::store::Store;
use crate::strategies;

/// Outcome of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document: Document,
    pub chunks: usize,
    pub entities: usize,
    pub edges: usize,
}

/// An ingest failure, carrying how many chunks made it in before the error.
///
/// The partially ingested document is left in place; callers decide whether
/// to delete it.
#[derive(Debug, ThisError)]
#[error("ingest failed after {inserted} chunks: {source}")]
pub struct IngestError {
    pub inserted: usize,
    #[source]
    pub source: Error,
}

impl IngestError {
    fn new(inserted: usize, source: Error) -> Self {
        Self { inserted, source }
    }
}

/// Facade over a store and a pipeline.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn Store>,
    pipeline: Pipeline,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever").finish_non_exhaustive()
    }
}

impl Retriever {
    /// Build a retriever, checking that the pipeline's embedder matches the
    /// store's vector dimensionality.
    pub fn new(store: Arc<dyn Store>, pipeline: Pipeline) -> Result<Self> {
        let embedder_dims = pipeline.embedder.dims();
        let store_dims = store.dims();
        if embedder_dims != store_dims {
            return Err(Error::Precondition(format!(
                "embedder produces {embedder_dims}-dim vectors, store expects {store_dims}"
            )));
        }
        Ok(Self { store, pipeline })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Embed query text, enforcing non-empty input and the dimension
    /// contract.
    async fn embed_query(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("query text is empty".into()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let vector = self.pipeline.embedder.embed(text).await?;
        if vector.len() != self.store.dims() {
            return Err(Error::Internal(format!(
                "embedder returned {} dimensions, store expects {}",
                vector.len(),
                self.store.dims()
            )));
        }
        Ok(vector)
    }

    /// Search the whole corpus with the given strategy.
    pub async fn search(
        &self,
        query: &str,
        strategy: Strategy,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let vector = self.embed_query(query, cancel).await?;
        let store = self.store.as_ref();
        match strategy {
            Strategy::VectorOnly => strategies::vector_only(store, &vector, config, cancel).await,
            Strategy::Contextual => strategies::contextual(store, &vector, config, cancel).await,
            Strategy::MultiHop => strategies::multi_hop(store, &vector, config, cancel).await,
            Strategy::Hybrid => strategies::hybrid(store, &vector, config, cancel).await,
        }
    }

    /// Search scoped to specific documents. The filter must be non-empty.
    pub async fn search_documents(
        &self,
        query: &str,
        strategy: Strategy,
        document_ids: &[i64],
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        if document_ids.is_empty() {
            return Err(Error::InvalidInput(
                "document-scoped search requires a non-empty document filter".into(),
            ));
        }
        let mut scoped = config.clone();
        scoped.document_ids = document_ids.to_vec();
        self.search(query, strategy, &scoped, cancel).await
    }

    /// Entity-centric retrieval from an entity id.
    pub async fn search_entity(
        &self,
        entity_id: i64,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        strategies::entity_centric(self.store.as_ref(), entity_id, config, cancel).await
    }

    /// Similarity search with storage-side ancestor/descendant expansion.
    pub async fn search_with_context(
        &self,
        query: &str,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContextualChunk>> {
        let vector = self.embed_query(query, cancel).await?;
        self.store
            .similar_chunks_with_context(
                &vector,
                config.top_k,
                config.include_ancestors,
                config.include_descendants,
                config.similarity_threshold,
                &config.document_ids,
            )
            .await
    }

    /// Ingest a document: chunk, embed, extract, persist.
    ///
    /// Chunks are persisted first, then entities (deduplicated within the
    /// document by lowercased name and type, keeping the
    /// highest-confidence mention), then edges. On failure the error
    /// reports how many chunks were inserted; the caller decides whether
    /// to roll the document back.
    pub async fn ingest_document(
        &self,
        doc: NewDocument,
        content: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<IngestReport, IngestError> {
        if content.trim().is_empty() {
            return Err(IngestError::new(
                0,
                Error::InvalidInput("document content is empty".into()),
            ));
        }
        if cancel.is_cancelled() {
            return Err(IngestError::new(0, Error::Cancelled));
        }

        let base = base_path(&doc.ref_id).map_err(|e| IngestError::new(0, e))?;
        let document = self
            .store
            .insert_document(doc)
            .await
            .map_err(|e| IngestError::new(0, e))?;

        let pieces = self
            .pipeline
            .chunker
            .chunk(content, &base)
            .map_err(|e| IngestError::new(0, e))?;

        // Embed and extract before any chunk is written, so a pipeline
        // failure reports zero inserted chunks.
        let mut prepared: Vec<NewChunk> = Vec::with_capacity(pieces.len());
        let mut chunk_entities: Vec<Vec<ExtractedEntity>> = Vec::with_capacity(pieces.len());
        let mut chunk_relations: Vec<Vec<ExtractedRelation>> = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            if cancel.is_cancelled() {
                return Err(IngestError::new(0, Error::Cancelled));
            }
            let embedding = self
                .pipeline
                .embedder
                .embed(&piece.content)
                .await
                .map_err(|e| IngestError::new(0, e))?;
            if embedding.len() != self.store.dims() {
                return Err(IngestError::new(
                    0,
                    Error::Internal(format!(
                        "embedder returned {} dimensions, store expects {}",
                        embedding.len(),
                        self.store.dims()
                    )),
                ));
            }

            let (entities, relations) = self
                .extract(&piece.content)
                .map_err(|e| IngestError::new(0, e))?;
            chunk_entities.push(entities);
            chunk_relations.push(relations);

            prepared.push(NewChunk {
                document_id: document.id,
                content: piece.content.clone(),
                path: piece.path.clone(),
                embedding: Some(embedding),
                start_offset: piece.start_offset,
                end_offset: piece.end_offset,
                chunk_index: Some(piece.index),
                metadata: piece.metadata.clone(),
            });
        }

        let mut chunks = Vec::with_capacity(prepared.len());
        for (i, new_chunk) in prepared.into_iter().enumerate() {
            match self.store.insert_chunk(new_chunk).await {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => return Err(IngestError::new(i, err)),
            }
        }
        let inserted = chunks.len();

        // Deduplicate entities within the document, keeping the
        // highest-confidence mention per (lowercased name, type).
        let mut order: Vec<(String, String)> = Vec::new();
        let mut best: HashMap<(String, String), ExtractedEntity> = HashMap::new();
        for extracted in chunk_entities.iter().flatten() {
            let key = extracted.dedup_key();
            match best.get(&key) {
                Some(current) if current.confidence() >= extracted.confidence() => {}
                Some(_) => {
                    best.insert(key, extracted.clone());
                }
                None => {
                    order.push(key.clone());
                    best.insert(key, extracted.clone());
                }
            }
        }

        let mut stored: HashMap<(String, String), Entity> = HashMap::new();
        for key in &order {
            let extracted = &best[key];
            let entity = self
                .store
                .insert_entity(
                    NewEntity::new(extracted.name.clone(), extracted.entity_type.clone())
                        .with_metadata(extracted.metadata.clone()),
                )
                .await
                .map_err(|e| IngestError::new(inserted, e))?;
            stored.insert(key.clone(), entity);
        }
        let entity_count = stored.len();

        // Mention edges, then extracted relations.
        let mut edge_count = 0usize;
        for (chunk, extracted) in chunks.iter().zip(chunk_entities.iter()) {
            let mut seen = std::collections::HashSet::new();
            for entity in extracted {
                let key = entity.dedup_key();
                if !seen.insert(key.clone()) {
                    continue;
                }
                let Some(stored_entity) = stored.get(&key) else {
                    continue;
                };
                self.store
                    .insert_edge(NewEdge::new(
                        NodeRef::Chunk(chunk.id),
                        NodeRef::Entity(stored_entity.id),
                        EdgeType::EntityMention,
                    ))
                    .await
                    .map_err(|e| IngestError::new(inserted, e))?;
                edge_count += 1;
            }
        }

        let by_name: HashMap<String, i64> = stored
            .iter()
            .map(|((name, _), entity)| (name.clone(), entity.id))
            .collect();

        if self.pipeline.graph_extractor.is_some() {
            for relations in &chunk_relations {
                for relation in relations {
                    let (Some(&source), Some(&target)) = (
                        by_name.get(&relation.source_name.to_lowercase()),
                        by_name.get(&relation.target_name.to_lowercase()),
                    ) else {
                        debug!(
                            source = %relation.source_name,
                            target = %relation.target_name,
                            "dropping relation with unresolved endpoint"
                        );
                        continue;
                    };
                    let mut edge = NewEdge::new(
                        NodeRef::Entity(source),
                        NodeRef::Entity(target),
                        relation.edge_type,
                    )
                    .with_weight(relation.weight)
                    .with_metadata(relation.metadata.clone());
                    edge.bidirectional = relation.bidirectional;
                    self.store
                        .insert_edge(edge)
                        .await
                        .map_err(|e| IngestError::new(inserted, e))?;
                    edge_count += 1;
                }
            }
        } else if let Some(extractor) = &self.pipeline.relation_extractor {
            for (chunk, extracted) in chunks.iter().zip(chunk_entities.iter()) {
                let entities: Vec<Entity> = extracted
                    .iter()
                    .filter_map(|e| stored.get(&e.dedup_key()).cloned())
                    .collect();
                let relations = extractor
                    .extract_relations(&chunk.content, chunk.id, &entities)
                    .map_err(|e| IngestError::new(inserted, e))?;
                for edge in relations {
                    self.store
                        .insert_edge(edge)
                        .await
                        .map_err(|e| IngestError::new(inserted, e))?;
                    edge_count += 1;
                }
            }
        }

        info!(
            document = document.id,
            chunks = inserted,
            entities = entity_count,
            edges = edge_count,
            "document ingested"
        );

        Ok(IngestReport {
            document,
            chunks: inserted,
            entities: entity_count,
            edges: edge_count,
        })
    }

    /// Recompute every chunk embedding of a document in place. Returns the
    /// number of chunks re-embedded.
    pub async fn reembed_document(
        &self,
        document_id: i64,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let chunks = self.store.chunks_by_document(document_id).await?;
        let mut updated = 0;
        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let embedding = self.pipeline.embedder.embed(&chunk.content).await?;
            if embedding.len() != self.store.dims() {
                return Err(Error::Internal(format!(
                    "embedder returned {} dimensions, store expects {}",
                    embedding.len(),
                    self.store.dims()
                )));
            }
            self.store
                .update_chunk_embedding(chunk.id, &embedding)
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    fn extract(
        &self,
        text: &str,
    ) -> Result<(Vec<ExtractedEntity>, Vec<ExtractedRelation>)> {
        if let Some(extractor) = &self.pipeline.graph_extractor {
            return extractor.extract_graph(text);
        }
        let entities = match &self.pipeline.entity_extractor {
            Some(extractor) => extractor.extract_entities(text)?,
            None => Vec::new(),
        };
        Ok((entities, Vec::new()))
    }
}

/// Root label for a document's chunk tree, derived from its reference id.
fn base_path(ref_id: &str) -> Result<ChunkPath> {
    let label: String = ref_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if label.is_empty() {
        return Err(Error::InvalidInput("document ref_id is empty".into()));
    }
    ChunkPath::root(format!("doc_{label}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkWithPath, Metadata, RetrievalMethod};
    use crate::pipeline::{Chunker, Embedder, EntityExtractor};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    /// Splits on blank lines; paths are `<base>.p<i>`.
    struct ParagraphChunker;

    impl Chunker for ParagraphChunker {
        fn chunk(&self, text: &str, base: &ChunkPath) -> Result<Vec<ChunkWithPath>> {
            Ok(text
                .split("\n\n")
                .filter(|s| !s.trim().is_empty())
                .enumerate()
                .map(|(i, part)| ChunkWithPath {
                    content: part.trim().to_string(),
                    path: base.child(format!("p{i}")).unwrap(),
                    start_offset: None,
                    end_offset: None,
                    index: i as i64,
                    metadata: Metadata::new(),
                })
                .collect())
        }
    }

    /// Counts the words "alpha", "beta", "gamma" into a 3-dim vector.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(vec![
                lower.matches("alpha").count() as f32,
                lower.matches("beta").count() as f32,
                lower.matches("gamma").count() as f32,
            ])
        }
        fn dims(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    /// Embedder that violates its advertised dimensionality.
    struct LyingEmbedder;

    #[async_trait]
    impl Embedder for LyingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        fn dims(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "lying-test"
        }
    }

    /// Reports "Ada" as a person wherever it appears.
    struct AdaExtractor;

    impl EntityExtractor for AdaExtractor {
        fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
            if text.contains("Ada") {
                Ok(vec![
                    ExtractedEntity::new("Ada", "person").with_confidence(0.9)
                ])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(ParagraphChunker), Arc::new(KeywordEmbedder))
            .with_entity_extractor(Arc::new(AdaExtractor))
    }

    fn retriever() -> Retriever {
        Retriever::new(Arc::new(MemoryStore::new(3)), pipeline()).unwrap()
    }

    const CONTENT: &str =
        "Ada studied alpha particles.\n\nBeta decay was next.\n\nAda also wrote about gamma rays.";

    #[tokio::test]
    async fn test_ingest_counts_and_dedup() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let report = retriever
            .ingest_document(NewDocument::new("Particles", "unit"), CONTENT, &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        // "Ada" appears in two chunks but is stored once.
        assert_eq!(report.entities, 1);
        assert_eq!(report.edges, 2);

        let chunks = retriever
            .store()
            .chunks_by_document(report.document.id)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.embedding.is_some()));
        assert_eq!(chunks[0].chunk_index, Some(0));
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_content() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let err = retriever
            .ingest_document(NewDocument::new("Empty", "unit"), "  \n ", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.inserted, 0);
        assert!(matches!(err.source, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        retriever
            .ingest_document(NewDocument::new("Particles", "unit"), CONTENT, &cancel)
            .await
            .unwrap();

        let config = QueryConfig {
            similarity_threshold: 0.0,
            ..QueryConfig::default()
        };
        let results = retriever
            .search("beta", Strategy::VectorOnly, &config, &cancel)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results[0].chunk.content.contains("Beta decay"));

        // Deterministic: same query twice gives identical ranking and scores.
        let again = retriever
            .search("beta", Strategy::VectorOnly, &config, &cancel)
            .await
            .unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.chunk.id).collect();
        let ids_again: Vec<i64> = again.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, ids_again);
        for (a, b) in results.iter().zip(again.iter()) {
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let err = retriever
            .search("   ", Strategy::Hybrid, &QueryConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_document_scoped_search_requires_filter() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let err = retriever
            .search_documents(
                "beta",
                Strategy::VectorOnly,
                &[],
                &QueryConfig::default(),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_scoped_search_filters_documents() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let first = retriever
            .ingest_document(
                NewDocument::new("First", "unit"),
                "alpha alpha alpha",
                &cancel,
            )
            .await
            .unwrap();
        retriever
            .ingest_document(NewDocument::new("Second", "unit"), "alpha alpha", &cancel)
            .await
            .unwrap();

        let config = QueryConfig {
            similarity_threshold: 0.0,
            ..QueryConfig::default()
        };
        let results = retriever
            .search_documents(
                "alpha",
                Strategy::VectorOnly,
                &[first.document.id],
                &config,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, first.document.id);
    }

    #[tokio::test]
    async fn test_entity_search_finds_mentions() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        retriever
            .ingest_document(NewDocument::new("Particles", "unit"), CONTENT, &cancel)
            .await
            .unwrap();

        // Ids are assigned in insertion order; probe for the one entity
        // the extractor stored.
        let store = retriever.store();
        let mut entity_id = None;
        for id in 1..20 {
            if store.get_entity(id).await.is_ok() {
                entity_id = Some(id);
                break;
            }
        }
        let entity_id = entity_id.expect("entity was stored");

        let results = retriever
            .search_entity(entity_id, &QueryConfig::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.method == RetrievalMethod::EntityCentric));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_precondition() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(5));
        let err = Retriever::new(
            store,
            Pipeline::new(Arc::new(ParagraphChunker), Arc::new(KeywordEmbedder)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test]
    async fn test_lying_embedder_is_internal_error() {
        let retriever = Retriever::new(
            Arc::new(MemoryStore::new(3)),
            Pipeline::new(Arc::new(ParagraphChunker), Arc::new(LyingEmbedder)),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let err = retriever
            .search("query", Strategy::VectorOnly, &QueryConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let ingest_err = retriever
            .ingest_document(NewDocument::new("Doc", "unit"), "text", &cancel)
            .await
            .unwrap_err();
        assert_eq!(ingest_err.inserted, 0);
        assert!(matches!(ingest_err.source, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_reembed_document() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        let report = retriever
            .ingest_document(NewDocument::new("Particles", "unit"), CONTENT, &cancel)
            .await
            .unwrap();
        let updated = retriever
            .reembed_document(report.document.id, &cancel)
            .await
            .unwrap();
        assert_eq!(updated, 3);
    }

    #[tokio::test]
    async fn test_cancelled_search_fails_promptly() {
        let retriever = retriever();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = retriever
            .search("beta", Strategy::Hybrid, &QueryConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_base_path_sanitizes_ref_id() {
        let path = base_path("550e8400-e29b-41d4").unwrap();
        assert_eq!(path.to_string(), "doc_550e8400_e29b_41d4");
        assert!(base_path("").is_err());
    }
}
