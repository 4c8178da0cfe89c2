//! End-to-end engine flow: ingest through every retrieval strategy.
//!
//! Runs the real chunker and extractors against the in-memory store with a
//! deterministic word-bucket embedder, so the whole pipeline is exercised
//! without a database or a network.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use trellis::chunker::HeadingChunker;
use trellis::extract::{CooccurrenceRelationExtractor, PatternEntityExtractor};
use trellis_core::pipeline::Embedder;
use trellis_core::store::memory::MemoryStore;
use trellis_core::{
    EdgeType, NewDocument, NewEdge, NodeRef, Pipeline, QueryConfig, Result, Retriever, Store,
    Strategy,
};

const DIMS: usize = 8;

/// Deterministic embedder: words are hashed into 8 frequency buckets.
struct BucketEmbedder;

#[async_trait]
impl Embedder for BucketEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMS];
        for word in text.split_whitespace() {
            let bucket = word.bytes().map(usize::from).sum::<usize>() % DIMS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
    fn dims(&self) -> usize {
        DIMS
    }
    fn model_name(&self) -> &str {
        "bucket-test"
    }
}

const DOC: &str = "\
# Alpha Section

alpha alpha alpha alpha alpha alpha alpha alpha

alpha omega alpha omega alpha omega alpha omega

# Ada Notes

Ada Lovelace met Charles Babbage in London.

Ada Lovelace wrote the first program.
";

fn retriever() -> Retriever {
    let store = Arc::new(MemoryStore::new(DIMS));
    let pipeline = Pipeline::new(Arc::new(HeadingChunker::new(60)), Arc::new(BucketEmbedder))
        .with_entity_extractor(Arc::new(PatternEntityExtractor::new().unwrap()))
        .with_relation_extractor(Arc::new(CooccurrenceRelationExtractor::new(10)));
    Retriever::new(store, pipeline).unwrap()
}

fn permissive(top_k: usize) -> QueryConfig {
    QueryConfig {
        top_k,
        similarity_threshold: 0.0,
        ..QueryConfig::default()
    }
}

async fn ingest(retriever: &Retriever) -> trellis_core::IngestReport {
    let cancel = CancellationToken::new();
    retriever
        .ingest_document(
            NewDocument::new("Engine Test", "integration"),
            DOC,
            &cancel,
        )
        .await
        .expect("ingest succeeds")
}

#[tokio::test]
async fn test_ingest_produces_chunks_entities_and_edges() {
    let retriever = retriever();
    let report = ingest(&retriever).await;

    assert!(report.chunks >= 4, "sections split into multiple chunks");
    // "Alpha Section", "Ada Notes", "Ada Lovelace", "Charles Babbage" at
    // minimum, deduplicated across chunks.
    assert!(report.entities >= 3);
    // Mention edges plus at least one co-occurrence relation.
    assert!(report.edges > report.entities);

    let chunks = retriever
        .store()
        .chunks_by_document(report.document.id)
        .await
        .unwrap();
    assert!(chunks.iter().all(|c| c.embedding.is_some()));
    // Paths share the document's root label.
    let root = chunks[0].path.labels()[0].clone();
    assert!(chunks.iter().all(|c| c.path.labels()[0] == root));
}

#[tokio::test]
async fn test_vector_search_finds_the_right_section() {
    let retriever = retriever();
    ingest(&retriever).await;
    let cancel = CancellationToken::new();

    let results = retriever
        .search("alpha", Strategy::VectorOnly, &permissive(3), &cancel)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].chunk.content.contains("alpha"));
    assert!(results[0].similarity > 0.9);
}

#[tokio::test]
async fn test_contextual_pulls_in_siblings() {
    let retriever = retriever();
    ingest(&retriever).await;
    let cancel = CancellationToken::new();

    let config = QueryConfig {
        top_k: 1,
        similarity_threshold: 0.0,
        ..QueryConfig::default()
    };
    let results = retriever
        .search("alpha", Strategy::Contextual, &config, &cancel)
        .await
        .unwrap();

    // The seed plus hierarchical context from its section.
    assert!(results.len() > 1);
    assert!(results
        .iter()
        .any(|r| r.method == trellis_core::RetrievalMethod::Hierarchical));
    // Seed ranks first; context carries a discounted score.
    assert!(results[0].score >= results[results.len() - 1].score);
}

#[tokio::test]
async fn test_hybrid_fuses_graph_edges() {
    let retriever = retriever();
    let report = ingest(&retriever).await;
    let cancel = CancellationToken::new();

    // Wire a reference edge from the alpha chunk to the Ada chunk so the
    // graph signal has something to say.
    let chunks = retriever
        .store()
        .chunks_by_document(report.document.id)
        .await
        .unwrap();
    let alpha = chunks
        .iter()
        .find(|c| c.content.contains("alpha alpha"))
        .unwrap();
    let ada = chunks
        .iter()
        .find(|c| c.content.contains("Ada Lovelace"))
        .unwrap();
    retriever
        .store()
        .insert_edge(NewEdge::new(
            NodeRef::Chunk(alpha.id),
            NodeRef::Chunk(ada.id),
            EdgeType::Reference,
        ))
        .await
        .unwrap();

    let config = QueryConfig {
        top_k: 10,
        similarity_threshold: 0.0,
        max_hops: 1,
        ..QueryConfig::default()
    };
    let results = retriever
        .search("alpha", Strategy::Hybrid, &config, &cancel)
        .await
        .unwrap();

    let ada_result = results
        .iter()
        .find(|r| r.chunk.id == ada.id)
        .expect("graph edge pulled the Ada chunk in");
    assert!(ada_result.score > 0.0);
}

#[tokio::test]
async fn test_entity_centric_retrieval() {
    let retriever = retriever();
    ingest(&retriever).await;
    let cancel = CancellationToken::new();

    // Locate the stored "Ada Lovelace" entity.
    let store = retriever.store();
    let mut ada = None;
    for id in 1..64 {
        if let Ok(entity) = store.get_entity(id).await {
            if entity.name == "Ada Lovelace" {
                ada = Some(entity);
                break;
            }
        }
    }
    let ada = ada.expect("entity extracted and stored");
    assert_eq!(ada.entity_type, "topic");

    let results = retriever
        .search_entity(ada.id, &permissive(10), &cancel)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.chunk.content.contains("Ada Lovelace")));
}

#[tokio::test]
async fn test_search_with_context_marks_matches() {
    let retriever = retriever();
    ingest(&retriever).await;
    let cancel = CancellationToken::new();

    let config = QueryConfig {
        top_k: 1,
        similarity_threshold: 0.0,
        include_ancestors: true,
        include_descendants: true,
        ..QueryConfig::default()
    };
    let rows = retriever
        .search_with_context("alpha", &config, &cancel)
        .await
        .unwrap();

    let matches: Vec<_> = rows.iter().filter(|r| r.is_match).collect();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].similarity.is_some());
    for row in rows.iter().filter(|r| !r.is_match) {
        assert!(row.similarity.is_none());
    }
}

#[tokio::test]
async fn test_document_scoped_search() {
    let retriever = retriever();
    let report = ingest(&retriever).await;
    let cancel = CancellationToken::new();

    let other = retriever
        .ingest_document(
            NewDocument::new("Other", "integration"),
            "alpha alpha alpha unrelated words here",
            &cancel,
        )
        .await
        .unwrap();

    let results = retriever
        .search_documents(
            "alpha",
            Strategy::VectorOnly,
            &[report.document.id],
            &permissive(10),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.chunk.document_id == report.document.id));
    assert!(results
        .iter()
        .all(|r| r.chunk.document_id != other.document.id));
}

#[tokio::test]
async fn test_duplicate_ref_id_reports_zero_inserted() {
    let retriever = retriever();
    let cancel = CancellationToken::new();

    let doc = NewDocument::new("Dup", "integration").with_ref_id("fixed-ref");
    retriever
        .ingest_document(doc.clone(), DOC, &cancel)
        .await
        .unwrap();
    let err = retriever
        .ingest_document(doc, DOC, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.inserted, 0);
}

#[tokio::test]
async fn test_repeat_queries_are_deterministic() {
    let retriever = retriever();
    ingest(&retriever).await;
    let cancel = CancellationToken::new();

    let config = QueryConfig {
        top_k: 10,
        similarity_threshold: 0.0,
        ..QueryConfig::default()
    };
    let first = retriever
        .search("alpha omega", Strategy::Hybrid, &config, &cancel)
        .await
        .unwrap();
    let second = retriever
        .search("alpha omega", Strategy::Hybrid, &config, &cancel)
        .await
        .unwrap();

    let ids_a: Vec<i64> = first.iter().map(|r| r.chunk.id).collect();
    let ids_b: Vec<i64> = second.iter().map(|r| r.chunk.id).collect();
    assert_eq!(ids_a, ids_b);
    for (a, b) in first.iter().zip(second.iter()) {
        assert!((a.score - b.score).abs() < 1e-12);
    }
}
