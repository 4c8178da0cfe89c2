//! # Trellis Core
//!
//! A hybrid retrieval engine that fuses three signals over a corpus of
//! chunked documents: dense-vector cosine similarity, typed directed-graph
//! traversal, and hierarchical proximity over ordered chunk paths.
//!
//! This crate is pure engine: data models, the storage contract, graph
//! traversal, the hierarchy resolver, score fusion, the strategy layer, and
//! the [`Retriever`](retriever::Retriever) facade. It carries no database
//! driver, no HTTP client, and no CLI — concrete backends and pipeline
//! implementations live in the `trellis` application crate, and an
//! in-memory reference backend ships here for tests and embedded use.
//!
//! ## Data flow
//!
//! ```text
//! Ingestion:  Document → Chunker → Embedder → [Entity/Relation extraction]
//!                      → Store (chunks, entities, edges)
//!
//! Query:      text → Embedder → strategy (vector retrieve + BFS/DFS +
//!             hierarchy) → score fusion → ranked top-K
//! ```
//!
//! ## Modules
//!
//! - [`models`] — documents, chunks, entities, typed edges, result types
//! - [`path`] — the dotted label-sequence chunk position type
//! - [`store`] — the storage contract and the in-memory backend
//! - [`traversal`] — BFS/DFS over chunk-to-chunk edges
//! - [`hierarchy`] — ancestor/descendant/sibling context resolution
//! - [`fusion`] — id-keyed score accumulation with deterministic ranking
//! - [`strategies`] — the retrieval strategy composers
//! - [`pipeline`] — chunker/embedder/extractor traits
//! - [`retriever`] — the facade: text queries and document ingestion
//! - [`query`] — query configuration and strategy selection
//! - [`error`] — the error taxonomy

pub mod error;
pub mod fusion;
pub mod hierarchy;
pub mod models;
pub mod path;
pub mod pipeline;
pub mod query;
pub mod retriever;
pub mod store;
pub mod strategies;
pub mod traversal;
pub mod vector;

pub use error::{Error, Result};
pub use models::{
    Chunk, ChunkWithPath, ContextualChunk, Document, Edge, EdgeType, Entity, Metadata, NewChunk,
    NewDocument, NewEdge, NewEntity, NodeRef, RetrievalMethod, RetrievalResult, ScoredChunk,
    TraversalResult,
};
pub use path::ChunkPath;
pub use pipeline::Pipeline;
pub use query::{QueryConfig, Strategy};
pub use retriever::{IngestError, IngestReport, Retriever};
pub use store::Store;
