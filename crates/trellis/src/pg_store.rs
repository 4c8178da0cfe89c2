//! Postgres + pgvector [`Store`] implementation.
//!
//! Maps each storage-contract operation onto SQL against the schema created
//! by [`crate::migrate`]. Similarity uses pgvector's cosine-distance
//! operator (`<=>`), so search rides the configured `hnsw`/`ivfflat` index;
//! hierarchy queries compare dotted-path prefixes with plain string
//! functions (no `LIKE`, whose `_` wildcard would collide with the path
//! label charset); cascade deletion is delegated to foreign keys.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use trellis_core::error::{Error, Result};
use trellis_core::models::{
    Chunk, ContextualChunk, Document, Edge, EdgeType, Entity, Metadata, NewChunk, NewDocument,
    NewEdge, NewEntity, NodeRef, ScoredChunk,
};
use trellis_core::path::ChunkPath;
use trellis_core::store::Store;
use trellis_core::vector::check_dims;

const CHUNK_COLUMNS: &str =
    "id, document_id, content, path, embedding, start_offset, end_offset, chunk_index, metadata";
const EDGE_COLUMNS: &str = "id, source_chunk_id, source_entity_id, target_chunk_id, \
     target_entity_id, edge_type, weight, bidirectional, metadata";

/// Postgres implementation of the [`Store`] trait.
pub struct PgStore {
    pool: PgPool,
    dims: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn metadata_from(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().unwrap_or_default()
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    Ok(Document {
        id: row.get("id"),
        ref_id: row.get("ref_id"),
        title: row.get("title"),
        origin: row.get("origin"),
        metadata: metadata_from(row.get("metadata")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn chunk_from_row(row: &PgRow) -> Result<Chunk> {
    let path: String = row.get("path");
    let path: ChunkPath = path
        .parse()
        .map_err(|e| Error::Internal(format!("stored chunk has malformed path: {e}")))?;
    let embedding: Option<Vector> = row.get("embedding");
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        content: row.get("content"),
        path,
        embedding: embedding.map(|v| v.to_vec()),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        chunk_index: row.get("chunk_index"),
        metadata: metadata_from(row.get("metadata")),
    })
}

fn entity_from_row(row: &PgRow) -> Entity {
    Entity {
        id: row.get("id"),
        name: row.get("name"),
        entity_type: row.get("entity_type"),
        metadata: metadata_from(row.get("metadata")),
    }
}

fn node_ref_from(chunk_id: Option<i64>, entity_id: Option<i64>) -> Result<NodeRef> {
    match (chunk_id, entity_id) {
        (Some(id), None) => Ok(NodeRef::Chunk(id)),
        (None, Some(id)) => Ok(NodeRef::Entity(id)),
        _ => Err(Error::Internal(
            "edge row violates the one-endpoint-per-side constraint".into(),
        )),
    }
}

/// Column values for one side of an edge.
fn endpoint_columns(node: NodeRef) -> (Option<i64>, Option<i64>) {
    match node {
        NodeRef::Chunk(id) => (Some(id), None),
        NodeRef::Entity(id) => (None, Some(id)),
    }
}

fn edge_from_row(row: &PgRow) -> Result<Edge> {
    let edge_type: String = row.get("edge_type");
    let edge_type = EdgeType::parse(&edge_type)
        .ok_or_else(|| Error::Internal(format!("stored edge has unknown type: {edge_type}")))?;
    Ok(Edge {
        id: row.get("id"),
        source: node_ref_from(row.get("source_chunk_id"), row.get("source_entity_id"))?,
        target: node_ref_from(row.get("target_chunk_id"), row.get("target_entity_id"))?,
        edge_type,
        weight: row.get("weight"),
        bidirectional: row.get("bidirectional"),
        metadata: metadata_from(row.get("metadata")),
    })
}

fn edge_type_names(edge_types: &[EdgeType]) -> Vec<String> {
    edge_types.iter().map(|t| t.as_str().to_string()).collect()
}

fn storage_err(err: sqlx::Error) -> Error {
    Error::storage(err)
}

impl PgStore {
    async fn edges_where(&self, column: &str, id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges \
             WHERE {column} = $1 \
               AND (cardinality($2::text[]) = 0 OR edge_type = ANY($2)) \
             ORDER BY id"
        ))
        .bind(id)
        .bind(edge_type_names(edge_types))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(edge_from_row).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn insert_document(&self, doc: NewDocument) -> Result<Document> {
        let row = sqlx::query(
            "INSERT INTO documents (ref_id, title, origin, metadata) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, ref_id, title, origin, metadata, created_at, updated_at",
        )
        .bind(&doc.ref_id)
        .bind(&doc.title)
        .bind(&doc.origin)
        .bind(serde_json::Value::Object(doc.metadata.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::InvalidInput(format!("document ref_id already exists: {}", doc.ref_id))
            }
            _ => storage_err(err),
        })?;

        document_from_row(&row)
    }

    async fn get_document(&self, id: i64) -> Result<Document> {
        let row = sqlx::query(
            "SELECT id, ref_id, title, origin, metadata, created_at, updated_at \
             FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| Error::not_found("document", id))?;

        document_from_row(&row)
    }

    async fn get_document_by_ref(&self, ref_id: &str) -> Result<Document> {
        let row = sqlx::query(
            "SELECT id, ref_id, title, origin, metadata, created_at, updated_at \
             FROM documents WHERE ref_id = $1",
        )
        .bind(ref_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| Error::not_found("document", ref_id))?;

        document_from_row(&row)
    }

    async fn update_document_metadata(&self, id: i64, metadata: Metadata) -> Result<Document> {
        let row = sqlx::query(
            "UPDATE documents SET metadata = $2, updated_at = now() WHERE id = $1 \
             RETURNING id, ref_id, title, origin, metadata, created_at, updated_at",
        )
        .bind(id)
        .bind(serde_json::Value::Object(metadata))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| Error::not_found("document", id))?;

        document_from_row(&row)
    }

    async fn delete_document(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("document", id));
        }
        Ok(())
    }

    async fn insert_chunk(&self, chunk: NewChunk) -> Result<Chunk> {
        if let Some(ref embedding) = chunk.embedding {
            check_dims(self.dims, embedding)?;
        }
        let row = sqlx::query(&format!(
            "INSERT INTO chunks \
             (document_id, content, path, embedding, start_offset, end_offset, chunk_index, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {CHUNK_COLUMNS}"
        ))
        .bind(chunk.document_id)
        .bind(&chunk.content)
        .bind(chunk.path.to_string())
        .bind(chunk.embedding.clone().map(Vector::from))
        .bind(chunk.start_offset)
        .bind(chunk.end_offset)
        .bind(chunk.chunk_index)
        .bind(serde_json::Value::Object(chunk.metadata.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::InvalidInput(format!(
                "chunk path already exists in document {}: {}",
                chunk.document_id, chunk.path
            )),
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Error::not_found("document", chunk.document_id)
            }
            _ => storage_err(err),
        })?;

        chunk_from_row(&row)
    }

    async fn get_chunk(&self, id: i64) -> Result<Chunk> {
        let row = sqlx::query(&format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::not_found("chunk", id))?;

        chunk_from_row(&row)
    }

    async fn update_chunk_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        check_dims(self.dims, embedding)?;
        let result = sqlx::query("UPDATE chunks SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(Vector::from(embedding.to_vec()))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("chunk", id));
        }
        Ok(())
    }

    async fn delete_chunk(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM chunks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("chunk", id));
        }
        Ok(())
    }

    async fn chunks_by_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        self.get_document(document_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = $1 \
             ORDER BY chunk_index NULLS LAST, id"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn similar_chunks(
        &self,
        query: &[f32],
        k: usize,
        threshold: f64,
        doc_filter: &[i64],
    ) -> Result<Vec<ScoredChunk>> {
        check_dims(self.dims, query)?;
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS}, 1 - (embedding <=> $1) AS similarity \
             FROM chunks \
             WHERE embedding IS NOT NULL \
               AND (cardinality($2::bigint[]) = 0 OR document_id = ANY($2)) \
               AND 1 - (embedding <=> $1) >= $3 \
             ORDER BY embedding <=> $1, id \
             LIMIT $4"
        ))
        .bind(Vector::from(query.to_vec()))
        .bind(doc_filter.to_vec())
        .bind(threshold)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                Ok(ScoredChunk {
                    chunk: chunk_from_row(row)?,
                    similarity: row.get("similarity"),
                })
            })
            .collect()
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
        let matches = self.similar_chunks(query, k, threshold, doc_filter).await?;

        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for hit in matches {
            seen.insert(hit.chunk.id);
            let path = hit.chunk.path.clone();
            out.push(ContextualChunk {
                chunk: hit.chunk,
                similarity: Some(hit.similarity),
                is_match: true,
            });

            let mut context = Vec::new();
            if include_ancestors {
                context.extend(
                    self.chunks_by_path_ancestor(&path)
                        .await?
                        .into_iter()
                        .filter(|c| c.path != path),
                );
            }
            if include_descendants {
                context.extend(
                    self.chunks_by_path_descendant(&path)
                        .await?
                        .into_iter()
                        .filter(|c| c.path != path),
                );
            }
            for chunk in context {
                if seen.insert(chunk.id) {
                    out.push(ContextualChunk {
                        chunk,
                        similarity: None,
                        is_match: false,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn chunks_by_path_ancestor(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE path = $1 OR left($1, length(path) + 1) = path || '.' \
             ORDER BY array_length(string_to_array(path, '.'), 1), id"
        ))
        .bind(path.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn chunks_by_path_descendant(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE path = $1 OR left(path, length($1) + 1) = $1 || '.' \
             ORDER BY path, id"
        ))
        .bind(path.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn sibling_chunks(&self, path: &ChunkPath) -> Result<Vec<Chunk>> {
        let Some(parent) = path.parent() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE left(path, length($1) + 1) = $1 || '.' \
               AND array_length(string_to_array(path, '.'), 1) = $2 \
               AND path <> $3 \
             ORDER BY path, id"
        ))
        .bind(parent.to_string())
        .bind(path.depth() as i64)
        .bind(path.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn insert_entity(&self, entity: NewEntity) -> Result<Entity> {
        // JSONB `||` keeps the merge shallow; incoming keys win.
        let row = sqlx::query(
            "INSERT INTO entities (name, entity_type, metadata) VALUES ($1, $2, $3) \
             ON CONFLICT (name, entity_type) \
             DO UPDATE SET metadata = entities.metadata || excluded.metadata \
             RETURNING id, name, entity_type, metadata",
        )
        .bind(&entity.name)
        .bind(&entity.entity_type)
        .bind(serde_json::Value::Object(entity.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(entity_from_row(&row))
    }

    async fn get_entity(&self, id: i64) -> Result<Entity> {
        let row = sqlx::query("SELECT id, name, entity_type, metadata FROM entities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::not_found("entity", id))?;

        Ok(entity_from_row(&row))
    }

    async fn delete_entity(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("entity", id));
        }
        Ok(())
    }

    async fn chunks_by_entity(&self, entity_id: i64) -> Result<Vec<Chunk>> {
        self.get_entity(entity_id).await?;
        let rows = sqlx::query(
            "SELECT DISTINCT ON (c.id) \
                    c.id, c.document_id, c.content, c.path, c.embedding, \
                    c.start_offset, c.end_offset, c.chunk_index, c.metadata \
             FROM chunks c \
             JOIN edges e \
               ON (e.source_chunk_id = c.id AND e.target_entity_id = $1) \
               OR (e.target_chunk_id = c.id AND e.source_entity_id = $1) \
             WHERE e.edge_type = 'entity_mention' \
             ORDER BY c.id",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn insert_edge(&self, edge: NewEdge) -> Result<Edge> {
        let (source_chunk, source_entity) = endpoint_columns(edge.source);
        let (target_chunk, target_entity) = endpoint_columns(edge.target);
        let row = sqlx::query(&format!(
            "INSERT INTO edges \
             (source_chunk_id, source_entity_id, target_chunk_id, target_entity_id, \
              edge_type, weight, bidirectional, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {EDGE_COLUMNS}"
        ))
        .bind(source_chunk)
        .bind(source_entity)
        .bind(target_chunk)
        .bind(target_entity)
        .bind(edge.edge_type.as_str())
        .bind(edge.weight)
        .bind(edge.bidirectional)
        .bind(serde_json::Value::Object(edge.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Error::InvalidInput("edge references a missing chunk or entity".into())
            }
            _ => storage_err(err),
        })?;

        edge_from_row(&row)
    }

    async fn get_edge(&self, id: i64) -> Result<Edge> {
        let row = sqlx::query(&format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::not_found("edge", id))?;

        edge_from_row(&row)
    }

    async fn update_edge(&self, id: i64, weight: f64, metadata: Metadata) -> Result<Edge> {
        let row = sqlx::query(&format!(
            "UPDATE edges SET weight = $2, metadata = $3 WHERE id = $1 RETURNING {EDGE_COLUMNS}"
        ))
        .bind(id)
        .bind(weight)
        .bind(serde_json::Value::Object(metadata))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| Error::not_found("edge", id))?;

        edge_from_row(&row)
    }

    async fn delete_edge(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM edges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("edge", id));
        }
        Ok(())
    }

    async fn edges_from_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        self.edges_where("source_chunk_id", chunk_id, edge_types)
            .await
    }

    async fn edges_to_chunk(&self, chunk_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        self.edges_where("target_chunk_id", chunk_id, edge_types)
            .await
    }

    async fn edges_from_entity(
        &self,
        entity_id: i64,
        edge_types: &[EdgeType],
    ) -> Result<Vec<Edge>> {
        self.edges_where("source_entity_id", entity_id, edge_types)
            .await
    }

    async fn edges_to_entity(&self, entity_id: i64, edge_types: &[EdgeType]) -> Result<Vec<Edge>> {
        self.edges_where("target_entity_id", entity_id, edge_types)
            .await
    }
}
