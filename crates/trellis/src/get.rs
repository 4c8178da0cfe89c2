//! Record retrieval commands: documents (with their chunks) and chunks.

use anyhow::Result;
use serde_json::json;

use trellis_core::Store;

use crate::config::Config;
use crate::db;
use crate::pg_store::PgStore;

pub async fn run_get_document(config: &Config, reference: &str, json_out: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = PgStore::new(pool, config.embedding.dims);

    let document = if let Ok(id) = reference.parse::<i64>() {
        match store.get_document(id).await {
            Ok(doc) => doc,
            Err(_) => store.get_document_by_ref(reference).await?,
        }
    } else {
        store.get_document_by_ref(reference).await?
    };
    let chunks = store.chunks_by_document(document.id).await?;

    if json_out {
        let payload = json!({
            "document": document,
            "chunks": chunks,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("document {} ({})", document.id, document.ref_id);
    println!("  title: {}", document.title);
    println!("  origin: {}", document.origin);
    println!("  created: {}", document.created_at.to_rfc3339());
    println!("  chunks: {}", chunks.len());
    for chunk in &chunks {
        let embedded = if chunk.embedding.is_some() { "✓" } else { "✗" };
        let snippet: String = chunk.content.chars().take(80).collect();
        println!("    [{}] {} emb:{embedded} {}", chunk.id, chunk.path, snippet);
    }
    Ok(())
}

pub async fn run_get_chunk(config: &Config, id: i64, json_out: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = PgStore::new(pool, config.embedding.dims);
    let chunk = store.get_chunk(id).await?;

    if json_out {
        println!("{}", serde_json::to_string_pretty(&chunk)?);
        return Ok(());
    }

    println!("chunk {} (document {})", chunk.id, chunk.document_id);
    println!("  path: {}", chunk.path);
    if let Some(index) = chunk.chunk_index {
        println!("  index: {index}");
    }
    if let (Some(start), Some(end)) = (chunk.start_offset, chunk.end_offset) {
        println!("  span: {start}..{end}");
    }
    println!(
        "  embedded: {}",
        if chunk.embedding.is_some() { "yes" } else { "no" }
    );
    println!("{}", chunk.content);
    Ok(())
}
