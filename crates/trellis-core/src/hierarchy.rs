//! Hierarchical context resolution over a chunk's tree position.
//!
//! Thin facade over the store's path queries: concatenates ancestors,
//! descendants, and siblings per the config flags. Duplicates between the
//! three sets are allowed here; the strategy fuser deduplicates by chunk
//! id.

use crate::error::Result;
use crate::models::Chunk;
use crate::path::ChunkPath;
use crate::query::QueryConfig;
use crate::store::Store;

/// Chunks structurally related to `path`, per the config's
/// ancestor/descendant/sibling flags.
pub async fn hierarchical_context(
    store: &dyn Store,
    path: &ChunkPath,
    config: &QueryConfig,
) -> Result<Vec<Chunk>> {
    let mut context = Vec::new();
    if config.include_ancestors {
        context.extend(store.chunks_by_path_ancestor(path).await?);
    }
    if config.include_descendants {
        context.extend(store.chunks_by_path_descendant(path).await?);
    }
    if config.include_siblings {
        context.extend(store.sibling_chunks(path).await?);
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewChunk, NewDocument};
    use crate::store::memory::MemoryStore;

    fn p(s: &str) -> ChunkPath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_flags_select_sets() {
        let store = MemoryStore::new(3);
        let doc = store
            .insert_document(NewDocument::new("Doc", "unit"))
            .await
            .unwrap();
        for path in ["r", "r.s1", "r.s1.p1", "r.s1.p2", "r.s2"] {
            store
                .insert_chunk(NewChunk::new(doc.id, path, p(path)))
                .await
                .unwrap();
        }

        let mut config = QueryConfig {
            include_ancestors: false,
            include_descendants: false,
            include_siblings: false,
            ..QueryConfig::default()
        };

        let none = hierarchical_context(&store, &p("r.s1.p1"), &config)
            .await
            .unwrap();
        assert!(none.is_empty());

        config.include_siblings = true;
        let siblings = hierarchical_context(&store, &p("r.s1.p1"), &config)
            .await
            .unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].path, p("r.s1.p2"));

        config.include_ancestors = true;
        config.include_descendants = true;
        let all = hierarchical_context(&store, &p("r.s1.p1"), &config)
            .await
            .unwrap();
        // Ancestors (r, r.s1, self) + descendants (self) + sibling: the
        // overlap stays; deduplication happens in the fuser.
        assert_eq!(all.len(), 5);
    }
}
