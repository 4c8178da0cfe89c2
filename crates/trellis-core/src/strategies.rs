//! Retrieval primitives and the strategy composers built on them.
//!
//! Every strategy follows the same fusion pattern: seed a [`FusionMap`]
//! from vector retrieval, expand seeds through the graph and/or the
//! hierarchy, accumulate weighted scores, then rank. Per-seed expansion
//! errors are swallowed (the seed's expansion is truncated and the query
//! degrades to a smaller result set); the initial vector retrieve and
//! cancellation always propagate.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fusion::FusionMap;
use crate::hierarchy::hierarchical_context;
use crate::models::{Chunk, EdgeType, RetrievalMethod, RetrievalResult};
use crate::query::QueryConfig;
use crate::store::Store;
use crate::traversal::{self, bfs};

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Vector similarity retrieval, wrapped as scored results.
pub async fn vector_retrieve(
    store: &dyn Store,
    query: &[f32],
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    ensure_live(cancel)?;
    let hits = store
        .similar_chunks(
            query,
            config.top_k,
            config.similarity_threshold,
            &config.document_ids,
        )
        .await?;
    Ok(hits
        .into_iter()
        .map(|hit| RetrievalResult {
            chunk: hit.chunk,
            score: hit.similarity,
            similarity: hit.similarity,
            graph_distance: 0,
            method: RetrievalMethod::Vector,
        })
        .collect())
}

/// Distinct one-hop graph neighbors of a chunk.
///
/// Applies the edge-type filter and the per-edge direction policy, dedupes
/// by target id, and skips targets that cannot be fetched.
pub async fn get_neighbors(
    store: &dyn Store,
    chunk_id: i64,
    edge_types: &[EdgeType],
    _follow_bidirectional: bool,
) -> Result<Vec<Chunk>> {
    let ids = traversal::neighbor_ids(store, chunk_id, edge_types).await?;
    let mut neighbors = Vec::with_capacity(ids.len());
    for id in ids {
        match store.get_chunk(id).await {
            Ok(chunk) => neighbors.push(chunk),
            Err(err) => debug!(chunk_id = id, %err, "skipping unfetchable neighbor"),
        }
    }
    Ok(neighbors)
}

/// Dedupe hierarchy context by chunk id, dropping the seed itself.
fn distinct_context(context: Vec<Chunk>, seed_id: i64) -> Vec<Chunk> {
    let mut seen = std::collections::HashSet::new();
    context
        .into_iter()
        .filter(|c| c.id != seed_id && seen.insert(c.id))
        .collect()
}

/// Vector-Only: similarity hits, already ranked and bounded by the store.
pub async fn vector_only(
    store: &dyn Store,
    query: &[f32],
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    vector_retrieve(store, query, config, cancel).await
}

/// Contextual: vector seeds plus their one-hop graph neighbors and
/// hierarchical context, scored relative to each seed.
///
/// Returns all accumulated results ranked by score; callers slice.
pub async fn contextual(
    store: &dyn Store,
    query: &[f32],
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    let seeds = vector_retrieve(store, query, config, cancel).await?;
    let mut map = FusionMap::new();
    for seed in &seeds {
        map.insert_new(seed.clone());
    }

    for seed in &seeds {
        ensure_live(cancel)?;

        match get_neighbors(
            store,
            seed.chunk.id,
            &config.edge_types,
            config.follow_bidirectional,
        )
        .await
        {
            Ok(neighbors) => {
                for neighbor in neighbors {
                    map.insert_new(RetrievalResult {
                        chunk: neighbor,
                        score: seed.score * config.graph_weight,
                        similarity: 0.0,
                        graph_distance: 1,
                        method: RetrievalMethod::GraphNeighbor,
                    });
                }
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                debug!(seed = seed.chunk.id, %err, "neighbor expansion failed, truncating seed");
            }
        }

        match hierarchical_context(store, &seed.chunk.path, config).await {
            Ok(context) => {
                for chunk in distinct_context(context, seed.chunk.id) {
                    map.insert_new(RetrievalResult {
                        chunk,
                        score: seed.score * config.hierarchy_weight,
                        similarity: 0.0,
                        graph_distance: 0,
                        method: RetrievalMethod::Hierarchical,
                    });
                }
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                debug!(seed = seed.chunk.id, %err, "hierarchy expansion failed, truncating seed");
            }
        }
    }

    Ok(map.into_ranked(None))
}

/// Multi-Hop: vector seeds expanded by BFS, farther hits decayed by
/// `1 / (distance + 1)`.
pub async fn multi_hop(
    store: &dyn Store,
    query: &[f32],
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    let seeds = vector_retrieve(store, query, config, cancel).await?;
    let opts = config.traversal_options();
    let mut map = FusionMap::new();
    for seed in &seeds {
        map.insert_new(seed.clone());
    }

    for seed in &seeds {
        ensure_live(cancel)?;
        match bfs(store, seed.chunk.id, &opts, cancel).await {
            Ok(reached) => {
                for result in reached.into_iter().filter(|r| r.distance > 0) {
                    if map.contains(result.chunk.id) {
                        continue;
                    }
                    let score =
                        seed.score * config.graph_weight / (result.distance as f64 + 1.0);
                    map.insert_new(RetrievalResult {
                        chunk: result.chunk,
                        score,
                        similarity: 0.0,
                        graph_distance: result.distance,
                        method: RetrievalMethod::MultiHop,
                    });
                }
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                debug!(seed = seed.chunk.id, %err, "multi-hop expansion failed, truncating seed");
            }
        }
    }

    Ok(map.into_ranked(None))
}

/// Hybrid: weighted additive fusion of all three signals.
///
/// Vector contributes a continuous magnitude (`similarity × VectorWeight`),
/// the graph an inverse-distance bonus (`GraphWeight / distance`), and the
/// hierarchy a fixed bonus per structural relationship. Bonuses accumulate
/// on chunks already in the map, so overlapping signals raise a chunk's
/// rank.
pub async fn hybrid(
    store: &dyn Store,
    query: &[f32],
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    let seeds = vector_retrieve(store, query, config, cancel).await?;
    let mut map = FusionMap::new();
    for seed in &seeds {
        map.insert_new(RetrievalResult {
            chunk: seed.chunk.clone(),
            score: seed.similarity * config.vector_weight,
            similarity: seed.similarity,
            graph_distance: 0,
            method: RetrievalMethod::Hybrid,
        });
    }

    if config.max_hops > 0 {
        let opts = config.traversal_options();
        for seed in &seeds {
            ensure_live(cancel)?;
            match bfs(store, seed.chunk.id, &opts, cancel).await {
                Ok(reached) => {
                    for result in reached.into_iter().filter(|r| r.distance > 0) {
                        let bonus = config.graph_weight / result.distance as f64;
                        if !map.boost(result.chunk.id, bonus) {
                            map.insert_new(RetrievalResult {
                                chunk: result.chunk,
                                score: bonus,
                                similarity: 0.0,
                                graph_distance: result.distance,
                                method: RetrievalMethod::Hybrid,
                            });
                        }
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    debug!(seed = seed.chunk.id, %err, "graph expansion failed, truncating seed");
                }
            }
        }
    }

    if config.wants_hierarchy() {
        for seed in &seeds {
            ensure_live(cancel)?;
            match hierarchical_context(store, &seed.chunk.path, config).await {
                Ok(context) => {
                    for chunk in distinct_context(context, seed.chunk.id) {
                        if !map.boost(chunk.id, config.hierarchy_weight) {
                            map.insert_new(RetrievalResult {
                                chunk,
                                score: config.hierarchy_weight,
                                similarity: 0.0,
                                graph_distance: 0,
                                method: RetrievalMethod::Hybrid,
                            });
                        }
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    debug!(seed = seed.chunk.id, %err, "hierarchy expansion failed, truncating seed");
                }
            }
        }
    }

    Ok(map.into_ranked(Some(config.top_k)))
}

/// Entity-Centric: chunks mentioning the entity, optionally fanned out
/// through the graph.
///
/// Fails with `NotFound` if the entity does not exist. Mention seeds score
/// 1.0; fan-out hits score `GraphWeight / distance`.
pub async fn entity_centric(
    store: &dyn Store,
    entity_id: i64,
    config: &QueryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>> {
    ensure_live(cancel)?;
    store.get_entity(entity_id).await?;

    let seeds = store.chunks_by_entity(entity_id).await?;
    let mut map = FusionMap::new();
    let seed_ids: Vec<i64> = seeds.iter().map(|c| c.id).collect();
    for chunk in seeds {
        map.insert_new(RetrievalResult {
            chunk,
            score: 1.0,
            similarity: 0.0,
            graph_distance: 0,
            method: RetrievalMethod::EntityCentric,
        });
    }

    if config.max_hops > 0 {
        let opts = config.traversal_options();
        for seed_id in seed_ids {
            ensure_live(cancel)?;
            match bfs(store, seed_id, &opts, cancel).await {
                Ok(reached) => {
                    for result in reached.into_iter().filter(|r| r.distance > 0) {
                        map.insert_new(RetrievalResult {
                            chunk: result.chunk,
                            score: config.graph_weight / result.distance as f64,
                            similarity: 0.0,
                            graph_distance: result.distance,
                            method: RetrievalMethod::EntityFanout,
                        });
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    debug!(seed = seed_id, %err, "entity fan-out failed, truncating seed");
                }
            }
        }
    }

    let limit = if config.top_k > 0 {
        Some(config.top_k)
    } else {
        None
    };
    Ok(map.into_ranked(limit))
}
