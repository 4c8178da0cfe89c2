//! Breadth- and depth-first traversal over chunk-to-chunk edges.
//!
//! Traversal nodes are only chunks: edges with an entity endpoint are
//! skipped silently. Direction follows each edge's own `bidirectional`
//! flag — from the source every edge is walkable, from the target only
//! bidirectional ones.
//!
//! The graph is not guaranteed acyclic, so both traversals keep a visited
//! set keyed by chunk id. Edge-fetch failures abort the traversal (they
//! would silently under-report results otherwise); a failed fetch of a
//! single neighbor chunk just drops that neighbor.

use std::collections::{HashSet, VecDeque};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Edge, EdgeType, TraversalResult};
use crate::store::Store;

/// Bounds and filters for a single traversal.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Maximum distance of returned chunks. Nodes at this distance are
    /// emitted but not expanded. `0` returns only the source.
    pub max_hops: usize,
    /// Edge-type allow-list; empty admits all types.
    pub edge_types: Vec<EdgeType>,
    /// Reserved global override. Each edge's own `bidirectional` flag
    /// governs traversal regardless of this setting.
    pub follow_bidirectional: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_hops: 2,
            edge_types: Vec::new(),
            follow_bidirectional: true,
        }
    }
}

impl TraversalOptions {
    pub fn with_max_hops(max_hops: usize) -> Self {
        Self {
            max_hops,
            ..Self::default()
        }
    }
}

/// The chunk reachable from `node` over `edge`, if any.
///
/// Chunk→chunk edges are walkable forward from their source, and backward
/// from their target only when marked bidirectional. Edges touching an
/// entity never participate in chunk traversal.
fn neighbor_via(edge: &Edge, node: i64) -> Option<i64> {
    let source = edge.source.chunk_id()?;
    let target = edge.target.chunk_id()?;
    if source == node {
        Some(target)
    } else if target == node && edge.bidirectional {
        Some(source)
    } else {
        None
    }
}

/// Distinct neighbor chunk ids of `node`, in store edge order (outgoing
/// edges first, then walkable incoming ones).
pub(crate) async fn neighbor_ids(
    store: &dyn Store,
    node: i64,
    edge_types: &[EdgeType],
) -> Result<Vec<i64>> {
    let outgoing = store.edges_from_chunk(node, edge_types).await?;
    let incoming = store.edges_to_chunk(node, edge_types).await?;

    let mut seen = HashSet::new();
    let mut neighbors = Vec::new();
    for edge in outgoing.iter().chain(incoming.iter()) {
        if let Some(id) = neighbor_via(edge, node) {
            if seen.insert(id) {
                neighbors.push(id);
            }
        }
    }
    Ok(neighbors)
}

/// Breadth-first traversal from `source`.
///
/// Returns results in non-decreasing distance order, the source first at
/// distance 0. Each result owns its walked id path (`distance + 1` ids from
/// source to self). Fails with `NotFound` if the source chunk does not
/// exist.
pub async fn bfs(
    store: &dyn Store,
    source: i64,
    opts: &TraversalOptions,
    cancel: &CancellationToken,
) -> Result<Vec<TraversalResult>> {
    let source_chunk = store.get_chunk(source).await?;

    let mut results = vec![TraversalResult {
        chunk: source_chunk,
        distance: 0,
        path: vec![source],
    }];
    let mut visited: HashSet<i64> = HashSet::from([source]);
    let mut queue: VecDeque<(i64, usize, Vec<i64>)> =
        VecDeque::from([(source, 0, vec![source])]);

    while let Some((node, distance, walked)) = queue.pop_front() {
        if distance >= opts.max_hops {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        for id in neighbor_ids(store, node, &opts.edge_types).await? {
            if !visited.insert(id) {
                continue;
            }
            let chunk = match store.get_chunk(id).await {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!(chunk_id = id, %err, "skipping unfetchable neighbor");
                    continue;
                }
            };
            let mut path = walked.clone();
            path.push(id);
            results.push(TraversalResult {
                chunk,
                distance: distance + 1,
                path: path.clone(),
            });
            queue.push_back((id, distance + 1, path));
        }
    }

    Ok(results)
}

/// Depth-first traversal from `source`.
///
/// Preorder: the source is emitted first, then each neighbor subtree in the
/// order edges are returned by the store. A chunk is emitted the first time
/// it is reached and never again. Depth bound and failure handling match
/// [`bfs`].
pub async fn dfs(
    store: &dyn Store,
    source: i64,
    opts: &TraversalOptions,
    cancel: &CancellationToken,
) -> Result<Vec<TraversalResult>> {
    let source_chunk = store.get_chunk(source).await?;

    let mut results = Vec::new();
    let mut visited: HashSet<i64> = HashSet::new();
    // Explicit stack; neighbors are pushed reversed so pop order matches
    // the recursive visit order.
    let mut stack: Vec<(i64, usize, Vec<i64>)> = vec![(source, 0, vec![source])];
    let mut prefetched = Some(source_chunk);

    while let Some((node, distance, walked)) = stack.pop() {
        if visited.contains(&node) {
            continue;
        }
        let chunk = match prefetched.take() {
            Some(chunk) => chunk,
            None => match store.get_chunk(node).await {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!(chunk_id = node, %err, "skipping unfetchable neighbor");
                    continue;
                }
            },
        };
        visited.insert(node);
        results.push(TraversalResult {
            chunk,
            distance,
            path: walked.clone(),
        });

        if distance >= opts.max_hops {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let neighbors = neighbor_ids(store, node, &opts.edge_types).await?;
        for id in neighbors.into_iter().rev() {
            if !visited.contains(&id) {
                let mut path = walked.clone();
                path.push(id);
                stack.push((id, distance + 1, path));
            }
        }
    }

    Ok(results)
}
