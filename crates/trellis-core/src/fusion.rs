//! Score fusion: merging overlapping result sets by chunk id.
//!
//! Every strategy accumulates into a [`FusionMap`] — a chunk-id-keyed map of
//! running [`RetrievalResult`]s with an insertion-order log. The log makes
//! ranking deterministic: the final sort is stable and descending by score,
//! so equal-score entries keep their insertion order. Fusion is
//! order-independent in the sense that inserting an existing id is a no-op
//! and boosts are additive.

use std::collections::HashMap;

use crate::models::RetrievalResult;

/// Chunk-id-keyed accumulator for strategy results.
#[derive(Default)]
pub struct FusionMap {
    entries: HashMap<i64, RetrievalResult>,
    order: Vec<i64>,
}

impl FusionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, chunk_id: i64) -> bool {
        self.entries.contains_key(&chunk_id)
    }

    /// Insert a result if its chunk is not yet present.
    ///
    /// Returns true if the result was inserted. Re-inserting an existing
    /// chunk changes nothing, which keeps fusion idempotent under repeated
    /// seeds.
    pub fn insert_new(&mut self, result: RetrievalResult) -> bool {
        let id = result.chunk.id;
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, result);
        self.order.push(id);
        true
    }

    /// Add `delta` to an existing entry's score. Returns true if the entry
    /// was present.
    pub fn boost(&mut self, chunk_id: i64, delta: f64) -> bool {
        match self.entries.get_mut(&chunk_id) {
            Some(entry) => {
                entry.score += delta;
                true
            }
            None => false,
        }
    }

    /// Drain into a ranked list: descending by score, ties by insertion
    /// order, truncated to `limit` when given.
    pub fn into_ranked(mut self, limit: Option<usize>) -> Vec<RetrievalResult> {
        let order = std::mem::take(&mut self.order);
        let mut results: Vec<RetrievalResult> = order
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Metadata, RetrievalMethod};

    fn result(id: i64, score: f64) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id,
                document_id: 1,
                content: format!("chunk {id}"),
                path: format!("d.p{id}").parse().unwrap(),
                embedding: None,
                start_offset: None,
                end_offset: None,
                chunk_index: None,
                metadata: Metadata::new(),
            },
            score,
            similarity: score,
            graph_distance: 0,
            method: RetrievalMethod::Vector,
        }
    }

    #[test]
    fn test_insert_new_is_idempotent() {
        let mut map = FusionMap::new();
        assert!(map.insert_new(result(1, 0.9)));
        assert!(!map.insert_new(result(1, 0.1)));
        let ranked = map.into_ranked(None);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_boost_accumulates() {
        let mut map = FusionMap::new();
        map.insert_new(result(1, 0.4));
        assert!(map.boost(1, 0.25));
        assert!(map.boost(1, 0.1));
        assert!(!map.boost(2, 1.0));
        let ranked = map.into_ranked(None);
        assert!((ranked[0].score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_descending_with_truncation() {
        let mut map = FusionMap::new();
        map.insert_new(result(1, 0.2));
        map.insert_new(result(2, 0.9));
        map.insert_new(result(3, 0.5));
        let ranked = map.into_ranked(Some(2));
        let ids: Vec<i64> = ranked.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut map = FusionMap::new();
        map.insert_new(result(7, 0.5));
        map.insert_new(result(3, 0.5));
        map.insert_new(result(5, 0.5));
        let ranked = map.into_ranked(None);
        let ids: Vec<i64> = ranked.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec![7, 3, 5]);
    }
}
