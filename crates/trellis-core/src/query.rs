//! Query configuration shared by every retrieval strategy.

use serde::{Deserialize, Serialize};

use crate::models::EdgeType;
use crate::traversal::TraversalOptions;

/// Which strategy a text query dispatches to.
///
/// Entity-centric retrieval starts from an entity id rather than query
/// text, so it has its own entry point on the retriever instead of a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Pure vector similarity, no expansion.
    VectorOnly,
    /// Vector seeds expanded one hop through the graph and the hierarchy.
    Contextual,
    /// Vector seeds expanded by BFS with distance-decayed scores.
    MultiHop,
    /// Weighted fusion of vector, graph, and hierarchy signals.
    Hybrid,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" | "vector_only" => Ok(Strategy::VectorOnly),
            "contextual" => Ok(Strategy::Contextual),
            "multi_hop" | "multihop" => Ok(Strategy::MultiHop),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(format!(
                "unknown strategy: {other} (use vector, contextual, multi_hop, or hybrid)"
            )),
        }
    }
}

/// Tuning knobs accepted by every search method.
///
/// Weights are opaque non-negative scalars: they are not normalized and
/// need not sum to one, so callers may dial any signal arbitrarily high.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum results returned to the caller.
    pub top_k: usize,
    /// Minimum cosine similarity for vector hits.
    pub similarity_threshold: f64,
    /// Restrict vector retrieval to these documents; empty means all.
    pub document_ids: Vec<i64>,
    /// Graph depth for multi-hop and hybrid expansion.
    pub max_hops: usize,
    /// Edge-type allow-list; empty admits all types.
    pub edge_types: Vec<EdgeType>,
    /// Reserved global override; each edge's `bidirectional` flag governs.
    pub follow_bidirectional: bool,
    pub include_ancestors: bool,
    pub include_descendants: bool,
    pub include_siblings: bool,
    pub vector_weight: f64,
    pub graph_weight: f64,
    pub hierarchy_weight: f64,
    /// Reserved for callers tuning entity fan-out externally; the shipped
    /// strategies score entity seeds at 1.0.
    pub entity_weight: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.7,
            document_ids: Vec::new(),
            max_hops: 2,
            edge_types: Vec::new(),
            follow_bidirectional: true,
            include_ancestors: false,
            include_descendants: false,
            include_siblings: true,
            vector_weight: 0.6,
            graph_weight: 0.3,
            hierarchy_weight: 0.1,
            entity_weight: 0.5,
        }
    }
}

impl QueryConfig {
    /// True if any hierarchical expansion is enabled.
    pub fn wants_hierarchy(&self) -> bool {
        self.include_ancestors || self.include_descendants || self.include_siblings
    }

    /// Traversal bounds derived from this config.
    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            max_hops: self.max_hops,
            edge_types: self.edge_types.clone(),
            follow_bidirectional: self.follow_bidirectional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.top_k, 5);
        assert!((config.similarity_threshold - 0.7).abs() < 1e-9);
        assert_eq!(config.max_hops, 2);
        assert!(config.follow_bidirectional);
        assert!(!config.include_ancestors);
        assert!(!config.include_descendants);
        assert!(config.include_siblings);
        assert!((config.vector_weight - 0.6).abs() < 1e-9);
        assert!((config.graph_weight - 0.3).abs() < 1e-9);
        assert!((config.hierarchy_weight - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("vector".parse::<Strategy>().unwrap(), Strategy::VectorOnly);
        assert_eq!("hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert_eq!(
            "multi_hop".parse::<Strategy>().unwrap(),
            Strategy::MultiHop
        );
        assert!("nope".parse::<Strategy>().is_err());
    }
}
