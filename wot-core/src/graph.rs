//! Graph nodes and edges
//!
//! Nodes are created once, on first discovery, and only ever mutated to add
//! corroborating paths. Trust scores are derived; callers cannot set them.

use serde::{Deserialize, Serialize};

use crate::{short_key, TrustConfig, TrustFact};

/// A participant in the explored graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Identity key (unique)
    pub id: String,
    /// Display label (profile overlays are applied at projection time)
    pub label: String,
    /// Optional picture URL
    pub picture: Option<String>,
    /// Hops from the root, fixed at first discovery
    pub distance: u32,
    /// Distinct follow edges observed into this node
    path_count: u32,
    /// Derived trust score
    trust_score: f64,
    /// Exactly one root per graph
    pub is_root: bool,
    /// Root follows this node and this node follows the root
    pub is_mutual: bool,
    /// Trust fact reported by the provider, relative to its local identity
    pub network: Option<TrustFact>,
}

impl GraphNode {
    /// Create the root node
    pub fn root(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: short_key(id),
            picture: None,
            distance: 0,
            path_count: 1,
            trust_score: crate::MAX_TRUST,
            is_root: true,
            is_mutual: false,
            network: None,
        }
    }

    /// Create a node at first discovery (one observed path)
    pub fn discovered(id: &str, distance: u32, config: &TrustConfig) -> Self {
        Self {
            id: id.to_string(),
            label: short_key(id),
            picture: None,
            distance,
            path_count: 1,
            trust_score: config.score(distance, 1),
            is_root: false,
            is_mutual: false,
            network: None,
        }
    }

    pub fn with_network(mut self, fact: Option<TrustFact>) -> Self {
        self.network = fact;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn path_count(&self) -> u32 {
        self.path_count
    }

    pub fn trust_score(&self) -> f64 {
        self.trust_score
    }

    /// Record one more corroborating path and rescore
    pub(crate) fn corroborate(&mut self, config: &TrustConfig) {
        self.path_count = self.path_count.saturating_add(1);
        self.trust_score = config.score(self.distance, self.path_count);
    }
}

/// Kind of relationship an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Follow,
    Mute,
}

/// A directed edge between two identities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Target's trust score, kept in step with it by the store
    pub strength: f64,
    /// Reverse follow also observed
    pub bidirectional: bool,
}

impl GraphEdge {
    pub fn follow(source: &str, target: &str) -> Self {
        Self::new(source, target, EdgeType::Follow)
    }

    pub fn mute(source: &str, target: &str) -> Self {
        Self::new(source, target, EdgeType::Mute)
    }

    fn new(source: &str, target: &str, edge_type: EdgeType) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            edge_type,
            strength: 0.0,
            bidirectional: false,
        }
    }

    /// Identity of a link within the store
    pub fn key(&self) -> (String, String) {
        (self.source.clone(), self.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_node_scored_at_creation() {
        let config = TrustConfig::default();
        let node = GraphNode::discovered(&"b".repeat(64), 2, &config);
        assert_eq!(node.path_count(), 1);
        assert_eq!(node.trust_score(), 0.5);
        assert!(!node.is_root);
    }

    #[test]
    fn test_corroborate_rescore() {
        let config = TrustConfig::default();
        let mut node = GraphNode::discovered("c", 3, &config);
        node.corroborate(&config);
        assert_eq!(node.path_count(), 2);
        assert!(node.trust_score() > 0.25);
    }

    #[test]
    fn test_edge_serializes_type_field() {
        let edge = GraphEdge::mute("a", "b");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "mute");
    }
}
