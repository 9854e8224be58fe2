//! Filter/projection of the visible subgraph
//!
//! Pure function of (state, filters). Profile metadata is overlaid onto the
//! projected nodes; the store itself is never touched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{EdgeType, GraphEdge, GraphNode, GraphState, MAX_EXPANSION_DISTANCE};

/// Projection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilters {
    pub min_trust_score: f64,
    pub max_distance: u32,
    pub show_follows: bool,
    pub show_mutes: bool,
    pub show_mutuals_only: bool,
    pub search_query: String,
}

impl Default for GraphFilters {
    fn default() -> Self {
        Self {
            min_trust_score: 0.0,
            max_distance: MAX_EXPANSION_DISTANCE,
            show_follows: true,
            show_mutes: true,
            show_mutuals_only: false,
            search_query: String::new(),
        }
    }
}

impl GraphFilters {
    fn edge_type_enabled(&self, edge_type: EdgeType) -> bool {
        match edge_type {
            EdgeType::Follow => self.show_follows,
            EdgeType::Mute => self.show_mutes,
        }
    }

    /// Whether a (profile-overlaid) node passes
    pub fn node_passes(&self, node: &GraphNode) -> bool {
        if node.trust_score() < self.min_trust_score || node.distance > self.max_distance {
            return false;
        }
        if self.show_mutuals_only && !node.is_root && !node.is_mutual {
            return false;
        }
        let query = self.search_query.trim().to_lowercase();
        query.is_empty()
            || node.label.to_lowercase().contains(&query)
            || node.id.to_lowercase().contains(&query)
    }
}

/// The visible part of the graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,
}

/// Derive the visible subgraph
pub fn project(state: &GraphState, filters: &GraphFilters) -> Subgraph {
    let nodes: Vec<GraphNode> = state
        .nodes()
        .iter()
        .map(|node| overlay_profile(state, node))
        .filter(|node| filters.node_passes(node))
        .collect();

    let visible: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let links = state
        .links()
        .iter()
        .filter(|link| {
            filters.edge_type_enabled(link.edge_type)
                && visible.contains(link.source.as_str())
                && visible.contains(link.target.as_str())
                && (!filters.show_mutuals_only || link.bidirectional)
        })
        .cloned()
        .collect();

    Subgraph { nodes, links }
}

/// Node with its profile label and picture applied
pub fn overlay_profile(state: &GraphState, node: &GraphNode) -> GraphNode {
    let mut node = node.clone();
    if let Some(profile) = state.profile(&node.id) {
        if let Some(label) = profile.label() {
            node.label = label.to_string();
        }
        if profile.picture.is_some() {
            node.picture = profile.picture.clone();
        }
    }
    node
}
