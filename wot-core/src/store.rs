//! Graph State Store
//!
//! Normalized node/link collection mutated only through [`GraphCommand`]s
//! consumed by the pure, synchronous [`GraphState::apply`]. Async work stays
//! in the callers; they submit the result as a command.
//!
//! Every session epoch starts with a `Reset`. Commands carry the epoch they
//! were computed against and are discarded if the root has changed since.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::{EdgeType, GraphEdge, GraphNode, Profile, TrustConfig};

/// State mutation commands
#[derive(Debug, Clone)]
pub enum GraphCommand {
    /// Drop everything and start a new epoch at `root`
    Reset { root: String },

    /// Merge newly discovered nodes and links
    Merge {
        epoch: u64,
        nodes: Vec<GraphNode>,
        links: Vec<GraphEdge>,
        /// Node whose expansion produced this merge
        expanded: Option<String>,
    },

    /// Attach profile metadata
    Profiles { epoch: u64, profiles: Vec<Profile> },
}

/// Result of applying a command
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Reset { epoch: u64 },
    Merged(MergeReport),
    Profiles { updated: usize },
    /// Computed against an older epoch; nothing was written
    Stale,
}

/// What a merge changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub nodes_added: usize,
    pub links_added: usize,
    pub links_dropped: usize,
    /// Existing nodes that gained a corroborating path
    pub corroborated: Vec<String>,
}

/// The graph owned by one session
#[derive(Debug, Clone, Serialize)]
pub struct GraphState {
    epoch: u64,
    root: Option<String>,
    nodes: Vec<GraphNode>,
    links: Vec<GraphEdge>,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
    #[serde(skip)]
    link_index: HashMap<(String, String), usize>,
    expanded: HashSet<String>,
    profiles: HashMap<String, Profile>,
    #[serde(skip)]
    config: TrustConfig,
}

impl GraphState {
    /// Create an empty store; it holds no root until the first `Reset`
    pub fn new(config: TrustConfig) -> Self {
        Self {
            epoch: 0,
            root: None,
            nodes: Vec::new(),
            links: Vec::new(),
            node_index: HashMap::new(),
            link_index: HashMap::new(),
            expanded: HashSet::new(),
            profiles: HashMap::new(),
            config,
        }
    }

    /// Apply one command
    pub fn apply(&mut self, command: GraphCommand) -> Applied {
        match command {
            GraphCommand::Reset { root } => {
                self.reset(&root);
                Applied::Reset { epoch: self.epoch }
            }
            GraphCommand::Merge {
                epoch,
                nodes,
                links,
                expanded,
            } => {
                if epoch != self.epoch || self.root.is_none() {
                    return Applied::Stale;
                }
                let report = self.merge(nodes, links);
                if let Some(id) = expanded {
                    self.expanded.insert(id);
                }
                Applied::Merged(report)
            }
            GraphCommand::Profiles { epoch, profiles } => {
                if epoch != self.epoch {
                    return Applied::Stale;
                }
                let mut updated = 0;
                for profile in profiles {
                    let newer = self
                        .profiles
                        .get(&profile.pubkey)
                        .map_or(true, |p| profile.created_at >= p.created_at);
                    if newer {
                        self.profiles.insert(profile.pubkey.clone(), profile);
                        updated += 1;
                    }
                }
                Applied::Profiles { updated }
            }
        }
    }

    fn reset(&mut self, root: &str) {
        let config = std::mem::take(&mut self.config);
        let epoch = self.epoch + 1;
        *self = Self::new(config);
        self.epoch = epoch;
        self.root = Some(root.to_string());
        self.node_index.insert(root.to_string(), 0);
        self.nodes.push(GraphNode::root(root));
    }

    fn merge(&mut self, nodes: Vec<GraphNode>, links: Vec<GraphEdge>) -> MergeReport {
        let mut report = MergeReport::default();
        let mut added: HashSet<String> = HashSet::new();

        for mut node in nodes {
            if self.node_index.contains_key(&node.id) {
                continue;
            }
            node.is_root = false;
            added.insert(node.id.clone());
            self.node_index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
            report.nodes_added += 1;
        }

        let mut rescored: HashSet<String> = HashSet::new();

        for mut link in links {
            let key = link.key();
            if link.source == link.target || self.link_index.contains_key(&key) {
                report.links_dropped += 1;
                continue;
            }

            if link.edge_type == EdgeType::Follow && !added.contains(&link.target) {
                // the root sits at distance 0; paths into it carry no meaning
                if let Some(&idx) = self.node_index.get(&link.target).filter(|&&i| !self.nodes[i].is_root) {
                    self.nodes[idx].corroborate(&self.config);
                    report.corroborated.push(link.target.clone());
                    rescored.insert(link.target.clone());
                }
            }

            link.strength = self.score_of(&link.target);
            link.bidirectional = false;

            if link.edge_type == EdgeType::Follow {
                let reverse = (link.target.clone(), link.source.clone());
                if let Some(&ridx) = self.link_index.get(&reverse) {
                    if self.links[ridx].edge_type == EdgeType::Follow {
                        self.links[ridx].bidirectional = true;
                        link.bidirectional = true;
                        self.mark_mutual(&link.source, &link.target);
                    }
                }
            }

            self.link_index.insert(key, self.links.len());
            self.links.push(link);
            report.links_added += 1;
        }

        if !rescored.is_empty() {
            for i in 0..self.links.len() {
                if rescored.contains(&self.links[i].target) {
                    self.links[i].strength = self.score_of(&self.links[i].target);
                }
            }
        }

        report
    }

    fn mark_mutual(&mut self, a: &str, b: &str) {
        let Some(root) = self.root.clone() else {
            return;
        };
        let other = if a == root {
            b
        } else if b == root {
            a
        } else {
            return;
        };
        if let Some(&idx) = self.node_index.get(other) {
            self.nodes[idx].is_mutual = true;
        }
    }

    fn score_of(&self, id: &str) -> f64 {
        self.node(id).map_or(0.0, |n| n.trust_score())
    }

    /// Current epoch; bumps on every reset
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[GraphEdge] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn has_link(&self, source: &str, target: &str) -> bool {
        self.link_index
            .contains_key(&(source.to_string(), target.to_string()))
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Aggregate counts
    pub fn stats(&self) -> GraphStats {
        let total: f64 = self.nodes.iter().map(|n| n.trust_score()).sum();
        GraphStats {
            nodes: self.nodes.len(),
            links: self.links.len(),
            follows: self
                .links
                .iter()
                .filter(|l| l.edge_type == EdgeType::Follow)
                .count(),
            mutes: self
                .links
                .iter()
                .filter(|l| l.edge_type == EdgeType::Mute)
                .count(),
            mutuals: self.nodes.iter().filter(|n| n.is_mutual).count(),
            expanded: self.expanded.len(),
            avg_trust: if self.nodes.is_empty() {
                0.0
            } else {
                total / self.nodes.len() as f64
            },
        }
    }
}

impl Default for GraphState {
    fn default() -> Self {
        Self::new(TrustConfig::default())
    }
}

/// Graph statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub links: usize,
    pub follows: usize,
    pub mutes: usize,
    pub mutuals: usize,
    pub expanded: usize,
    pub avg_trust: f64,
}
