//! WoT Explorer Core - graph model and trust scoring for web-of-trust exploration
//!
//! This crate provides the synchronous primitives:
//! - Trust formula mapping (distance, path count) to a score
//! - Graph nodes, edges and the single-writer state store
//! - Filter/projection of the visible subgraph
//! - Relay event model (events, subscription filters, profiles)

pub mod trust;
pub mod graph;
pub mod store;
pub mod filter;
pub mod event;
pub mod identity;

pub use trust::*;
pub use graph::*;
pub use store::*;
pub use filter::*;
pub use event::*;
pub use identity::*;

/// Nodes at or beyond this distance are never expanded
pub const MAX_EXPANSION_DISTANCE: u32 = 3;

/// Minimum trust score
pub const MIN_TRUST: f64 = 0.0;

/// Maximum trust score
pub const MAX_TRUST: f64 = 1.0;
