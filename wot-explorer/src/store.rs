//! Shared handle to one session's graph state
//!
//! All writes go through [`SharedStore::dispatch`], which holds the write lock
//! for exactly one synchronous `apply`. No merge ever interleaves with
//! another. Readers observe a revision counter to learn about changes.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use wot_core::{project, Applied, GraphCommand, GraphFilters, GraphState, Subgraph, TrustConfig};

/// Single-writer graph store shared between tasks
#[derive(Clone)]
pub struct SharedStore {
    state: Arc<RwLock<GraphState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SharedStore {
    pub fn new(config: TrustConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(GraphState::new(config))),
            revision: Arc::new(revision),
        }
    }

    /// Apply one command and notify subscribers if anything changed
    pub fn dispatch(&self, command: GraphCommand) -> Applied {
        let applied = self.state.write().apply(command);
        match &applied {
            Applied::Stale => trace!("Discarded stale graph command"),
            _ => {
                self.revision.send_modify(|r| *r += 1);
            }
        }
        applied
    }

    /// Run a read-only closure against the current state
    pub fn read<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.state.read())
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> GraphState {
        self.state.read().clone()
    }

    /// Visible subgraph under `filters`
    pub fn project(&self, filters: &GraphFilters) -> Subgraph {
        project(&self.state.read(), filters)
    }

    pub fn epoch(&self) -> u64 {
        self.state.read().epoch()
    }

    /// Revision counter, bumped on every applied command
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wot_core::{GraphEdge, GraphNode};

    #[tokio::test]
    async fn test_dispatch_notifies_and_rejects_stale() {
        let store = SharedStore::new(TrustConfig::default());
        let mut changes = store.subscribe();

        store.dispatch(GraphCommand::Reset { root: "r".into() });
        let epoch = store.epoch();
        assert!(changes.has_changed().unwrap());
        changes.mark_unchanged();

        let config = TrustConfig::default();
        let merged = store.dispatch(GraphCommand::Merge {
            epoch,
            nodes: vec![GraphNode::discovered("a", 1, &config)],
            links: vec![GraphEdge::follow("r", "a")],
            expanded: Some("r".into()),
        });
        assert!(matches!(merged, Applied::Merged(_)));
        assert_eq!(store.read(|s| s.nodes().len()), 2);
        assert!(changes.has_changed().unwrap());
        changes.mark_unchanged();

        store.dispatch(GraphCommand::Reset { root: "s".into() });
        changes.mark_unchanged();
        let stale = store.dispatch(GraphCommand::Merge {
            epoch,
            nodes: vec![GraphNode::discovered("b", 1, &config)],
            links: vec![],
            expanded: None,
        });
        assert_eq!(stale, Applied::Stale);
        assert!(!changes.has_changed().unwrap());
        assert!(!store.read(|s| s.contains("b")));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = SharedStore::new(TrustConfig::default());
        store.dispatch(GraphCommand::Reset { root: "r".into() });
        let before = store.snapshot();
        store.dispatch(GraphCommand::Reset { root: "s".into() });
        assert_eq!(before.root(), Some("r"));
        assert_eq!(store.snapshot().root(), Some("s"));
    }
}
