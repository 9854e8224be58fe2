//! Exploration Session
//!
//! One session explores the graph around one root identity at a time:
//! - Owns its store, cache handle and expansion controller
//! - Holds the UI-facing state (filters, selection, loading and error flags)
//! - Changing the root resets the store; in-flight work of the previous root
//!   is discarded when it tries to write
//!
//! Sessions share nothing but storage, so several may run side by side.

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use wot_core::{
    overlay_profile, parse_identity_key, short_key, GraphCommand, GraphFilters, GraphNode,
    GraphState, GraphStats, Subgraph,
};
use wot_explorer::{
    Cache, CacheStats, ExpandOutcome, ExpansionController, ExplorerConfig, ExplorerError,
    SharedProvider, SharedStorage, SharedStore,
};
use wot_relay::{validate_relay_url, FeedPager, MultiRelayFetcher, RelayConfig, SharedConnector};

/// Session configuration
pub struct SessionConfig {
    pub explorer: ExplorerConfig,
    pub relay: RelayConfig,
    /// Follow-list/trust provider (pre-constructed)
    pub provider: Option<SharedProvider>,
    /// Relay transport; no relays means no profiles, mutes or feeds
    pub connector: Option<SharedConnector>,
    pub storage: SharedStorage,
}

/// Aggregate session statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    #[serde(flatten)]
    pub graph: GraphStats,
    pub cache: CacheStats,
    pub in_flight: usize,
    pub epoch: u64,
}

/// Marks the session busy for as long as it lives
struct Busy<'a>(&'a AtomicUsize);

impl<'a> Busy<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A web-of-trust exploration session
pub struct Session {
    controller: ExpansionController,
    relay_config: RelayConfig,
    feed_fetcher: Option<MultiRelayFetcher>,
    filters: RwLock<GraphFilters>,
    selected: RwLock<Option<String>>,
    error: RwLock<Option<String>>,
    busy: AtomicUsize,
}

impl Session {
    /// Build a session without a root
    pub fn new(config: SessionConfig) -> Result<Self, anyhow::Error> {
        config.explorer.trust.validate()?;
        for url in &config.relay.relays {
            validate_relay_url(url)?;
        }

        let store = SharedStore::new(config.explorer.trust.clone());
        let cache = Arc::new(Cache::open(config.storage, &config.explorer));
        let mut controller = ExpansionController::new(store, cache, config.explorer);
        if let Some(provider) = config.provider {
            controller = controller.with_provider(provider);
        }

        let feed_fetcher = config
            .connector
            .filter(|_| !config.relay.relays.is_empty())
            .map(|connector| MultiRelayFetcher::new(connector, config.relay.relays.clone()));
        if let Some(fetcher) = &feed_fetcher {
            controller = controller.with_relays(fetcher.clone(), config.relay.profile_timeout());
        }

        Ok(Self {
            controller,
            relay_config: config.relay,
            feed_fetcher,
            filters: RwLock::new(GraphFilters::default()),
            selected: RwLock::new(None),
            error: RwLock::new(None),
            busy: AtomicUsize::new(0),
        })
    }

    /// Build a session and expand its root
    ///
    /// The root defaults to the provider's local identity. Fails with
    /// `Unavailable` when there is neither.
    pub async fn start(config: SessionConfig, root: Option<&str>) -> Result<Self, anyhow::Error> {
        let session = Self::new(config)?;

        let root = match root {
            Some(root) => parse_identity_key(root).map_err(ExplorerError::from)?,
            None => session.local_identity().await?,
        };

        session.set_root(&root)?;
        if let Err(e) = session.expand_node(&root).await {
            debug!("Initial expansion of {} failed: {}", short_key(&root), e);
        }
        Ok(session)
    }

    async fn local_identity(&self) -> Result<String, ExplorerError> {
        let provider = self.controller.provider().cloned().ok_or_else(|| {
            ExplorerError::Unavailable("no root given and no trust provider configured".to_string())
        })?;
        let _busy = Busy::enter(&self.busy);
        let identity = provider.local_identity().await.map_err(ExplorerError::from);
        match identity {
            Ok(id) => Ok(parse_identity_key(&id)?),
            Err(e) => {
                self.record(&e);
                Err(e)
            }
        }
    }

    /// Start over at a new root
    pub fn set_root(&self, root: &str) -> Result<(), ExplorerError> {
        let root = parse_identity_key(root)?;
        self.controller.store().dispatch(GraphCommand::Reset { root: root.clone() });
        *self.selected.write() = None;
        *self.error.write() = None;

        info!("Exploring from {}", short_key(&root));
        self.controller
            .load_profiles(self.controller.store().epoch(), vec![root]);
        Ok(())
    }

    pub fn root(&self) -> Option<String> {
        self.controller.store().read(|s| s.root().map(str::to_string))
    }

    /// Expand one node
    pub async fn expand_node(&self, id: &str) -> Result<ExpandOutcome, ExplorerError> {
        let _busy = Busy::enter(&self.busy);
        let outcome = self.controller.expand(id).await;
        if let Err(e) = &outcome {
            self.record(e);
        }
        outcome
    }

    /// Expand breadth-first, one level at a time, up to `depth` hops
    ///
    /// Returns how many nodes were expanded.
    pub async fn expand_to_depth(&self, depth: u32) -> Result<usize, ExplorerError> {
        let _busy = Busy::enter(&self.busy);
        let depth = depth.min(self.controller.config().expansion_limit());
        let mut expanded = 0;

        for level in 0..depth {
            let frontier: Vec<String> = self.controller.store().read(|s| {
                s.nodes()
                    .iter()
                    .filter(|n| n.distance == level && !s.is_expanded(&n.id))
                    .map(|n| n.id.clone())
                    .collect()
            });
            if frontier.is_empty() {
                continue;
            }
            debug!("Expanding {} nodes at distance {}", frontier.len(), level);

            let results = join_all(frontier.iter().map(|id| self.expand_node(id))).await;
            for result in results {
                match result {
                    Ok(ExpandOutcome::Expanded(_)) => expanded += 1,
                    Ok(ExpandOutcome::Abandoned) => return Ok(expanded),
                    Ok(ExpandOutcome::Skipped(_)) => {}
                    Err(e) if e.is_user_facing() => return Err(e),
                    Err(_) => {}
                }
            }
        }
        Ok(expanded)
    }

    /// Surface user-facing errors, log the rest
    fn record(&self, error: &ExplorerError) {
        if error.is_user_facing() {
            *self.error.write() = Some(error.to_string());
        } else {
            warn!("{}", error);
        }
    }

    pub fn set_filters(&self, filters: GraphFilters) {
        *self.filters.write() = filters;
    }

    pub fn filters(&self) -> GraphFilters {
        self.filters.read().clone()
    }

    /// Select a node, or clear the selection with `None`
    pub fn select_node(&self, id: Option<&str>) -> Result<(), ExplorerError> {
        let Some(id) = id else {
            *self.selected.write() = None;
            return Ok(());
        };
        if !self.controller.store().read(|s| s.contains(id)) {
            return Err(ExplorerError::UnknownNode(id.to_string()));
        }
        *self.selected.write() = Some(id.to_string());
        Ok(())
    }

    /// The selected node with its profile applied
    pub fn selected(&self) -> Option<GraphNode> {
        let id = self.selected.read().clone()?;
        self.controller
            .store()
            .read(|s| s.node(&id).map(|n| overlay_profile(s, n)))
    }

    /// Owned copy of the whole graph
    pub fn snapshot(&self) -> GraphState {
        self.controller.store().snapshot()
    }

    /// The subgraph passing the current filters
    pub fn visible(&self) -> Subgraph {
        self.controller.store().project(&self.filters.read())
    }

    pub fn stats(&self) -> SessionStats {
        let store = self.controller.store();
        SessionStats {
            graph: store.read(|s| s.stats()),
            cache: self.controller.cache().stats(),
            in_flight: self.controller.in_flight(),
            epoch: store.epoch(),
        }
    }

    /// Whether any operation is running
    pub fn loading(&self) -> bool {
        self.busy.load(Ordering::SeqCst) > 0 || self.controller.in_flight() > 0
    }

    /// The last user-facing error, if any
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    pub fn clear_error(&self) {
        *self.error.write() = None;
    }

    /// Revision counter that changes on every graph update
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.controller.store().subscribe()
    }

    /// Backward feed over one identity's notes
    pub fn feed(&self, id: &str) -> Result<FeedPager, ExplorerError> {
        let id = parse_identity_key(id)?;
        let fetcher = self
            .feed_fetcher
            .clone()
            .ok_or_else(|| ExplorerError::Unavailable("no relays configured".to_string()))?;
        Ok(FeedPager::new(
            fetcher,
            &id,
            self.relay_config.page_size,
            self.relay_config.feed_timeout(),
        ))
    }

    /// Wait for background profile and trust work
    pub async fn settle(&self) {
        self.controller.settle().await;
    }
}
