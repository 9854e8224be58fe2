//! Expansion Controller
//!
//! Drives one node from `unexpanded` through `expanding` to `expanded`:
//! 1. Fetch the node's follow list from the trust provider
//! 2. Split targets into known and newly discovered identities
//! 3. Resolve trust facts for new identities (cache, then one provider batch)
//! 4. Collect the node's mute list from the relays, if configured
//! 5. Submit nodes and links to the store as one merge
//! 6. Load profiles and re-resolve unknown path counts in the background
//!
//! Expansions of different nodes run concurrently. Per node they are
//! mutually exclusive through the in-flight set; the guard is released on
//! every exit path, including cancellation.

use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use wot_core::{
    is_identity_key, short_key, Applied, Filter, GraphCommand, GraphEdge, GraphNode, IdentityError,
    TrustFact, KIND_MUTE_LIST,
};
use wot_relay::MultiRelayFetcher;

use crate::{Cache, ExplorerConfig, ProfileLoader, ProviderError, SharedProvider, SharedStore};

/// Errors from an expansion
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Trust provider unavailable: {0}")]
    Unavailable(String),

    #[error("Trust provider error: {0}")]
    Provider(ProviderError),

    #[error("Trust provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl ExplorerError {
    /// Only a missing capability is reported to the user
    pub fn is_user_facing(&self) -> bool {
        matches!(self, ExplorerError::Unavailable(_))
    }
}

impl From<ProviderError> for ExplorerError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(reason) => ExplorerError::Unavailable(reason),
            other => ExplorerError::Provider(other),
        }
    }
}

/// Why an expansion did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownNode,
    TooDeep,
    AlreadyExpanded,
    InFlight,
}

/// What one expansion contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionReport {
    pub node: String,
    pub follows: usize,
    pub nodes_added: usize,
    pub links_added: usize,
    pub corroborated: usize,
    pub mutes: usize,
    /// New identities whose path count is still unknown
    pub unresolved: usize,
}

/// Result of `expand`
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    Expanded(ExpansionReport),
    Skipped(SkipReason),
    /// The session moved to another root while this expansion ran
    Abandoned,
}

/// Clears the in-flight mark when dropped
struct InFlightGuard {
    set: Arc<DashSet<(u64, String)>>,
    key: (u64, String),
}

impl InFlightGuard {
    fn acquire(set: &Arc<DashSet<(u64, String)>>, epoch: u64, id: &str) -> Option<Self> {
        let key = (epoch, id.to_string());
        set.insert(key.clone()).then(|| Self {
            set: set.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Bounded breadth-first expansion over one store
pub struct ExpansionController {
    store: SharedStore,
    cache: Arc<Cache>,
    config: ExplorerConfig,
    provider: Option<SharedProvider>,
    relays: Option<MultiRelayFetcher>,
    relay_budget: Duration,
    profiles: Arc<ProfileLoader>,
    in_flight: Arc<DashSet<(u64, String)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ExpansionController {
    pub fn new(store: SharedStore, cache: Arc<Cache>, config: ExplorerConfig) -> Self {
        let relay_budget = Duration::from_secs(3);
        Self {
            profiles: Arc::new(ProfileLoader::new(None, cache.clone(), relay_budget)),
            store,
            cache,
            config,
            provider: None,
            relays: None,
            relay_budget,
            in_flight: Arc::new(DashSet::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use relays for profiles and mute lists, each fetch bounded by `budget`
    pub fn with_relays(mut self, fetcher: MultiRelayFetcher, budget: Duration) -> Self {
        self.profiles = Arc::new(ProfileLoader::new(
            Some(fetcher.clone()),
            self.cache.clone(),
            budget,
        ));
        self.relays = Some(fetcher);
        self.relay_budget = budget;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn provider(&self) -> Option<&SharedProvider> {
        self.provider.as_ref()
    }

    pub fn relays(&self) -> Option<&MultiRelayFetcher> {
        self.relays.as_ref()
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Expansions currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_expanding(&self, id: &str) -> bool {
        self.in_flight.contains(&(self.store.epoch(), id.to_string()))
    }

    /// Expand one node
    pub async fn expand(&self, id: &str) -> Result<ExpandOutcome, ExplorerError> {
        let (epoch, distance) = match self.store.read(|s| (s.epoch(), s.node(id).map(|n| n.distance))) {
            (epoch, Some(distance)) => (epoch, distance),
            (_, None) => return Ok(ExpandOutcome::Skipped(SkipReason::UnknownNode)),
        };
        if distance >= self.config.expansion_limit() {
            trace!("Not expanding {} at distance {}", short_key(id), distance);
            return Ok(ExpandOutcome::Skipped(SkipReason::TooDeep));
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, epoch, id) else {
            return Ok(ExpandOutcome::Skipped(SkipReason::InFlight));
        };
        // read after taking the guard so a just-finished expansion is seen
        if self.store.read(|s| s.is_expanded(id)) {
            return Ok(ExpandOutcome::Skipped(SkipReason::AlreadyExpanded));
        }

        let provider = self
            .provider
            .clone()
            .ok_or_else(|| ExplorerError::Unavailable("no trust provider configured".to_string()))?;

        let follows = self.call(provider.follows(id)).await?;
        let follows = normalize_follows(id, follows);

        let (known, discovered): (Vec<String>, Vec<String>) = self
            .store
            .read(|s| follows.iter().cloned().partition(|t| s.contains(t)));

        let (facts, mutes) = tokio::join!(
            self.resolve(&provider, &discovered),
            self.fetch_mutes(id)
        );

        let child_distance = distance + 1;
        let nodes: Vec<GraphNode> = discovered
            .iter()
            .map(|t| {
                GraphNode::discovered(t, child_distance, &self.config.trust)
                    .with_network(facts.get(t).cloned())
            })
            .collect();

        let mut links: Vec<GraphEdge> = follows.iter().map(|t| GraphEdge::follow(id, t)).collect();

        let discovered_set: HashSet<&String> = discovered.iter().collect();
        let mute_links: Vec<GraphEdge> = self.store.read(|s| {
            mutes
                .iter()
                .filter(|t| t.as_str() != id && (s.contains(t) || discovered_set.contains(t)))
                .map(|t| GraphEdge::mute(id, t))
                .collect()
        });
        let mute_count = mute_links.len();
        links.extend(mute_links);

        let unresolved: Vec<String> = discovered
            .iter()
            .filter(|t| facts.get(*t).map_or(true, |f| f.is_unresolved()))
            .cloned()
            .collect();

        let report = match self.store.dispatch(GraphCommand::Merge {
            epoch,
            nodes,
            links,
            expanded: Some(id.to_string()),
        }) {
            Applied::Merged(report) => report,
            _ => {
                debug!("Expansion of {} outlived its session", short_key(id));
                return Ok(ExpandOutcome::Abandoned);
            }
        };

        info!(
            "Expanded {}: {} follows ({} known, {} new), {} mutes",
            short_key(id),
            follows.len(),
            known.len(),
            report.nodes_added,
            mute_count
        );

        self.load_profiles(epoch, discovered);
        self.spawn_reresolve(provider, unresolved.clone());

        Ok(ExpandOutcome::Expanded(ExpansionReport {
            node: id.to_string(),
            follows: follows.len(),
            nodes_added: report.nodes_added,
            links_added: report.links_added,
            corroborated: report.corroborated.len(),
            mutes: mute_count,
            unresolved: unresolved.len(),
        }))
    }

    /// Load profiles in the background and attach them to the store
    pub fn load_profiles(&self, epoch: u64, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let loader = self.profiles.clone();
        let store = self.store.clone();
        self.spawn(async move {
            let profiles: Vec<_> = loader.load(&ids).await.into_values().collect();
            if profiles.is_empty() {
                return;
            }
            if let Applied::Profiles { updated } = store.dispatch(GraphCommand::Profiles { epoch, profiles }) {
                trace!("Attached {} profiles", updated);
            }
        });
    }

    /// Wait for every background task spawned so far
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                let _ = handle.await;
            }
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(tokio::spawn(task));
    }

    /// Provider call bounded by the provider timeout
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ExplorerError> {
        let budget = self.config.provider_timeout();
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result.map_err(ExplorerError::from),
            Err(_) => Err(ExplorerError::Timeout(budget)),
        }
    }

    /// Trust facts for newly discovered identities; failures leave them unresolved
    async fn resolve(&self, provider: &SharedProvider, ids: &[String]) -> HashMap<String, TrustFact> {
        if ids.is_empty() {
            return HashMap::new();
        }
        let mut facts = self.cache.get_trust_many(ids);
        let missing = self.cache.missing_trust(ids);
        if missing.is_empty() {
            return facts;
        }

        match self.call(provider.resolve_batch(&missing)).await {
            Ok(resolved) => {
                let fresh: HashMap<String, TrustFact> = resolved
                    .into_iter()
                    .map(|(id, r)| (id, TrustFact::new(r.distance, r.paths, &self.config.trust)))
                    .collect();
                let resolved_only = fresh
                    .iter()
                    .filter(|(_, f)| !f.is_unresolved())
                    .map(|(id, f)| (id.clone(), f.clone()))
                    .collect();
                self.cache.put_trust(resolved_only);
                facts.extend(fresh);
            }
            Err(e) => warn!("Trust resolution for {} identities failed: {}", missing.len(), e),
        }
        facts
    }

    /// Newest mute list of `id`, empty without relays
    async fn fetch_mutes(&self, id: &str) -> Vec<String> {
        let Some(fetcher) = self.relays.as_ref().filter(|_| self.config.fetch_mutes) else {
            return Vec::new();
        };
        let filter = Filter::new().kind(KIND_MUTE_LIST).authors([id.to_string()]).limit(1);
        fetcher
            .fetch(&filter, self.relay_budget)
            .await
            .latest_by_author()
            .remove(id)
            .map(|event| event.tagged_pubkeys())
            .unwrap_or_default()
    }

    /// Ask the provider again for path counts it could not resolve
    fn spawn_reresolve(&self, provider: SharedProvider, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let cache = self.cache.clone();
        let trust = self.config.trust.clone();
        let budget = self.config.provider_timeout();
        self.spawn(async move {
            let resolved = match tokio::time::timeout(budget, provider.resolve_batch(&ids)).await {
                Ok(Ok(resolved)) => resolved,
                Ok(Err(e)) => {
                    debug!("Background re-resolution failed: {}", e);
                    return;
                }
                Err(_) => {
                    debug!("Background re-resolution timed out");
                    return;
                }
            };
            let facts: HashMap<String, TrustFact> = resolved
                .into_iter()
                .filter(|(_, r)| r.paths.is_some())
                .map(|(id, r)| (id, TrustFact::new(r.distance, r.paths, &trust)))
                .collect();
            trace!("Re-resolved {}/{} identities", facts.len(), ids.len());
            cache.put_trust(facts);
        });
    }
}

impl Drop for ExpansionController {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Valid, distinct follow targets in provider order, without `source`
fn normalize_follows(source: &str, follows: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    follows
        .into_iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| {
            let valid = is_identity_key(f);
            if !valid {
                trace!("Dropping malformed follow target {:?}", f);
            }
            valid && f != source
        })
        .filter(|f| seen.insert(f.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, MemoryTrustProvider};
    use wot_core::{Event, GraphFilters, TrustConfig, KIND_METADATA};
    use wot_relay::{MemoryConnector, MemoryRelay};

    fn pk(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn controller_with(provider: MemoryTrustProvider, root: char) -> (ExpansionController, Arc<MemoryTrustProvider>) {
        let provider = Arc::new(provider);
        let config = ExplorerConfig::default();
        let store = SharedStore::new(TrustConfig::default());
        store.dispatch(GraphCommand::Reset { root: pk(root) });
        let cache = Arc::new(Cache::open(MemoryStorage::shared(), &config));
        let controller = ExpansionController::new(store, cache, config).with_provider(provider.clone());
        (controller, provider)
    }

    fn expanded(outcome: ExpandOutcome) -> ExpansionReport {
        match outcome {
            ExpandOutcome::Expanded(report) => report,
            other => panic!("expected expansion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scoring() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a'), pk('b')])
            .with_follows(&pk('a'), [pk('b'), pk('c')]);
        let (controller, _) = controller_with(provider, 'f');

        let first = expanded(controller.expand(&pk('f')).await.unwrap());
        assert_eq!(first.nodes_added, 2);

        controller.store().read(|s| {
            for id in [pk('a'), pk('b')] {
                let node = s.node(&id).unwrap();
                assert_eq!(node.distance, 1);
                assert_eq!(node.path_count(), 1);
                assert_eq!(node.trust_score(), 1.0);
            }
        });

        let second = expanded(controller.expand(&pk('a')).await.unwrap());
        assert_eq!(second.nodes_added, 1);
        assert_eq!(second.corroborated, 1);

        controller.store().read(|s| {
            let b = s.node(&pk('b')).unwrap();
            assert_eq!(b.path_count(), 2);
            assert_eq!(b.trust_score(), 1.0);

            let c = s.node(&pk('c')).unwrap();
            assert_eq!(c.distance, 2);
            assert_eq!(c.path_count(), 1);
            assert_eq!(c.trust_score(), 0.5);
            assert_eq!(s.links().len(), 4);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_expand_fetches_once() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a')])
            .with_delay(Duration::from_millis(200));
        let (controller, provider) = controller_with(provider, 'f');

        let root = pk('f');
        let (first, second) = tokio::join!(controller.expand(&root), controller.expand(&root));
        let outcomes = [first.unwrap(), second.unwrap()];

        assert_eq!(provider.follow_calls(), 1);
        assert!(outcomes.contains(&ExpandOutcome::Skipped(SkipReason::InFlight)));
        assert_eq!(controller.in_flight(), 0);

        let again = controller.expand(&root).await.unwrap();
        assert_eq!(again, ExpandOutcome::Skipped(SkipReason::AlreadyExpanded));
        assert_eq!(provider.follow_calls(), 1);
    }

    #[tokio::test]
    async fn test_never_expands_at_max_distance() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a')])
            .with_follows(&pk('a'), [pk('b')])
            .with_follows(&pk('b'), [pk('c')])
            .with_follows(&pk('c'), [pk('d')]);
        let (controller, provider) = controller_with(provider, 'f');

        for id in ['f', 'a', 'b'] {
            expanded(controller.expand(&pk(id)).await.unwrap());
        }
        assert_eq!(controller.store().read(|s| s.node(&pk('c')).unwrap().distance), 3);

        let calls = provider.follow_calls();
        let outcome = controller.expand(&pk('c')).await.unwrap();
        assert_eq!(outcome, ExpandOutcome::Skipped(SkipReason::TooDeep));
        assert_eq!(provider.follow_calls(), calls);
        assert!(!controller.store().read(|s| s.contains(&pk('d'))));
    }

    #[tokio::test]
    async fn test_configured_distance_cannot_exceed_hard_limit() {
        let provider = Arc::new(
            MemoryTrustProvider::new()
                .with_follows(&pk('f'), [pk('a')])
                .with_follows(&pk('a'), [pk('b')])
                .with_follows(&pk('b'), [pk('c')])
                .with_follows(&pk('c'), [pk('d')]),
        );
        let config = ExplorerConfig {
            max_distance: 10,
            ..Default::default()
        };
        let store = SharedStore::new(TrustConfig::default());
        store.dispatch(GraphCommand::Reset { root: pk('f') });
        let cache = Arc::new(Cache::open(MemoryStorage::shared(), &config));
        let controller = ExpansionController::new(store, cache, config).with_provider(provider.clone());

        for id in ['f', 'a', 'b'] {
            expanded(controller.expand(&pk(id)).await.unwrap());
        }
        let calls = provider.follow_calls();
        let outcome = controller.expand(&pk('c')).await.unwrap();
        assert_eq!(outcome, ExpandOutcome::Skipped(SkipReason::TooDeep));
        assert_eq!(provider.follow_calls(), calls);
    }

    #[tokio::test]
    async fn test_unknown_node_is_skipped() {
        let (controller, provider) = controller_with(MemoryTrustProvider::new(), 'f');
        let outcome = controller.expand(&pk('7')).await.unwrap();
        assert_eq!(outcome, ExpandOutcome::Skipped(SkipReason::UnknownNode));
        assert_eq!(provider.follow_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_provider_is_unavailable() {
        let config = ExplorerConfig::default();
        let store = SharedStore::new(TrustConfig::default());
        store.dispatch(GraphCommand::Reset { root: pk('f') });
        let cache = Arc::new(Cache::open(MemoryStorage::shared(), &config));
        let controller = ExpansionController::new(store, cache, config);

        let err = controller.expand(&pk('f')).await.unwrap_err();
        assert!(err.is_user_facing());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_expansion_can_be_retried() {
        let (controller, _) = controller_with(MemoryTrustProvider::new().unavailable(), 'f');

        let err = controller.expand(&pk('f')).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Unavailable(_)));
        assert_eq!(controller.in_flight(), 0);
        assert!(!controller.store().read(|s| s.is_expanded(&pk('f'))));

        // a second attempt reaches the provider again
        assert!(controller.expand(&pk('f')).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a')])
            .with_delay(Duration::from_secs(60));
        let (controller, _) = controller_with(provider, 'f');

        let err = controller.expand(&pk('f')).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Timeout(_)));
        assert!(!err.is_user_facing());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_discarded_after_root_change() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a')])
            .with_delay(Duration::from_millis(500));
        let (controller, _) = controller_with(provider, 'f');
        let store = controller.store().clone();

        let root = pk('f');
        let expansion = controller.expand(&root);
        let reset = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            store.dispatch(GraphCommand::Reset { root: root.clone() });
        };
        let (outcome, _) = tokio::join!(expansion, reset);

        assert_eq!(outcome.unwrap(), ExpandOutcome::Abandoned);
        controller.store().read(|s| {
            assert_eq!(s.nodes().len(), 1);
            assert!(!s.is_expanded(&pk('f')));
        });
    }

    #[tokio::test]
    async fn test_trust_facts_cached_and_unresolved_reresolved() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a'), pk('b')])
            .with_resolution(&pk('a'), 2, Some(5))
            .with_resolution(&pk('b'), 3, None);
        let (controller, provider) = controller_with(provider, 'f');

        let report = expanded(controller.expand(&pk('f')).await.unwrap());
        assert_eq!(report.unresolved, 1);
        controller.settle().await;
        assert_eq!(provider.resolve_calls(), 2, "one batch plus one re-resolution");

        let a = controller.store().read(|s| s.node(&pk('a')).unwrap().network.clone());
        assert_eq!(a.unwrap().paths, Some(5));
        assert!(controller.cache().get_trust(&pk('a')).is_some());
        assert!(controller.cache().get_trust(&pk('b')).is_none());

        // the next session starts from the cache for resolved identities
        controller.store().dispatch(GraphCommand::Reset { root: pk('f') });
        provider.set_resolution(&pk('b'), 3, Some(1));
        expanded(controller.expand(&pk('f')).await.unwrap());
        controller.settle().await;
        assert_eq!(provider.resolve_calls(), 3);
        assert_eq!(controller.cache().get_trust(&pk('b')).unwrap().paths, Some(1));
    }

    #[tokio::test]
    async fn test_mutes_and_profiles_from_relays() {
        let mute_list = Event::new(
            &pk('a'),
            10,
            KIND_MUTE_LIST,
            vec![
                vec!["p".into(), pk('b')],
                vec!["p".into(), pk('8')],
            ],
            "",
        );
        let profile = Event::new(&pk('a'), 5, KIND_METADATA, vec![], r#"{"name":"alice"}"#);
        let connector = Arc::new(
            MemoryConnector::new().with_relay("wss://one", MemoryRelay::new(vec![mute_list, profile])),
        );
        let fetcher = MultiRelayFetcher::new(connector, vec!["wss://one".to_string()]);

        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a'), pk('b')])
            .with_follows(&pk('a'), [pk('c')]);
        let (controller, _) = controller_with(provider, 'f');
        let controller = controller.with_relays(fetcher, Duration::from_secs(3));

        let first = expanded(controller.expand(&pk('f')).await.unwrap());
        assert_eq!(first.mutes, 0);
        let second = expanded(controller.expand(&pk('a')).await.unwrap());
        assert_eq!(second.mutes, 1);
        controller.settle().await;

        controller.store().read(|s| {
            assert!(!s.contains(&pk('8')), "mutes never create nodes");
            assert!(s.has_link(&pk('a'), &pk('b')));
            assert_eq!(s.node(&pk('b')).unwrap().path_count(), 1);
            assert_eq!(s.stats().mutes, 1);
            assert_eq!(s.profile(&pk('a')).unwrap().name.as_deref(), Some("alice"));
        });

        let visible = controller.store().project(&GraphFilters::default());
        let a = visible.nodes.iter().find(|n| n.id == pk('a')).unwrap();
        assert_eq!(a.label, "alice");
    }

    #[tokio::test]
    async fn test_mutual_follow_marks_node() {
        let provider = MemoryTrustProvider::new()
            .with_follows(&pk('f'), [pk('a'), pk('b')])
            .with_follows(&pk('a'), [pk('f')]);
        let (controller, _) = controller_with(provider, 'f');

        expanded(controller.expand(&pk('f')).await.unwrap());
        let back = expanded(controller.expand(&pk('a')).await.unwrap());
        assert_eq!(back.corroborated, 0);

        controller.store().read(|s| {
            assert!(s.node(&pk('a')).unwrap().is_mutual);
            assert!(!s.node(&pk('b')).unwrap().is_mutual);
            assert_eq!(s.node(&pk('f')).unwrap().path_count(), 1);
        });
        let filters = GraphFilters {
            show_mutuals_only: true,
            ..Default::default()
        };
        let visible = controller.store().project(&filters);
        assert_eq!(visible.nodes.len(), 2);
        assert!(visible.links.iter().all(|l| l.bidirectional));
    }

    #[test]
    fn test_normalize_follows() {
        let follows = vec![
            pk('a'),
            "not-a-key".to_string(),
            pk('A'),
            pk('f'),
            pk('b'),
        ];
        assert_eq!(normalize_follows(&pk('f'), follows), vec![pk('a'), pk('b')]);
    }
}
