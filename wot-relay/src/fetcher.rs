//! Multi-source fetcher
//!
//! Fans one subscription out to every configured relay at once:
//! - Events from all relays accumulate into one map keyed by event id
//! - A relay is done on end-of-stored-events, refusal, error or close
//! - The fetch resolves once, when every relay is done or the budget expires
//!
//! Partial results are the normal case, not an error. Relays that are still
//! streaming when the budget expires are abandoned and their sockets dropped.

use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use wot_core::{Event, Filter};

use crate::{new_subscription_id, ClientMessage, RelayMessage, SharedConnector};

/// Accumulated result of one fan-out
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Deduplicated events keyed by id
    pub events: HashMap<String, Event>,
    /// Relays that finished within the budget
    pub completed: usize,
    /// Relays queried
    pub relays: usize,
    /// Whether the budget expired first
    pub timed_out: bool,
}

impl FetchOutcome {
    /// Events newest first
    pub fn sorted(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        events
    }

    /// Newest event per author
    pub fn latest_by_author(&self) -> HashMap<String, Event> {
        let mut latest: HashMap<String, Event> = HashMap::new();
        for event in self.events.values() {
            let newer = latest
                .get(&event.pubkey)
                .map_or(true, |e| event.created_at > e.created_at);
            if newer {
                latest.insert(event.pubkey.clone(), event.clone());
            }
        }
        latest
    }
}

/// Concurrent fan-out over redundant relays
#[derive(Clone)]
pub struct MultiRelayFetcher {
    connector: SharedConnector,
    relays: Vec<String>,
}

impl MultiRelayFetcher {
    pub fn new(connector: SharedConnector, relays: Vec<String>) -> Self {
        Self { connector, relays }
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// Query every relay and return whatever arrived within `budget`
    pub async fn fetch(&self, filter: &Filter, budget: Duration) -> FetchOutcome {
        let sink: Arc<DashMap<String, Event>> = Arc::new(DashMap::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let sub_id = new_subscription_id();

        let queries = self.relays.iter().map(|url| {
            query_relay(
                self.connector.clone(),
                url.clone(),
                sub_id.clone(),
                filter.clone(),
                sink.clone(),
                completed.clone(),
            )
        });

        // Dropping the pending queries on timeout releases their connections.
        let timed_out = tokio::time::timeout(budget, join_all(queries))
            .await
            .is_err();

        let outcome = FetchOutcome {
            events: sink
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            completed: completed.load(Ordering::SeqCst),
            relays: self.relays.len(),
            timed_out,
        };

        debug!(
            "Fetch {}: {} events from {}/{} relays{}",
            sub_id,
            outcome.events.len(),
            outcome.completed,
            outcome.relays,
            if timed_out { " (timed out)" } else { "" }
        );
        outcome
    }
}

/// Stream one relay's stored events into the shared sink
async fn query_relay(
    connector: SharedConnector,
    url: String,
    sub_id: String,
    filter: Filter,
    sink: Arc<DashMap<String, Event>>,
    completed: Arc<AtomicUsize>,
) {
    let mut channel = match connector.connect(&url).await {
        Ok(channel) => channel,
        Err(e) => {
            debug!("Relay {} unavailable: {}", url, e);
            completed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    };

    let req = ClientMessage::Req {
        sub_id: sub_id.clone(),
        filter: filter.clone(),
    };
    if let Err(e) = channel.send(&req).await {
        debug!("Relay {} rejected subscription: {}", url, e);
        channel.close().await;
        completed.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let mut accepted = 0usize;
    let mut dropped = 0usize;
    let mut refused = false;

    while let Some(message) = channel.recv().await {
        match message {
            Ok(RelayMessage::Event { sub_id: id, event }) if id == sub_id => {
                if !event.is_well_formed() || !filter.matches(&event) {
                    dropped += 1;
                    continue;
                }
                sink.entry(event.id.clone()).or_insert(event);
                accepted += 1;
            }
            Ok(RelayMessage::Eose { sub_id: id }) if id == sub_id => break,
            Ok(RelayMessage::Closed { sub_id: id, reason }) if id == sub_id => {
                debug!("Relay {} closed subscription: {}", url, reason);
                refused = true;
                break;
            }
            Ok(RelayMessage::Notice(notice)) => trace!("Relay {} notice: {}", url, notice),
            Ok(_) => {}
            Err(e) if e.is_malformed() => {
                dropped += 1;
                trace!("Relay {} sent malformed frame: {}", url, e);
            }
            Err(e) => {
                debug!("Relay {} connection error: {}", url, e);
                break;
            }
        }
    }

    if !refused {
        let _ = channel.send(&ClientMessage::Close { sub_id }).await;
    }
    channel.close().await;

    trace!("Relay {} done: {} accepted, {} dropped", url, accepted, dropped);
    completed.fetch_add(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ending, MemoryConnector, MemoryRelay};
    use tokio::time::Instant;
    use wot_core::{KIND_METADATA, KIND_TEXT_NOTE};

    fn pk(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn note(author: char, at: u64) -> Event {
        Event::new(&pk(author), at, KIND_TEXT_NOTE, vec![], &format!("note {}", at))
    }

    fn fetcher(connector: MemoryConnector) -> (MultiRelayFetcher, Arc<MemoryConnector>) {
        let connector = Arc::new(connector);
        let relays = vec!["wss://one".to_string(), "wss://two".to_string()];
        (MultiRelayFetcher::new(connector.clone(), relays), connector)
    }

    fn notes_filter() -> Filter {
        Filter::new().kind(KIND_TEXT_NOTE).authors([pk('a')])
    }

    #[tokio::test]
    async fn test_dedup_across_relays() {
        let shared = note('a', 10);
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(vec![shared.clone(), note('a', 11)]))
            .with_relay("wss://two", MemoryRelay::new(vec![shared, note('a', 12)]));
        let (fetcher, connector) = fetcher(connector);

        let outcome = fetcher.fetch(&notes_filter(), Duration::from_secs(3)).await;

        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.completed, 2);
        assert!(!outcome.timed_out);
        let times: Vec<u64> = outcome.sorted().iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![12, 11, 10]);

        assert_eq!(connector.counters().closed(), 2);
        assert_eq!(connector.counters().released(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_relay_returns_partial_at_budget() {
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(vec![note('a', 1)]))
            .with_relay(
                "wss://two",
                MemoryRelay::new(vec![note('a', 2)]).ending(Ending::Hang),
            );
        let (fetcher, connector) = fetcher(connector);

        let start = Instant::now();
        let outcome = fetcher.fetch(&notes_filter(), Duration::from_secs(3)).await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.events.len(), 2, "events from the hanging relay are kept");
        assert!(start.elapsed() >= Duration::from_secs(3));

        // the abandoned connection was released, not leaked
        assert_eq!(connector.counters().opened(), 2);
        assert_eq!(connector.counters().released(), 2);
        assert_eq!(connector.counters().closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_early_when_all_relays_done() {
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(vec![note('a', 1)]))
            .with_relay(
                "wss://two",
                MemoryRelay::new(vec![]).ending(Ending::Disconnect),
            );
        let (fetcher, _) = fetcher(connector);

        let start = Instant::now();
        let outcome = fetcher.fetch(&notes_filter(), Duration::from_secs(10)).await;

        assert!(!outcome.timed_out);
        assert_eq!(outcome.completed, 2);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_events_dropped() {
        let mut forged = note('a', 5);
        forged.content = "tampered".to_string();
        let other_kind = Event::new(&pk('a'), 6, KIND_METADATA, vec![], "{}");

        let connector = MemoryConnector::new()
            .with_relay(
                "wss://one",
                MemoryRelay::new(vec![forged, other_kind, note('a', 7)])
                    .raw_frame("garbage")
                    .raw_frame(r#"["NOTICE","hello"]"#),
            )
            .with_relay("wss://two", MemoryRelay::new(vec![]).ending(Ending::Closed));
        let (fetcher, _) = fetcher(connector);

        let filter = Filter::new()
            .kind(KIND_TEXT_NOTE)
            .kind(KIND_METADATA)
            .authors([pk('a')]);
        let outcome = fetcher.fetch(&filter, Duration::from_secs(3)).await;

        let contents: Vec<String> = outcome.sorted().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["note 7".to_string(), "{}".to_string()]);
        assert_eq!(outcome.completed, 2);
    }

    #[tokio::test]
    async fn test_unreachable_relays_count_as_done() {
        let fetcher = MultiRelayFetcher::new(
            Arc::new(MemoryConnector::new()),
            vec!["wss://gone".to_string()],
        );
        let outcome = fetcher.fetch(&notes_filter(), Duration::from_secs(3)).await;
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.completed, 1);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_latest_by_author() {
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(vec![note('a', 1), note('b', 4)]))
            .with_relay("wss://two", MemoryRelay::new(vec![note('a', 3)]));
        let (fetcher, _) = fetcher(connector);

        let filter = Filter::new().kind(KIND_TEXT_NOTE);
        let latest = fetcher
            .fetch(&filter, Duration::from_secs(3))
            .await
            .latest_by_author();

        assert_eq!(latest[&pk('a')].created_at, 3);
        assert_eq!(latest[&pk('b')].created_at, 4);
    }
}
