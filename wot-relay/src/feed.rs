//! Paginated feed fetcher
//!
//! Pages one identity's notes backward in time. Each page asks every relay
//! for `page_size` notes strictly older than the oldest note kept so far,
//! then keeps only the newest `page_size` of the merged answer. Relays of
//! different density would otherwise move the cursor past notes the denser
//! relay has not returned yet.
//! `has_more` is a heuristic: a full page means there may be more.

use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use wot_core::{Event, Filter, KIND_TEXT_NOTE};

use crate::MultiRelayFetcher;

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Items not seen on earlier pages, newest first
    pub items: Vec<Event>,
    pub has_more: bool,
}

/// Cursor over one identity's feed
pub struct FeedPager {
    fetcher: MultiRelayFetcher,
    author: String,
    kinds: Vec<u32>,
    page_size: usize,
    budget: Duration,
    items: Vec<Event>,
    seen: HashSet<String>,
    oldest: Option<u64>,
    has_more: bool,
}

impl FeedPager {
    pub fn new(fetcher: MultiRelayFetcher, author: &str, page_size: usize, budget: Duration) -> Self {
        Self {
            fetcher,
            author: author.to_string(),
            kinds: vec![KIND_TEXT_NOTE],
            page_size: page_size.max(1),
            budget,
            items: Vec::new(),
            seen: HashSet::new(),
            oldest: None,
            has_more: true,
        }
    }

    /// Page over other event kinds
    pub fn with_kinds(mut self, kinds: Vec<u32>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Everything loaded so far, newest first
    pub fn items(&self) -> &[Event] {
        &self.items
    }

    /// Fetch the next older page
    pub async fn next_page(&mut self) -> FeedPage {
        if !self.has_more {
            return FeedPage::default();
        }

        let mut filter = Filter::new()
            .authors([self.author.clone()])
            .limit(self.page_size);
        filter.kinds = self.kinds.clone();
        if let Some(oldest) = self.oldest {
            if oldest == 0 {
                self.has_more = false;
                return FeedPage::default();
            }
            filter = filter.until(oldest - 1);
        }

        let outcome = self.fetcher.fetch(&filter, self.budget).await;
        let merged = outcome.sorted();
        self.has_more = merged.len() >= self.page_size;
        let page = newest_page(merged, self.page_size);

        if let Some(min) = page.iter().map(|e| e.created_at).min() {
            self.oldest = Some(self.oldest.map_or(min, |o| o.min(min)));
        }

        let fresh: Vec<Event> = page
            .into_iter()
            .filter(|e| self.seen.insert(e.id.clone()))
            .collect();
        self.items.extend(fresh.iter().cloned());
        self.items
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        debug!(
            "Feed {}: {} new items, {} total, has_more={}",
            self.author,
            fresh.len(),
            self.items.len(),
            self.has_more
        );

        FeedPage {
            items: fresh,
            has_more: self.has_more,
        }
    }
}

/// The newest `size` events of a newest-first list.
///
/// A timestamp split by the cut is dropped whole so the next `until` cursor
/// fetches it again, unless it fills the entire page.
fn newest_page(mut events: Vec<Event>, size: usize) -> Vec<Event> {
    if events.len() <= size {
        return events;
    }
    let boundary = events[size].created_at;
    events.truncate(size);
    if events[size - 1].created_at == boundary && events[0].created_at != boundary {
        events.retain(|e| e.created_at != boundary);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryConnector, MemoryRelay};
    use std::sync::Arc;

    fn author() -> String {
        "a".repeat(64)
    }

    fn notes(range: std::ops::RangeInclusive<u64>) -> Vec<Event> {
        range
            .map(|t| Event::new(&author(), t, KIND_TEXT_NOTE, vec![], &format!("note {}", t)))
            .collect()
    }

    fn pager(connector: MemoryConnector, page_size: usize) -> (FeedPager, Arc<MemoryConnector>) {
        let connector = Arc::new(connector);
        let fetcher = MultiRelayFetcher::new(
            connector.clone(),
            vec!["wss://one".to_string(), "wss://two".to_string()],
        );
        (
            FeedPager::new(fetcher, &author(), page_size, Duration::from_secs(10)),
            connector,
        )
    }

    #[tokio::test]
    async fn test_pages_backward_without_duplicates() {
        // relays hold overlapping ranges of the same 45 notes
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(notes(1..=45)))
            .with_relay("wss://two", MemoryRelay::new(notes(20..=45)));
        let (mut pager, connector) = pager(connector, 20);

        let first = pager.next_page().await;
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.items[0].created_at, 45);
        assert!(first.has_more);

        let second = pager.next_page().await;
        assert_eq!(second.items.len(), 20);
        assert_eq!(second.items[0].created_at, 25);
        assert!(second.has_more);

        let third = pager.next_page().await;
        assert_eq!(third.items.len(), 5);
        assert!(!third.has_more);

        assert_eq!(pager.items().len(), 45);
        let unique: HashSet<_> = pager.items().iter().map(|e| &e.id).collect();
        assert_eq!(unique.len(), 45);

        // no further queries once exhausted
        let before = connector.subscriptions().len();
        let empty = pager.next_page().await;
        assert!(empty.items.is_empty());
        assert_eq!(connector.subscriptions().len(), before);
    }

    #[tokio::test]
    async fn test_uneven_relays_lose_no_notes() {
        let evens: Vec<Event> = notes(1..=45).into_iter().filter(|e| e.created_at % 2 == 0).collect();
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(notes(1..=45)))
            .with_relay("wss://two", MemoryRelay::new(evens));
        let (mut pager, _) = pager(connector, 20);

        let mut pages = 0;
        loop {
            let page = pager.next_page().await;
            assert!(page.items.len() <= 20);
            pages += 1;
            if !page.has_more || pages > 10 {
                break;
            }
        }

        let loaded: HashSet<u64> = pager.items().iter().map(|e| e.created_at).collect();
        let missing: Vec<u64> = (1..=45).filter(|t| !loaded.contains(t)).collect();
        assert!(missing.is_empty(), "missing {:?}", missing);
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_newest_page_drops_split_timestamp() {
        let events: Vec<Event> = [9, 8, 7, 7, 7, 6]
            .iter()
            .enumerate()
            .map(|(i, &t)| Event::new(&author(), t, KIND_TEXT_NOTE, vec![], &format!("n{}", i)))
            .collect();

        let page = newest_page(events.clone(), 3);
        let times: Vec<u64> = page.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![9, 8]);

        assert_eq!(newest_page(events.clone(), 10).len(), 6);
        assert_eq!(newest_page(events[2..].to_vec(), 2).len(), 2);
    }

    #[tokio::test]
    async fn test_until_cursor_is_strictly_older() {
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(notes(1..=30)))
            .with_relay("wss://two", MemoryRelay::new(vec![]));
        let (mut pager, connector) = pager(connector, 10);

        pager.next_page().await;
        pager.next_page().await;

        let untils: Vec<Option<u64>> = connector.subscriptions().iter().map(|f| f.until).collect();
        assert_eq!(untils, vec![None, None, Some(20), Some(20)]);
    }

    #[tokio::test]
    async fn test_full_page_at_boundary_costs_one_empty_page() {
        let connector = MemoryConnector::new()
            .with_relay("wss://one", MemoryRelay::new(notes(1..=10)))
            .with_relay("wss://two", MemoryRelay::new(vec![]));
        let (mut pager, _) = pager(connector, 10);

        let first = pager.next_page().await;
        assert_eq!(first.items.len(), 10);
        assert!(first.has_more);

        let second = pager.next_page().await;
        assert!(second.items.is_empty());
        assert!(!second.has_more);
    }
}
