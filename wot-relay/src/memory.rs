//! In-memory relays
//!
//! Serve a fixed event set through the same channel interface as the
//! WebSocket transport. Used for offline runs and tests; each relay can be
//! told how to end its stored events so slow or broken relays can be modelled.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wot_core::{Event, Filter};

use crate::{ClientMessage, RelayChannel, RelayConnector, RelayError, RelayMessage};

/// How a relay ends its stored events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Sends end-of-stored-events
    Eose,
    /// Never signals end of stored events
    Hang,
    /// Drops the connection after the stored events
    Disconnect,
    /// Refuses the subscription
    Closed,
}

/// A relay holding a fixed set of events
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    pub events: Vec<Event>,
    pub ending: Ending,
    /// Raw frames sent before the stored events
    pub preamble: Vec<String>,
}

impl MemoryRelay {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            ending: Ending::Eose,
            preamble: Vec::new(),
        }
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    pub fn raw_frame(mut self, frame: &str) -> Self {
        self.preamble.push(frame.to_string());
        self
    }

    fn respond(&self, sub_id: &str, filter: &Filter) -> Vec<Result<RelayMessage, RelayError>> {
        let mut matching: Vec<Event> = self
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }

        if self.ending == Ending::Closed {
            return vec![Ok(RelayMessage::Closed {
                sub_id: sub_id.to_string(),
                reason: "blocked: not accepting subscriptions".to_string(),
            })];
        }

        let mut frames: Vec<Result<RelayMessage, RelayError>> = self
            .preamble
            .iter()
            .map(|frame| RelayMessage::from_json(frame))
            .collect();
        frames.extend(matching.into_iter().map(|event| {
            Ok(RelayMessage::Event {
                sub_id: sub_id.to_string(),
                event,
            })
        }));
        if self.ending == Ending::Eose {
            frames.push(Ok(RelayMessage::Eose {
                sub_id: sub_id.to_string(),
            }));
        }
        frames
    }
}

/// Connection lifecycle counters
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    released: AtomicUsize,
}

impl ConnectionCounters {
    /// Connections opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections closed explicitly
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections whose resources were released (closed or abandoned)
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Connector over a set of in-memory relays keyed by URL
#[derive(Debug, Default)]
pub struct MemoryConnector {
    relays: HashMap<String, MemoryRelay>,
    counters: Arc<ConnectionCounters>,
    subscriptions: Arc<Mutex<Vec<Filter>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relay(mut self, url: &str, relay: MemoryRelay) -> Self {
        self.relays.insert(url.to_string(), relay);
        self
    }

    pub fn counters(&self) -> &ConnectionCounters {
        &self.counters
    }

    /// Filters received so far, in arrival order
    pub fn subscriptions(&self) -> Vec<Filter> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl RelayConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayChannel>, RelayError> {
        let relay = self
            .relays
            .get(url)
            .cloned()
            .ok_or_else(|| RelayError::Connect {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            })?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryChannel {
            relay,
            pending: Vec::new(),
            counters: self.counters.clone(),
            subscriptions: self.subscriptions.clone(),
        }))
    }
}

struct MemoryChannel {
    relay: MemoryRelay,
    /// Frames still to deliver, in reverse order
    pending: Vec<Result<RelayMessage, RelayError>>,
    counters: Arc<ConnectionCounters>,
    subscriptions: Arc<Mutex<Vec<Filter>>>,
}

#[async_trait]
impl RelayChannel for MemoryChannel {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError> {
        if let ClientMessage::Req { sub_id, filter } = message {
            self.subscriptions.lock().push(filter.clone());
            let mut frames = self.relay.respond(sub_id, filter);
            frames.reverse();
            self.pending = frames;
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<RelayMessage, RelayError>> {
        if let Some(next) = self.pending.pop() {
            tokio::task::yield_now().await;
            return Some(next);
        }
        match self.relay.ending {
            Ending::Hang => std::future::pending().await,
            _ => None,
        }
    }

    async fn close(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}
