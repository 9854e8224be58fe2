//! Relay event model
//!
//! Events are the unit of data served by realtime relays. An event whose id
//! does not match its content hash is treated as malformed and dropped.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::is_identity_key;

/// Profile metadata
pub const KIND_METADATA: u32 = 0;
/// Short text note
pub const KIND_TEXT_NOTE: u32 = 1;
/// Follow list
pub const KIND_CONTACTS: u32 = 3;
/// Mute list
pub const KIND_MUTE_LIST: u32 = 10000;

/// A signed relay event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Hash of the canonical serialization `[0, pubkey, created_at, kind, tags, content]`
    pub fn compute_id(
        pubkey: &str,
        created_at: u64,
        kind: u32,
        tags: &[Vec<String>],
        content: &str,
    ) -> String {
        let canonical = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Build an event with a correct id (unsigned)
    pub fn new(pubkey: &str, created_at: u64, kind: u32, tags: Vec<Vec<String>>, content: &str) -> Self {
        Self {
            id: Self::compute_id(pubkey, created_at, kind, &tags, content),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: content.to_string(),
            sig: String::new(),
        }
    }

    /// Whether the id and pubkey are well-formed and the id matches the content
    pub fn is_well_formed(&self) -> bool {
        is_identity_key(&self.id)
            && is_identity_key(&self.pubkey)
            && self.id == Self::compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Identity keys referenced by `p` tags, in tag order, without duplicates
    pub fn tagged_pubkeys(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.tags
            .iter()
            .filter(|t| t.len() >= 2 && t[0] == "p" && is_identity_key(&t[1]))
            .filter_map(|t| seen.insert(t[1].clone()).then(|| t[1].clone()))
            .collect()
    }
}

/// Subscription filter sent to relays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u32) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors.extend(authors.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether an event satisfies this filter
    pub fn matches(&self, event: &Event) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.authors.is_empty() || self.authors.contains(&event.pubkey))
            && self.until.map_or(true, |u| event.created_at <= u)
    }
}

/// Profile metadata parsed from a kind-0 event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub pubkey: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub nip05: Option<String>,
    #[serde(default)]
    pub created_at: u64,
}

#[derive(Deserialize)]
struct MetadataContent {
    name: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name_camel: Option<String>,
    picture: Option<String>,
    about: Option<String>,
    nip05: Option<String>,
}

impl Profile {
    /// Parse profile metadata; `None` if the event is not kind 0 or its content is not JSON
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != KIND_METADATA {
            return None;
        }
        let content: MetadataContent = serde_json::from_str(&event.content).ok()?;

        Some(Self {
            pubkey: event.pubkey.clone(),
            name: non_empty(content.name),
            display_name: non_empty(content.display_name.or(content.display_name_camel)),
            picture: non_empty(content.picture),
            about: non_empty(content.about),
            nip05: non_empty(content.nip05),
            created_at: event.created_at,
        })
    }

    /// Best human-readable label, if any
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.name.as_deref())
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
