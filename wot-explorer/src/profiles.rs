//! Profile loader
//!
//! Cache first, then one kind-0 fan-out for the misses within the profile
//! budget. The newest parseable metadata event per author wins, so a
//! malformed event never hides an older valid one. Whatever arrives is
//! cached; identities with no reachable profile simply stay unlabeled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use wot_core::{Filter, Profile, KIND_METADATA};
use wot_relay::MultiRelayFetcher;

use crate::Cache;

pub struct ProfileLoader {
    fetcher: Option<MultiRelayFetcher>,
    cache: Arc<Cache>,
    budget: Duration,
}

impl ProfileLoader {
    pub fn new(fetcher: Option<MultiRelayFetcher>, cache: Arc<Cache>, budget: Duration) -> Self {
        Self {
            fetcher,
            cache,
            budget,
        }
    }

    /// Profiles for `ids`, from the cache or the relays
    pub async fn load(&self, ids: &[String]) -> HashMap<String, Profile> {
        let mut profiles = self.cache.get_profiles(ids);
        let missing = self.cache.missing_profiles(ids);
        if missing.is_empty() {
            return profiles;
        }
        let Some(fetcher) = &self.fetcher else {
            return profiles;
        };

        let filter = Filter::new()
            .kind(KIND_METADATA)
            .authors(missing.iter().cloned())
            .limit(missing.len());
        let outcome = fetcher.fetch(&filter, self.budget).await;

        let mut newest: HashMap<String, Profile> = HashMap::new();
        for profile in outcome.events.values().filter_map(Profile::from_event) {
            let newer = newest
                .get(&profile.pubkey)
                .map_or(true, |p| profile.created_at > p.created_at);
            if newer {
                newest.insert(profile.pubkey.clone(), profile);
            }
        }
        let fetched: Vec<Profile> = newest.into_values().collect();

        debug!(
            "Loaded {} of {} missing profiles{}",
            fetched.len(),
            missing.len(),
            if outcome.timed_out { " before timeout" } else { "" }
        );

        for profile in &fetched {
            profiles.insert(profile.pubkey.clone(), profile.clone());
        }
        self.cache.put_profiles(fetched);
        profiles
    }
}
