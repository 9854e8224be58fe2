//! Trust formula - maps (distance, path count) to a score in [0, 1]
//!
//! score(d, p) = clamp01(base(d) * (1 + bonus(d, p)))
//!
//! - `base` is a strictly decreasing step table by hop
//! - `bonus` adds a per-hop percentage for every corroborating path beyond
//!   the first, capped at `max_bonus`
//!
//! This is the only place a node's trust score is assigned.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::{MAX_TRUST, MIN_TRUST};

/// Errors from an invalid trust table
#[derive(Debug, Error, PartialEq)]
pub enum TrustConfigError {
    #[error("Base score table is empty")]
    EmptyBaseTable,

    #[error("Base score at hop {hop} must be in (0, 1], got {value}")]
    BaseOutOfRange { hop: usize, value: f64 },

    #[error("Base scores must be strictly decreasing (hop {hop})")]
    NotDecreasing { hop: usize },

    #[error("Saturated bonus at hop {hop} exceeds the base score of hop {prev}")]
    BonusOverlap { hop: usize, prev: usize },

    #[error("Path bonus must be non-negative, got {0}")]
    NegativeBonus(f64),
}

/// Trust formula configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Base score by hop, starting at hop 1; the last entry covers every further hop
    pub base_scores: Vec<f64>,
    /// Bonus per extra path by hop, starting at hop 1; the last entry covers every further hop
    pub bonus_per_path: Vec<f64>,
    /// Cap on the total path bonus
    pub max_bonus: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            base_scores: vec![1.0, 0.5, 0.25, 0.10],
            bonus_per_path: vec![0.15, 0.10, 0.05],
            max_bonus: 0.5,
        }
    }
}

impl TrustConfig {
    /// Check the table keeps scores monotonic in distance
    pub fn validate(&self) -> Result<(), TrustConfigError> {
        if self.base_scores.is_empty() {
            return Err(TrustConfigError::EmptyBaseTable);
        }

        for (i, &value) in self.base_scores.iter().enumerate() {
            if !(value > 0.0 && value <= MAX_TRUST) {
                return Err(TrustConfigError::BaseOutOfRange { hop: i + 1, value });
            }
        }

        for (i, pair) in self.base_scores.windows(2).enumerate() {
            if pair[1] >= pair[0] {
                return Err(TrustConfigError::NotDecreasing { hop: i + 2 });
            }
            if pair[1] * (1.0 + self.max_bonus) > pair[0] {
                return Err(TrustConfigError::BonusOverlap {
                    hop: i + 2,
                    prev: i + 1,
                });
            }
        }

        if self.max_bonus < 0.0 {
            return Err(TrustConfigError::NegativeBonus(self.max_bonus));
        }
        if let Some(&neg) = self.bonus_per_path.iter().find(|b| **b < 0.0) {
            return Err(TrustConfigError::NegativeBonus(neg));
        }

        Ok(())
    }

    /// Base score for a hop count. The root (hop 0) is fully trusted.
    pub fn base_score(&self, distance: u32) -> f64 {
        if distance == 0 {
            return MAX_TRUST;
        }
        step(&self.base_scores, distance).unwrap_or(MIN_TRUST)
    }

    /// Additive bonus for corroborating paths beyond the first
    pub fn path_bonus(&self, distance: u32, path_count: u32) -> f64 {
        let extra = path_count.saturating_sub(1) as f64;
        let per_path = step(&self.bonus_per_path, distance.max(1)).unwrap_or(0.0);
        (extra * per_path).min(self.max_bonus)
    }

    /// Trust score for a node
    pub fn score(&self, distance: u32, path_count: u32) -> f64 {
        let raw = self.base_score(distance) * (1.0 + self.path_bonus(distance, path_count));
        raw.clamp(MIN_TRUST, MAX_TRUST)
    }
}

/// Look up a hop-indexed table whose last entry extends to infinity
fn step(table: &[f64], distance: u32) -> Option<f64> {
    let idx = (distance.max(1) - 1) as usize;
    table.get(idx).or_else(|| table.last()).copied()
}

/// Trust score with the default table
pub fn trust_score(distance: u32, path_count: u32) -> f64 {
    static DEFAULT: OnceLock<TrustConfig> = OnceLock::new();
    DEFAULT.get_or_init(TrustConfig::default).score(distance, path_count)
}

/// A resolved trust fact for one identity, as reported by the trust provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustFact {
    /// Hops from the provider's local identity
    pub distance: u32,
    /// Number of paths, `None` while unresolved
    pub paths: Option<u32>,
    /// Derived score; recomputed on load, never read back from storage
    #[serde(skip)]
    pub score: f64,
}

impl TrustFact {
    pub fn new(distance: u32, paths: Option<u32>, config: &TrustConfig) -> Self {
        let mut fact = Self {
            distance,
            paths,
            score: 0.0,
        };
        fact.rescore(config);
        fact
    }

    /// Recompute the derived score
    pub fn rescore(&mut self, config: &TrustConfig) {
        self.score = config.score(self.distance, self.paths.unwrap_or(1).max(1));
    }

    /// Whether the path count is still unknown
    pub fn is_unresolved(&self) -> bool {
        self.paths.is_none()
    }
}
