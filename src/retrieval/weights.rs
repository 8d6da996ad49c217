//! Weight profiles for combining normalized BM25, vector and RRF scores

use crate::lexical::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BALANCED: &str = "balanced";
pub const KEYWORD: &str = "keyword";
pub const SEMANTIC: &str = "semantic";
pub const CONSENSUS: &str = "consensus";

/// Per-signal weights. Non-negative; they need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub bm25: f64,
    pub vector: f64,
    pub rrf: f64,
}

impl WeightProfile {
    pub const fn new(bm25: f64, vector: f64, rrf: f64) -> Self {
        Self { bm25, vector, rrf }
    }

    pub fn is_valid(&self) -> bool {
        [self.bm25, self.vector, self.rrf]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }

    pub fn combine(&self, bm25: f64, vector: f64, rrf: f64) -> f64 {
        bm25 * self.bm25 + vector * self.vector + rrf * self.rrf
    }
}

impl Default for WeightProfile {
    fn default() -> Self {
        Self::new(0.30, 0.50, 0.20)
    }
}

/// Named profiles shipped with the crate
pub fn builtin_profiles() -> BTreeMap<String, WeightProfile> {
    BTreeMap::from([
        (BALANCED.to_string(), WeightProfile::default()),
        (KEYWORD.to_string(), WeightProfile::new(0.60, 0.20, 0.20)),
        (SEMANTIC.to_string(), WeightProfile::new(0.15, 0.70, 0.15)),
        (CONSENSUS.to_string(), WeightProfile::new(0.25, 0.25, 0.50)),
    ])
}

/// Query-length thresholds for adaptive selection. A heuristic, not a
/// trained classifier; both bounds are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    /// At or below this many tokens the keyword profile is used
    pub keyword_max_tokens: usize,
    /// Above this many tokens the semantic profile is used
    pub semantic_min_tokens: usize,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            keyword_max_tokens: 2,
            semantic_min_tokens: 10,
        }
    }
}

/// How a query picks its weights
#[derive(Debug, Clone, PartialEq)]
pub enum WeightSelection {
    /// Use exactly these weights
    Fixed(WeightProfile),
    /// Use a profile by name
    Named(String),
    /// Pick keyword / balanced / semantic from the query length
    Adaptive,
}

impl Default for WeightSelection {
    fn default() -> Self {
        WeightSelection::Named(BALANCED.to_string())
    }
}

/// Profiles available to a searcher, built-ins overridable by name
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: BTreeMap<String, WeightProfile>,
    thresholds: AdaptiveThresholds,
}

impl ProfileSet {
    pub fn new(overrides: BTreeMap<String, WeightProfile>, thresholds: AdaptiveThresholds) -> Self {
        let mut profiles = builtin_profiles();
        profiles.extend(overrides);
        Self {
            profiles,
            thresholds,
        }
    }

    pub fn get(&self, name: &str) -> Option<WeightProfile> {
        self.profiles.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Profile name adaptive selection would choose for this query
    pub fn adaptive_name(&self, query: &str) -> &'static str {
        let tokens = tokenize(query).len();
        if tokens <= self.thresholds.keyword_max_tokens {
            KEYWORD
        } else if tokens > self.thresholds.semantic_min_tokens {
            SEMANTIC
        } else {
            BALANCED
        }
    }

    /// Resolve a selection to `(label, weights)`; `None` for an unknown name
    pub fn resolve(&self, selection: &WeightSelection, query: &str) -> Option<(String, WeightProfile)> {
        match selection {
            WeightSelection::Fixed(profile) => Some(("custom".to_string(), *profile)),
            WeightSelection::Named(name) => self.get(name).map(|p| (name.clone(), p)),
            WeightSelection::Adaptive => {
                let name = self.adaptive_name(query);
                self.get(name).map(|p| (name.to_string(), p))
            }
        }
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::new(BTreeMap::new(), AdaptiveThresholds::default())
    }
}
