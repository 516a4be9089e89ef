//! Feature map
//!
//! Every UI feature of the target application is tracked with a confidence
//! score in [0, 1], usage counters and rolling cost/time history. Only the
//! session controllers mutate features, and only after an attempt.
//!
//! Confidence never goes down during normal operation: negative deltas are
//! ignored and the result is clamped to 1.0. The explicit
//! [`Feature::reset_confidence`] is the only way back to zero.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub mod curriculum;
pub mod selector;

pub use curriculum::Curriculum;
pub use selector::{FeatureSelector, SelectionMode};

/// Samples kept per history ring buffer
pub const HISTORY_CAPACITY: usize = 20;

/// Confidence at which a feature counts as proficient
pub const PROFICIENT_CONFIDENCE: f64 = 0.7;

/// Confidence at which a feature counts as mastered
pub const MASTERED_CONFIDENCE: f64 = 0.9;

/// Category and name; a feature name is only unique within its category
pub type FeatureKey = (String, String);

/// A single feature of the target application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub category: String,
    pub description: String,
    pub confidence: f64,

    /// Lower is more urgent
    pub priority: i64,

    /// Whether using the feature spends credits
    pub generative: bool,

    pub explored_count: u32,
    pub last_explored: Option<DateTime<Utc>>,
    pub cost_history: VecDeque<i64>,
    pub time_history: VecDeque<f64>,
    pub avg_credit_cost: f64,
    pub avg_generation_time: f64,
    pub notes: String,
}

impl Feature {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        priority: i64,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            description: description.into(),
            confidence: 0.0,
            priority,
            generative: false,
            explored_count: 0,
            last_explored: None,
            cost_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            time_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            avg_credit_cost: 0.0,
            avg_generation_time: 0.0,
            notes: String::new(),
        }
    }

    pub fn key(&self) -> FeatureKey {
        (self.category.clone(), self.name.clone())
    }

    pub fn generative(mut self, generative: bool) -> Self {
        self.generative = generative;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// Raise confidence by `delta`; negative or non-finite deltas are ignored
    pub fn raise_confidence(&mut self, delta: f64) -> f64 {
        if delta.is_finite() && delta > 0.0 {
            self.confidence = clamp_unit(self.confidence + delta);
        }
        self.confidence
    }

    /// Put the feature back to unexplored
    pub fn reset_confidence(&mut self) {
        self.confidence = 0.0;
    }

    /// Record one attempt against this feature
    ///
    /// `credits` and `seconds` are appended to the history only when they
    /// were actually measured.
    pub fn record_attempt(
        &mut self,
        delta: f64,
        credits: Option<i64>,
        seconds: Option<f64>,
        at: DateTime<Utc>,
    ) {
        self.raise_confidence(delta);
        self.explored_count = self.explored_count.saturating_add(1);
        self.last_explored = Some(at);

        if let Some(credits) = credits {
            push_capped(&mut self.cost_history, credits.max(0));
        }
        if let Some(seconds) = seconds.filter(|s| s.is_finite() && *s >= 0.0) {
            push_capped(&mut self.time_history, seconds);
        }
        self.recompute_averages();
    }

    /// Average credits per use, once at least one use was measured
    pub fn known_cost(&self) -> Option<f64> {
        (!self.cost_history.is_empty()).then_some(self.avg_credit_cost)
    }

    /// Recompute rolling averages from the ring buffers
    pub fn recompute_averages(&mut self) {
        self.avg_credit_cost = if self.cost_history.is_empty() {
            0.0
        } else {
            self.cost_history.iter().sum::<i64>() as f64 / self.cost_history.len() as f64
        };
        self.avg_generation_time = if self.time_history.is_empty() {
            0.0
        } else {
            self.time_history.iter().sum::<f64>() / self.time_history.len() as f64
        };
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, value: T) {
    if buffer.len() == HISTORY_CAPACITY {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

/// All features, grouped by category
///
/// Iteration order is category name, then curriculum order within the
/// category. Selection ties fall back to this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
    categories: BTreeMap<String, Vec<Feature>>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature, replacing one with the same category and name
    pub fn insert(&mut self, feature: Feature) {
        let features = self.categories.entry(feature.category.clone()).or_default();
        match features.iter_mut().find(|f| f.name == feature.name) {
            Some(existing) => *existing = feature,
            None => features.push(feature),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.categories.values().flatten()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&String, &Vec<Feature>)> {
        self.categories.iter()
    }

    pub fn get(&self, category: &str, name: &str) -> Option<&Feature> {
        self.categories
            .get(category)
            .and_then(|features| features.iter().find(|f| f.name == name))
    }

    pub fn get_mut(&mut self, category: &str, name: &str) -> Option<&mut Feature> {
        self.categories
            .get_mut(category)
            .and_then(|features| features.iter_mut().find(|f| f.name == name))
    }

    /// Find a feature by name in any category
    pub fn find(&self, name: &str) -> Option<&Feature> {
        self.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exploration progress across the whole map
    pub fn progress(&self) -> LearningProgress {
        let mut progress = LearningProgress::default();
        for (category, features) in &self.categories {
            let mut stats = CategoryProgress::default();
            for feature in features {
                stats.add(feature.confidence);
            }
            progress.total.merge(&stats);
            progress.categories.insert(category.clone(), stats);
        }
        progress
    }

    /// Per-feature cost and generation time learned from real usage
    pub fn cost_sheet(&self) -> Vec<CostEntry> {
        self.iter()
            .filter(|f| !f.cost_history.is_empty() || !f.time_history.is_empty())
            .map(|f| CostEntry {
                category: f.category.clone(),
                feature: f.name.clone(),
                avg_credit_cost: f.avg_credit_cost,
                avg_generation_time: f.avg_generation_time,
                samples: f.cost_history.len().max(f.time_history.len()),
            })
            .collect()
    }
}

/// Progress counters for a set of features
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    pub total: usize,
    pub explored: usize,
    pub proficient: usize,
    pub mastered: usize,
}

impl CategoryProgress {
    fn add(&mut self, confidence: f64) {
        self.total += 1;
        if confidence > 0.0 {
            self.explored += 1;
        }
        if confidence >= PROFICIENT_CONFIDENCE {
            self.proficient += 1;
        }
        if confidence >= MASTERED_CONFIDENCE {
            self.mastered += 1;
        }
    }

    fn merge(&mut self, other: &CategoryProgress) {
        self.total += other.total;
        self.explored += other.explored;
        self.proficient += other.proficient;
        self.mastered += other.mastered;
    }

    /// Share of explored features, 0-100
    pub fn percent_explored(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.explored as f64 * 100.0 / self.total as f64
        }
    }
}

/// Exploration progress summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningProgress {
    pub total: CategoryProgress,
    pub categories: BTreeMap<String, CategoryProgress>,
}

/// One row of the cost sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub category: String,
    pub feature: String,
    pub avg_credit_cost: f64,
    pub avg_generation_time: f64,
    pub samples: usize,
}

/// Storage for the feature map
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Load every known feature
    async fn load(&self) -> Result<FeatureMap>;

    /// Persist one feature in a single write
    async fn save_feature(&self, feature: &Feature) -> Result<()>;

    /// Add features not yet known; existing features keep their progress.
    /// Returns how many were added.
    async fn seed(&self, map: &FeatureMap) -> Result<usize>;
}
