//! Feature selection
//!
//! Picks the next feature to work on. Selection is a pure function of the
//! feature map, the set of features already attempted this session and the
//! mode; it never touches the actuator or the repository.
//!
//! Explore mode walks four tiers in order and returns the best feature of
//! the first non-empty tier:
//!
//! 1. unexplored (`c == 0`)
//! 2. partially explored (`c < 0.5`)
//! 3. relevant to upcoming jobs (`c < 0.7`)
//! 4. deep dive (`0.5 <= c < 0.9`)
//!
//! Within a tier features are ordered by priority, then by how often they
//! were explored. Hands-on mode only ever returns generative features.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::{Feature, FeatureKey, FeatureMap, MASTERED_CONFIDENCE, PROFICIENT_CONFIDENCE};

/// Lower bound of the hands-on candidate band
pub const HANDS_ON_MIN_CONFIDENCE: f64 = 0.3;

const PARTIAL_CONFIDENCE: f64 = 0.5;

/// Session mode the selection is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Explore,
    HandsOn,
}

/// Mode-aware feature prioritisation
#[derive(Debug, Clone, Default)]
pub struct FeatureSelector {
    job_relevant: HashSet<String>,
    generative_categories: HashSet<String>,
}

impl FeatureSelector {
    pub fn new<J, G>(job_relevant: J, generative_categories: G) -> Self
    where
        J: IntoIterator<Item = String>,
        G: IntoIterator<Item = String>,
    {
        Self {
            job_relevant: job_relevant.into_iter().collect(),
            generative_categories: generative_categories.into_iter().collect(),
        }
    }

    /// Whether using the feature spends credits
    pub fn is_generative(&self, feature: &Feature) -> bool {
        feature.generative || self.generative_categories.contains(&feature.category)
    }

    /// Select the next feature, skipping the keys in `excluded`
    pub fn select<'a>(
        &self,
        map: &'a FeatureMap,
        excluded: &HashSet<FeatureKey>,
        mode: SelectionMode,
    ) -> Option<&'a Feature> {
        let candidates = map.iter().filter(|f| !excluded.contains(&f.key()));
        match mode {
            SelectionMode::Explore => self.select_explore(candidates),
            SelectionMode::HandsOn => self.select_hands_on(candidates),
        }
    }

    fn select_explore<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Feature>,
    ) -> Option<&'a Feature> {
        let candidates: Vec<&Feature> = candidates.collect();
        let tiers: [&dyn Fn(&Feature) -> bool; 4] = [
            &|f: &Feature| f.confidence == 0.0,
            &|f: &Feature| f.confidence < PARTIAL_CONFIDENCE,
            &|f: &Feature| {
                self.job_relevant.contains(&f.name) && f.confidence < PROFICIENT_CONFIDENCE
            },
            &|f: &Feature| (PARTIAL_CONFIDENCE..MASTERED_CONFIDENCE).contains(&f.confidence),
        ];

        tiers.iter().find_map(|in_tier| {
            // min_by_key keeps the first of equal elements, preserving map order
            candidates
                .iter()
                .copied()
                .filter(|f| in_tier(f))
                .min_by_key(|f| (f.priority, f.explored_count))
        })
    }

    fn select_hands_on<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Feature>,
    ) -> Option<&'a Feature> {
        let generative: Vec<&Feature> = candidates
            .filter(|f| self.is_generative(f) && f.confidence < PROFICIENT_CONFIDENCE)
            .collect();

        let in_band = generative
            .iter()
            .copied()
            .filter(|f| f.confidence >= HANDS_ON_MIN_CONFIDENCE)
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| cmp_f64(a.confidence, b.confidence))
            });

        in_band.or_else(|| {
            generative.iter().copied().min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| cmp_f64(b.confidence, a.confidence))
            })
        })
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
