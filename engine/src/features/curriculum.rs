//! Curriculum loading
//!
//! The curriculum lists what there is to learn: categories of features with
//! a description, priority and whether the feature spends credits. It seeds
//! the feature table; features already known keep their progress.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::{Feature, FeatureMap};

const BUILTIN_CURRICULUM: &str = include_str!("../../curriculum/default.toml");

/// Parsed curriculum file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curriculum {
    #[serde(default)]
    pub categories: BTreeMap<String, CurriculumCategory>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurriculumCategory {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub features: Vec<CurriculumFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumFeature {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_priority")]
    pub priority: i64,

    #[serde(default)]
    pub generative: bool,

    /// Starting confidence, for features already understood
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub notes: String,
}

fn default_priority() -> i64 {
    5
}

impl Curriculum {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse curriculum")
    }

    /// Load from `path`, or fall back to the built-in curriculum when the
    /// file does not exist
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading curriculum from {}", path.display());
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read curriculum {}", path.display()))?;
            Self::from_toml_str(&contents)
        } else {
            debug!("No curriculum at {}, using built-in", path.display());
            Self::builtin()
        }
    }

    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CURRICULUM)
    }

    /// Convert into a fresh feature map with tracking fields zeroed
    pub fn to_feature_map(&self) -> FeatureMap {
        let mut map = FeatureMap::new();
        for (category, data) in &self.categories {
            for entry in &data.features {
                let mut feature = Feature::new(
                    category.as_str(),
                    entry.name.as_str(),
                    entry.description.as_str(),
                    entry.priority,
                )
                .generative(entry.generative)
                .with_confidence(entry.confidence);
                feature.notes = entry.notes.clone();
                map.insert(feature);
            }
        }
        map
    }
}
