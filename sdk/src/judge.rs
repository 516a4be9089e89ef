//! Judge trait and raw verdict types
//!
//! The judge watches a produced artifact and returns a raw, per-dimension
//! verdict. The engine owns the weighting and threshold rules; a judge only
//! reports what it saw.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::EngineError;

/// What the judge suggests doing with the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Regenerate,
    Adjust,
}

impl Recommendation {
    pub fn as_str(&self) -> &str {
        match self {
            Recommendation::Approve => "approve",
            Recommendation::Regenerate => "regenerate",
            Recommendation::Adjust => "adjust",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(Recommendation::Approve),
            "regenerate" => Ok(Recommendation::Regenerate),
            "adjust" => Ok(Recommendation::Adjust),
            other => Err(EngineError::JudgeUnparseable(format!(
                "unknown recommendation '{}'",
                other
            ))),
        }
    }
}

/// Status of one checklist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecklistStatus {
    Present,
    Missing,
    Wrong,
}

/// One expected element of the artifact, checked by the judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Checklist category (characters, action, objects, setting, ...)
    pub category: String,
    pub item: String,
    pub status: ChecklistStatus,
    #[serde(default)]
    pub note: String,
}

/// Raw verdict as returned by a judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub visual_quality: f64,
    pub motion: f64,
    pub consistency: f64,
    pub audio_sync: f64,
    pub script_adherence: f64,

    #[serde(default)]
    pub issues: Vec<String>,

    pub recommendation: Recommendation,

    #[serde(default)]
    pub regeneration_notes: String,

    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

/// Context passed to the judge alongside the artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeContext {
    pub model: String,
    pub duration_seconds: u32,
    pub attempt: u32,
}

/// External quality assessment
#[async_trait]
pub trait Judge: Send + Sync {
    /// Score an artifact against the script it was produced from
    async fn score(
        &self,
        artifact: &Path,
        reference_script: &str,
        context: &JudgeContext,
    ) -> Result<JudgeVerdict, EngineError>;
}
