//! Quality scoring
//!
//! Turns a raw judge verdict into a [`QualityScore`]. The weighting, the
//! delivery threshold and the critical-category rule live here so that no
//! judge can approve an artifact the engine would not deliver.

use sdk::errors::EngineError;
use sdk::judge::{ChecklistItem, ChecklistStatus, JudgeVerdict, Recommendation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum overall score for delivery
pub const DELIVERY_THRESHOLD: f64 = 7.0;

/// Minimum overall score for the portfolio
pub const PORTFOLIO_THRESHOLD: f64 = 8.0;

/// Highest score any dimension keeps when a critical item is missing
pub const CRITICAL_CAP: f64 = 5.0;

const NEUTRAL: f64 = 5.0;

pub const WEIGHT_VISUAL_QUALITY: f64 = 0.20;
pub const WEIGHT_MOTION: f64 = 0.25;
pub const WEIGHT_CONSISTENCY: f64 = 0.20;
pub const WEIGHT_AUDIO_SYNC: f64 = 0.15;
pub const WEIGHT_SCRIPT_ADHERENCE: f64 = 0.20;

/// Engine-side rules applied to every verdict
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    pub enforce_critical_categories: bool,
    pub critical_categories: Vec<String>,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            enforce_critical_categories: true,
            critical_categories: vec![
                "characters".to_string(),
                "action".to_string(),
                "objects".to_string(),
            ],
        }
    }
}

impl QualityPolicy {
    fn is_critical(&self, item: &ChecklistItem) -> bool {
        self.critical_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&item.category))
    }
}

/// Weighted quality assessment of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub visual_quality: f64,
    pub motion: f64,
    pub consistency: f64,
    pub audio_sync: f64,
    pub script_adherence: f64,
    pub overall: f64,
    pub recommendation: Recommendation,
    pub issues: Vec<String>,
    pub regeneration_notes: String,

    /// A critical checklist item was missing or wrong
    #[serde(default)]
    pub critical_override: bool,
}

fn clamp_dimension(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(1.0, 10.0)
    } else {
        NEUTRAL
    }
}

impl QualityScore {
    /// Build from explicit dimensions, computing `overall` and applying the
    /// delivery threshold to the recommendation
    pub fn from_dimensions(
        dimensions: [f64; 5],
        recommendation: Recommendation,
        issues: Vec<String>,
        regeneration_notes: String,
    ) -> Self {
        let [visual_quality, motion, consistency, audio_sync, script_adherence] =
            dimensions.map(clamp_dimension);
        let mut score = Self {
            visual_quality,
            motion,
            consistency,
            audio_sync,
            script_adherence,
            overall: 0.0,
            recommendation,
            issues,
            regeneration_notes,
            critical_override: false,
        };
        score.finish();
        score
    }

    /// Apply engine rules to a judge verdict
    pub fn from_verdict(verdict: &JudgeVerdict, policy: &QualityPolicy) -> Self {
        let mut dimensions = [
            verdict.visual_quality,
            verdict.motion,
            verdict.consistency,
            verdict.audio_sync,
            verdict.script_adherence,
        ]
        .map(clamp_dimension);
        let mut issues = verdict.issues.clone();
        let mut notes = verdict.regeneration_notes.clone();
        let mut recommendation = verdict.recommendation;

        let critical_failures: Vec<String> = if policy.enforce_critical_categories {
            verdict
                .checklist
                .iter()
                .filter(|item| item.status != ChecklistStatus::Present && policy.is_critical(item))
                .map(describe_failure)
                .collect()
        } else {
            Vec::new()
        };

        let critical_override = !critical_failures.is_empty();
        if critical_override {
            for dimension in dimensions.iter_mut() {
                *dimension = dimension.min(CRITICAL_CAP);
            }
            for failure in &critical_failures {
                if !issues.contains(failure) {
                    issues.push(failure.clone());
                }
            }
            if notes.trim().is_empty() {
                notes = format!("Fix: {}", critical_failures.join("; "));
            }
            recommendation = Recommendation::Regenerate;
        }

        let mut score = Self::from_dimensions(dimensions, recommendation, issues, notes);
        score.critical_override = critical_override;
        score
    }

    /// Score used when the judge could not deliver a verdict
    pub fn neutral(reason: &str) -> Self {
        Self::from_dimensions(
            [NEUTRAL; 5],
            Recommendation::Adjust,
            vec![format!("Quality review unavailable: {}", reason)],
            String::new(),
        )
    }

    fn finish(&mut self) {
        self.overall = self.visual_quality * WEIGHT_VISUAL_QUALITY
            + self.motion * WEIGHT_MOTION
            + self.consistency * WEIGHT_CONSISTENCY
            + self.audio_sync * WEIGHT_AUDIO_SYNC
            + self.script_adherence * WEIGHT_SCRIPT_ADHERENCE;

        if self.overall < DELIVERY_THRESHOLD && self.recommendation == Recommendation::Approve {
            self.recommendation = Recommendation::Regenerate;
            self.regeneration_notes = format!(
                "Overall score {:.1} below delivery threshold {:.1}. {}",
                self.overall, DELIVERY_THRESHOLD, self.regeneration_notes
            )
            .trim_end()
            .to_string();
        }
    }

    pub fn deliverable(&self) -> bool {
        self.overall >= DELIVERY_THRESHOLD
    }

    pub fn portfolio_worthy(&self) -> bool {
        self.overall >= PORTFOLIO_THRESHOLD
    }

    /// What the next attempt should change: the judge's notes, or its
    /// issue list when it left no notes
    pub fn feedback(&self) -> String {
        if !self.regeneration_notes.trim().is_empty() {
            self.regeneration_notes.clone()
        } else if !self.issues.is_empty() {
            self.issues.join("; ")
        } else {
            "Improve overall quality and follow the script more closely".to_string()
        }
    }
}

fn describe_failure(item: &ChecklistItem) -> String {
    let status = match item.status {
        ChecklistStatus::Missing => "MISSING",
        ChecklistStatus::Wrong => "WRONG",
        ChecklistStatus::Present => "PRESENT",
    };
    if item.note.is_empty() {
        format!("[{}] {}: {}", item.category, item.item, status)
    } else {
        format!("[{}] {}: {} ({})", item.category, item.item, status, item.note)
    }
}

/// Parse free-form judge output into a verdict
///
/// Accepts bare JSON, JSON wrapped in a markdown fence, or JSON embedded in
/// prose. Missing dimensions default to 5 and an unknown recommendation
/// becomes `adjust`. The checklist may be a list of items or a map from
/// category to items.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, EngineError> {
    let value = extract_json(text).ok_or_else(|| {
        EngineError::JudgeUnparseable(text.chars().take(200).collect::<String>())
    })?;
    verdict_from_value(&value)
}

/// Build a verdict from a JSON value with the lenient defaults of
/// [`parse_verdict`]
pub fn verdict_from_value(value: &Value) -> Result<JudgeVerdict, EngineError> {
    let object = value
        .as_object()
        .ok_or_else(|| EngineError::JudgeUnparseable("verdict is not an object".to_string()))?;

    let dimension = |key: &str| -> f64 {
        match object.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(NEUTRAL),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(NEUTRAL),
            _ => NEUTRAL,
        }
    };

    let issues = object
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let recommendation = object
        .get("recommendation")
        .and_then(Value::as_str)
        .and_then(|r| r.parse().ok())
        .unwrap_or(Recommendation::Adjust);

    let regeneration_notes = object
        .get("regeneration_notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(JudgeVerdict {
        visual_quality: dimension("visual_quality"),
        motion: dimension("motion"),
        consistency: dimension("consistency"),
        audio_sync: dimension("audio_sync"),
        script_adherence: dimension("script_adherence"),
        issues,
        recommendation,
        regeneration_notes,
        checklist: object.get("checklist").map(parse_checklist).unwrap_or_default(),
    })
}

fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn parse_checklist(value: &Value) -> Vec<ChecklistItem> {
    let parse_item = |category: Option<&str>, raw: &Value| -> Option<ChecklistItem> {
        let object = raw.as_object()?;
        let category = category
            .map(str::to_string)
            .or_else(|| object.get("category")?.as_str().map(str::to_string))?;
        let status = match object.get("status")?.as_str()?.trim().to_uppercase().as_str() {
            "PRESENT" => ChecklistStatus::Present,
            "MISSING" => ChecklistStatus::Missing,
            "WRONG" => ChecklistStatus::Wrong,
            _ => return None,
        };
        Some(ChecklistItem {
            category,
            item: object
                .get("item")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            status,
            note: object
                .get("note")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    };

    match value {
        Value::Array(items) => items.iter().filter_map(|i| parse_item(None, i)).collect(),
        Value::Object(groups) => groups
            .iter()
            .flat_map(|(category, items)| {
                items
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(move |i| parse_item(Some(category.as_str()), i))
            })
            .collect(),
        _ => Vec::new(),
    }
}
