//! Production planning
//!
//! A plan is derived deterministically from the job parameters, the
//! configured credit rates and whatever the knowledge store knows about the
//! chosen model.

use sdk::knowledge::KnowledgeEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ProductionConfig;

use super::ProductionJob;

const SNIPPET_CHARS: usize = 200;

/// A knowledge hit carried into the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub topic: String,
    pub content: String,
}

/// How a job will be produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub model: String,
    pub duration_seconds: u32,
    pub estimated_credits: i64,
    pub steps: Vec<String>,
    pub knowledge_context: Vec<KnowledgeSnippet>,
}

/// Builds plans from job parameters
#[derive(Debug, Clone)]
pub struct Planner {
    default_model: String,
    credit_rates: BTreeMap<String, i64>,
    fallback_rate: i64,
}

impl Planner {
    pub fn new(
        default_model: impl Into<String>,
        credit_rates: BTreeMap<String, i64>,
        fallback_rate: i64,
    ) -> Self {
        Self {
            default_model: default_model.into(),
            credit_rates,
            fallback_rate,
        }
    }

    pub fn from_config(config: &ProductionConfig) -> Self {
        Self::new(
            config.default_model.clone(),
            config.credit_rates.clone(),
            config.fallback_rate,
        )
    }

    /// `auto` (or nothing) resolves to the configured default model
    pub fn resolve_model(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() || requested.eq_ignore_ascii_case("auto") {
            self.default_model.clone()
        } else {
            requested.to_lowercase()
        }
    }

    /// Credits expected for `duration_seconds` of output on `model`
    pub fn estimate(&self, model: &str, duration_seconds: u32) -> i64 {
        let rate = self
            .credit_rates
            .get(&model.to_lowercase())
            .copied()
            .unwrap_or(self.fallback_rate);
        rate * i64::from(duration_seconds)
    }

    /// Query used to pull model knowledge for a job
    pub fn knowledge_query(&self, job: &ProductionJob) -> String {
        format!("{} model", self.resolve_model(&job.model))
    }

    pub fn plan(&self, job: &ProductionJob, knowledge: &[KnowledgeEntry]) -> ProductionPlan {
        let model = self.resolve_model(&job.model);
        let script_step = if job.script.trim().is_empty() {
            "Enter prompt from description".to_string()
        } else {
            format!("Enter script ({} chars)", job.script.chars().count())
        };

        ProductionPlan {
            estimated_credits: self.estimate(&model, job.duration_seconds),
            duration_seconds: job.duration_seconds,
            steps: vec![
                "Create new project".to_string(),
                script_step,
                format!("Select video model: {}", model),
                "Start render".to_string(),
                "Wait for completion, answering on-screen questions".to_string(),
                "Export video".to_string(),
                "Quality review".to_string(),
            ],
            knowledge_context: knowledge
                .iter()
                .map(|entry| KnowledgeSnippet {
                    topic: entry.topic.clone(),
                    content: entry.content.chars().take(SNIPPET_CHARS).collect(),
                })
                .collect(),
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::production::JobStatus;

    fn job(model: &str, duration: u32) -> ProductionJob {
        ProductionJob {
            id: 1,
            title: "Park walk".to_string(),
            description: "A walk in the park".to_string(),
            script: String::new(),
            model: model.to_string(),
            duration_seconds: duration,
            status: JobStatus::Received,
            render_attempts: 0,
            best_score: None,
            best_attempt: None,
            credits_used: 0,
            cost_estimate: 0,
            video_path: None,
            approval_id: None,
            plan: None,
            attempts: Vec::new(),
            failure_reason: None,
            submitted_by: "cli".to_string(),
            created_at: 0,
            updated_at: 0,
            delivered_at: None,
        }
    }

    fn planner() -> Planner {
        Planner::from_config(&Config::default_config().production)
    }

    #[test]
    fn test_auto_resolves_to_default_model() {
        let plan = planner().plan(&job("auto", 10), &[]);
        assert_eq!(plan.model, "seedance");
        assert_eq!(plan.estimated_credits, 40);
        assert!(plan.steps[1].contains("description"));
    }

    #[test]
    fn test_estimate_uses_model_rate() {
        let p = planner();
        assert_eq!(p.estimate("veo", 30), 150);
        assert_eq!(p.estimate("unknown", 30), 120);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let p = planner();
        let entry = KnowledgeEntry {
            id: 1,
            category: "technical".to_string(),
            topic: "Kling model".to_string(),
            content: "x".repeat(500),
            source: "exploration".to_string(),
            confidence: 0.8,
            tags: Vec::new(),
            created_at: 0,
        };
        let a = p.plan(&job("Kling", 20), std::slice::from_ref(&entry));
        let b = p.plan(&job("Kling", 20), std::slice::from_ref(&entry));
        assert_eq!(a, b);
        assert_eq!(a.model, "kling");
        assert_eq!(a.knowledge_context[0].content.len(), 200);
    }
}
