//! Production jobs
//!
//! A job moves through a forward-only state machine:
//!
//! ```text
//! received -> planned -> approved -> producing <-> reviewing -> delivered
//!                \                        \             \
//!                 `-> failed (rejected)    `-> failed    `-> failed
//! ```
//!
//! `delivered` and `failed` are terminal. Jobs are never deleted.

use anyhow::Result;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod controller;
pub mod planner;
pub mod portfolio;
pub mod quality;
pub mod render;

pub use controller::{ProductionController, ProductionDeps, ProductionOutcome};
pub use planner::{Planner, ProductionPlan};
pub use quality::{QualityPolicy, QualityScore};
pub use render::{RenderFailure, RenderRequest, Renderer};

/// Render attempts allowed per job
pub const MAX_RENDER_ATTEMPTS: u32 = 3;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Received,
    Planned,
    Approved,
    Producing,
    Reviewing,
    Delivered,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Received,
        JobStatus::Planned,
        JobStatus::Approved,
        JobStatus::Producing,
        JobStatus::Reviewing,
        JobStatus::Delivered,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Planned => "planned",
            JobStatus::Approved => "approved",
            JobStatus::Producing => "producing",
            JobStatus::Reviewing => "reviewing",
            JobStatus::Delivered => "delivered",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Delivered | JobStatus::Failed)
    }

    /// Whether the state machine has an edge from `self` to `to`
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Received, Planned)
                | (Planned, Approved)
                | (Planned, Failed)
                | (Approved, Producing)
                | (Producing, Reviewing)
                | (Reviewing, Producing)
                | (Producing, Delivered)
                | (Producing, Failed)
                | (Reviewing, Delivered)
                | (Reviewing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Database(format!("Unknown job status '{}'", s)))
    }
}

/// Audit record of a single render attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,

    /// Credits measured for this attempt
    pub credits: i64,

    /// Balance reading looked like a misread; `credits` is 0
    #[serde(default)]
    pub suspect_reading: bool,

    pub score: Option<QualityScore>,
    pub artifact: Option<PathBuf>,
    pub error: Option<String>,

    /// Extra instructions given to this attempt
    #[serde(default)]
    pub adjustments: Option<String>,
}

/// Fields supplied when a job is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub script: String,
    pub model: String,
    pub duration_seconds: u32,
    pub submitted_by: String,
}

impl NewJob {
    pub fn new(title: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            script: script.into(),
            model: "auto".to_string(),
            duration_seconds: 30,
            submitted_by: "cli".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A video production job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionJob {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub script: String,
    pub model: String,
    pub duration_seconds: u32,
    pub status: JobStatus,
    pub render_attempts: u32,
    pub best_score: Option<QualityScore>,
    pub best_attempt: Option<u32>,
    pub credits_used: i64,
    pub cost_estimate: i64,

    /// Best artifact so far; the delivered video once delivered
    pub video_path: Option<PathBuf>,

    pub approval_id: Option<String>,
    pub plan: Option<ProductionPlan>,
    pub attempts: Vec<AttemptRecord>,
    pub failure_reason: Option<String>,
    pub submitted_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub delivered_at: Option<i64>,
}

impl ProductionJob {
    /// Move to `to`, rejecting edges the state machine does not have
    pub fn transition(&mut self, to: JobStatus) -> Result<(), EngineError> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                job_id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Text the render should work from
    pub fn source_text(&self) -> &str {
        if self.script.trim().is_empty() {
            &self.description
        } else {
            &self.script
        }
    }

    /// Sum of the credits measured across attempts
    pub fn attempt_credits(&self) -> i64 {
        self.attempts.iter().map(|a| a.credits).sum()
    }
}

/// Job counts per status and total spend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub by_status: BTreeMap<String, i64>,
    pub total_credits_used: i64,
}

/// Storage for production jobs
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &NewJob) -> Result<ProductionJob>;

    async fn get(&self, id: i64) -> Result<Option<ProductionJob>>;

    /// Persist every mutable field of the job in a single write
    async fn update(&self, job: &ProductionJob) -> Result<()>;

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<ProductionJob>>;

    async fn queue_stats(&self) -> Result<QueueStats>;
}
