//! Production job controller
//!
//! Drives a job through planning, approval and quality-gated rendering:
//!
//! 1. `submit` stores a `received` job
//! 2. `plan` resolves the model, estimates credits and pulls model knowledge
//! 3. `request_approval` hands the plan to the approval gate
//! 4. `produce` renders up to [`MAX_RENDER_ATTEMPTS`] times, feeding each
//!    review back into the next attempt, and finalises the job
//!
//! Every state change is persisted before the next actuator call, so an
//! interrupted job resumes from its next attempt with the credits and best
//! score it already has.

use anyhow::{Context, Result};
use chrono::Utc;
use sdk::actuator::Actuator;
use sdk::approval::{ApprovalGate, ApprovalRequest};
use sdk::errors::EngineError;
use sdk::judge::{Judge, JudgeContext};
use sdk::knowledge::{KnowledgeFilter, KnowledgeRepository, NewKnowledge};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::actuator::{CreditMeter, Health, HealthMonitor};
use crate::config::Config;

use super::portfolio::add_to_portfolio;
use super::quality::DELIVERY_THRESHOLD;
use super::{
    AttemptRecord, JobRepository, JobStatus, NewJob, Planner, ProductionJob, QualityPolicy,
    QualityScore, RenderRequest, Renderer, MAX_RENDER_ATTEMPTS,
};

/// Knowledge hits carried into a plan
const PLAN_KNOWLEDGE_LIMIT: i64 = 5;

const SCRIPT_PREVIEW_CHARS: usize = 300;

/// Collaborators of the production controller
#[derive(Clone)]
pub struct ProductionDeps {
    pub jobs: Arc<dyn JobRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub approvals: Option<Arc<dyn ApprovalGate>>,
    pub actuator: Arc<dyn Actuator>,
    pub judge: Arc<dyn Judge>,
}

/// Summary of a `produce` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOutcome {
    pub job_id: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub best_score: Option<f64>,
    pub best_attempt: Option<u32>,
    pub credits_used: i64,
    pub video_path: Option<PathBuf>,
    pub portfolio_path: Option<PathBuf>,
    pub reason: Option<String>,
}

/// Job state machine and render loop
pub struct ProductionController {
    jobs: Arc<dyn JobRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    approvals: Option<Arc<dyn ApprovalGate>>,
    actuator: Arc<dyn Actuator>,
    judge: Arc<dyn Judge>,
    planner: Planner,
    renderer: Renderer,
    meter: CreditMeter,
    policy: QualityPolicy,
    portfolio_dir: PathBuf,
    max_restarts: u32,
    restart_pause: Duration,
}

impl ProductionController {
    pub fn new(deps: ProductionDeps, config: &Config) -> Self {
        Self {
            renderer: Renderer::from_config(deps.actuator.clone(), config),
            jobs: deps.jobs,
            knowledge: deps.knowledge,
            approvals: deps.approvals,
            actuator: deps.actuator,
            judge: deps.judge,
            planner: Planner::from_config(&config.production),
            meter: CreditMeter::new(
                config.hands_on.credit_plausibility_ceiling,
                config.actuator.credit_read_retries,
            ),
            policy: QualityPolicy {
                enforce_critical_categories: config.production.enforce_critical_categories,
                critical_categories: config.production.critical_categories.clone(),
            },
            portfolio_dir: config.production.portfolio_dir.clone(),
            max_restarts: config.actuator.max_restarts,
            restart_pause: Duration::from_secs(config.actuator.restart_pause_secs),
        }
    }

    /// Store a new job in the `received` state
    pub async fn submit(&self, new_job: &NewJob) -> Result<ProductionJob> {
        if new_job.title.trim().is_empty() {
            return Err(EngineError::Config("Job title must not be empty".to_string()).into());
        }
        if new_job.script.trim().is_empty() && new_job.description.trim().is_empty() {
            return Err(
                EngineError::Config("Job needs a script or a description".to_string()).into(),
            );
        }

        let job = self.jobs.create(new_job).await?;
        info!("Job #{} received: {}", job.id, job.title);
        Ok(job)
    }

    /// Load a job or fail with `JobNotFound`
    pub async fn job(&self, job_id: i64) -> Result<ProductionJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id).into())
    }

    /// Build the production plan and move the job to `planned`
    pub async fn plan(&self, job_id: i64) -> Result<ProductionJob> {
        let mut job = self.job(job_id).await?;
        if !matches!(job.status, JobStatus::Received | JobStatus::Planned) {
            return Err(EngineError::InvalidTransition {
                job_id,
                from: job.status.to_string(),
                to: JobStatus::Planned.to_string(),
            }
            .into());
        }

        let query = self.planner.knowledge_query(&job);
        let filter = KnowledgeFilter::category("technical").with_limit(PLAN_KNOWLEDGE_LIMIT);
        let knowledge = match self.knowledge.search(&query, &filter).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Knowledge lookup for job #{} failed: {}", job_id, e);
                Vec::new()
            }
        };

        let plan = self.planner.plan(&job, &knowledge);
        info!(
            "Job #{} planned: {} for {}s, ~{} credits ({} knowledge hits)",
            job_id,
            plan.model,
            plan.duration_seconds,
            plan.estimated_credits,
            plan.knowledge_context.len()
        );

        job.model = plan.model.clone();
        job.cost_estimate = plan.estimated_credits;
        job.plan = Some(plan);
        job.transition(JobStatus::Planned)?;
        self.jobs.update(&job).await?;
        Ok(job)
    }

    /// Submit a planned job to the approval gate
    ///
    /// Without a gate, or when the gate answers with no id, the job is
    /// approved straight away.
    pub async fn request_approval(&self, job_id: i64) -> Result<ProductionJob> {
        let mut job = self.job(job_id).await?;
        if job.status != JobStatus::Planned {
            return Err(EngineError::JobNotReady {
                job_id,
                reason: format!("approval needs a planned job, status is {}", job.status),
            }
            .into());
        }

        let Some(gate) = &self.approvals else {
            warn!("No approval gate configured, auto-approving job #{}", job_id);
            job.transition(JobStatus::Approved)?;
            self.jobs.update(&job).await?;
            return Ok(job);
        };

        let request = ApprovalRequest {
            job_id,
            title: job.title.clone(),
            model: job.model.clone(),
            duration_seconds: job.duration_seconds,
            estimated_credits: job.cost_estimate,
            script_preview: job.source_text().chars().take(SCRIPT_PREVIEW_CHARS).collect(),
        };

        match gate
            .submit(&request)
            .await
            .with_context(|| format!("Failed to submit job #{} for approval", job_id))?
        {
            Some(approval_id) => {
                info!("Job #{} awaiting approval {}", job_id, approval_id);
                job.approval_id = Some(approval_id);
            }
            None => {
                warn!("Approval gate returned no id, auto-approving job #{}", job_id);
                job.transition(JobStatus::Approved)?;
            }
        }
        self.jobs.update(&job).await?;
        Ok(job)
    }

    /// Apply the approver's decision to a planned job
    pub async fn record_decision(&self, job_id: i64, approved: bool) -> Result<ProductionJob> {
        let mut job = self.job(job_id).await?;
        if job.status != JobStatus::Planned {
            return Err(EngineError::JobNotReady {
                job_id,
                reason: format!("no pending approval, status is {}", job.status),
            }
            .into());
        }

        if approved {
            job.transition(JobStatus::Approved)?;
            info!("Job #{} approved", job_id);
        } else {
            job.transition(JobStatus::Failed)?;
            job.failure_reason = Some("rejected by approver".to_string());
            info!("Job #{} rejected by approver", job_id);
        }
        self.jobs.update(&job).await?;
        Ok(job)
    }

    /// Render, review and finalise an approved job
    pub async fn produce(&self, job_id: i64) -> Result<ProductionOutcome> {
        let mut job = self.job(job_id).await?;
        match job.status {
            JobStatus::Approved | JobStatus::Producing | JobStatus::Reviewing => {}
            JobStatus::Received | JobStatus::Planned => {
                return Err(EngineError::JobNotReady {
                    job_id,
                    reason: format!("status is {}", job.status),
                }
                .into())
            }
            JobStatus::Delivered | JobStatus::Failed => {
                return Err(EngineError::InvalidTransition {
                    job_id,
                    from: job.status.to_string(),
                    to: JobStatus::Producing.to_string(),
                }
                .into())
            }
        }

        if job.render_attempts > 0 {
            info!(
                "Resuming job #{} after {} attempt(s), {} credits used",
                job_id, job.render_attempts, job.credits_used
            );
        }

        job.transition(JobStatus::Producing)?;
        self.jobs.update(&job).await?;

        let mut health = HealthMonitor::new(self.max_restarts, self.restart_pause);
        let mut feedback = last_feedback(&job);
        let mut abort_reason = None;

        let already_deliverable = job.best_score.as_ref().is_some_and(QualityScore::deliverable);
        let first = job.render_attempts + 1;
        if !already_deliverable {
            for attempt in first..=MAX_RENDER_ATTEMPTS {
                if health.ensure_connected(self.actuator.as_ref()).await == Health::Unrecoverable {
                    let reason = format!(
                        "Actuator unrecoverable after {} restarts",
                        health.restarts()
                    );
                    error!("Job #{}: {}", job_id, reason);
                    abort_reason = Some(reason);
                    break;
                }

                self.run_attempt(&mut job, attempt, feedback.as_deref()).await?;

                if let Some(score) = job.attempts.last().and_then(|a| a.score.as_ref()) {
                    feedback = Some(score.feedback());
                }
                if job.best_score.as_ref().is_some_and(QualityScore::deliverable) {
                    debug!("Job #{} reached the delivery threshold", job_id);
                    break;
                }
            }
        }

        self.finalize(job, abort_reason).await
    }

    async fn run_attempt(
        &self,
        job: &mut ProductionJob,
        attempt: u32,
        feedback: Option<&str>,
    ) -> Result<()> {
        if job.status == JobStatus::Reviewing {
            job.transition(JobStatus::Producing)?;
        }
        job.render_attempts = attempt;
        self.jobs.update(job).await?;

        let adjustments = feedback.map(|f| adjustment_text(attempt, f));
        let request = RenderRequest {
            job_id: job.id,
            attempt,
            script: job.source_text().to_string(),
            model: job.model.clone(),
            adjustments: adjustments.clone(),
        };

        let before = self.meter.read_balance(self.actuator.as_ref()).await;
        let rendered = self.renderer.render(&request).await;
        let after = self.meter.read_balance(self.actuator.as_ref()).await;

        let delta = self.meter.measure(before, after);
        if !delta.measured {
            warn!(
                "Job #{} attempt {}: credits could not be measured",
                job.id, attempt
            );
        }

        let mut record = AttemptRecord {
            attempt,
            credits: delta.trusted().unwrap_or(0),
            suspect_reading: delta.suspect,
            score: None,
            artifact: None,
            error: None,
            adjustments,
        };

        match rendered {
            Ok(artifact) => {
                job.transition(JobStatus::Reviewing)?;
                self.jobs.update(job).await?;

                let score = self.review(job, attempt, &artifact).await;
                info!(
                    "Job #{} attempt {} scored {:.1} ({})",
                    job.id, attempt, score.overall, score.recommendation
                );

                // ties keep the earlier attempt
                let improves = job
                    .best_score
                    .as_ref()
                    .map_or(true, |best| score.overall > best.overall);
                if improves {
                    job.best_score = Some(score.clone());
                    job.best_attempt = Some(attempt);
                    job.video_path = Some(artifact.clone());
                }

                record.score = Some(score);
                record.artifact = Some(artifact);
            }
            Err(failure) => {
                warn!(
                    "Job #{} attempt {} failed: {}",
                    job.id, attempt, failure.reason
                );
                record.error = Some(failure.reason);
            }
        }

        job.attempts.push(record);
        job.credits_used = job.attempt_credits();
        self.jobs.update(job).await?;
        Ok(())
    }

    async fn review(&self, job: &ProductionJob, attempt: u32, artifact: &Path) -> QualityScore {
        let context = JudgeContext {
            model: job.model.clone(),
            duration_seconds: job.duration_seconds,
            attempt,
        };

        let score = match self.judge.score(artifact, job.source_text(), &context).await {
            Ok(verdict) => QualityScore::from_verdict(&verdict, &self.policy),
            Err(e) => {
                warn!(
                    "Quality review of job #{} attempt {} failed, scoring neutrally: {}",
                    job.id, attempt, e
                );
                QualityScore::neutral(&e.to_string())
            }
        };

        let mut content = format!(
            "Score {:.1}/10 ({}). Visual {:.0}, motion {:.0}, consistency {:.0}, audio {:.0}, script {:.0}.",
            score.overall,
            score.recommendation,
            score.visual_quality,
            score.motion,
            score.consistency,
            score.audio_sync,
            score.script_adherence
        );
        if !score.issues.is_empty() {
            content.push_str(" Issues: ");
            content.push_str(&score.issues.join("; "));
        }
        let entry = NewKnowledge::new(
            "quality",
            format!("{} review: job #{} attempt {}", job.model, job.id, attempt),
            content,
            "quality_review",
        )
        .with_confidence(0.6)
        .with_tags([job.model.clone(), "review".to_string()]);
        if let Err(e) = self.knowledge.add(entry).await {
            warn!("Failed to store quality review: {}", e);
        }

        score
    }

    async fn finalize(
        &self,
        mut job: ProductionJob,
        abort_reason: Option<String>,
    ) -> Result<ProductionOutcome> {
        job.credits_used = job.attempt_credits();
        let mut portfolio_path = None;

        match job.best_score.clone() {
            Some(best) if best.deliverable() => {
                job.transition(JobStatus::Delivered)?;
                job.failure_reason = None;
                job.delivered_at = Some(Utc::now().timestamp());
                info!(
                    "Job #{} delivered: score {:.1} from attempt {}, {} credits",
                    job.id,
                    best.overall,
                    job.best_attempt.unwrap_or_default(),
                    job.credits_used
                );

                if best.portfolio_worthy() {
                    if let Some(video) = &job.video_path {
                        match add_to_portfolio(&self.portfolio_dir, job.id, video).await {
                            Ok(path) => portfolio_path = Some(path),
                            Err(e) => warn!("Portfolio copy for job #{} failed: {:#}", job.id, e),
                        }
                    }
                }
            }
            best => {
                let reason = abort_reason.unwrap_or_else(|| match &best {
                    Some(best) => format!(
                        "Best score {:.1} from attempt {} is below the delivery threshold {:.1} after {} attempts",
                        best.overall,
                        job.best_attempt.unwrap_or_default(),
                        DELIVERY_THRESHOLD,
                        job.render_attempts
                    ),
                    None => format!(
                        "No attempt produced a reviewable video after {} attempts",
                        job.render_attempts
                    ),
                });
                job.transition(JobStatus::Failed)?;
                warn!("Job #{} failed: {}", job.id, reason);
                job.failure_reason = Some(reason);
            }
        }

        self.jobs.update(&job).await?;

        Ok(ProductionOutcome {
            job_id: job.id,
            status: job.status,
            attempts: job.render_attempts,
            best_score: job.best_score.as_ref().map(|s| s.overall),
            best_attempt: job.best_attempt,
            credits_used: job.credits_used,
            video_path: job.video_path.clone(),
            portfolio_path,
            reason: job.failure_reason.clone(),
        })
    }
}

/// Instructions carried into `attempt` from the previous review
pub fn adjustment_text(attempt: u32, feedback: &str) -> String {
    format!(
        "Attempt {} of {}. Fix the following from the previous review: {}",
        attempt, MAX_RENDER_ATTEMPTS, feedback
    )
}

/// Feedback of the most recent reviewed attempt
fn last_feedback(job: &ProductionJob) -> Option<String> {
    job.attempts
        .iter()
        .rev()
        .find_map(|a| a.score.as_ref())
        .map(QualityScore::feedback)
}
