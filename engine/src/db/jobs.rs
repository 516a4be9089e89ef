/// Production job persistence
///
/// Structured fields (best score, plan, attempt log) are stored as JSON
/// text. `update` writes every mutable column in one statement so a job row
/// is never half-updated.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use super::unix_now;
use crate::production::{JobRepository, JobStatus, NewJob, ProductionJob, QueueStats};

const SELECT_JOB: &str = "SELECT id, title, description, script, model, duration_seconds, \
     status, render_attempts, best_score, best_attempt, credits_used, cost_estimate, \
     video_path, approval_id, plan, attempts, failure_reason, submitted_by, created_at, \
     updated_at, delivered_at FROM jobs";

/// SQLite-backed [`JobRepository`]
#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> Result<ProductionJob> {
        let status: String = row.try_get("status")?;
        let best_score: Option<String> = row.try_get("best_score")?;
        let plan: Option<String> = row.try_get("plan")?;
        let attempts: String = row.try_get("attempts")?;
        let video_path: Option<String> = row.try_get("video_path")?;

        Ok(ProductionJob {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            script: row.try_get("script")?,
            model: row.try_get("model")?,
            duration_seconds: row.try_get::<i64, _>("duration_seconds")?.max(0) as u32,
            status: status.parse::<JobStatus>()?,
            render_attempts: row.try_get::<i64, _>("render_attempts")?.max(0) as u32,
            best_score: best_score
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .context("Invalid best score")?,
            best_attempt: row
                .try_get::<Option<i64>, _>("best_attempt")?
                .map(|attempt| attempt.max(0) as u32),
            credits_used: row.try_get("credits_used")?,
            cost_estimate: row.try_get("cost_estimate")?,
            video_path: video_path.map(PathBuf::from),
            approval_id: row.try_get("approval_id")?,
            plan: plan
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .context("Invalid plan")?,
            attempts: serde_json::from_str(&attempts).context("Invalid attempt log")?,
            failure_reason: row.try_get("failure_reason")?,
            submitted_by: row.try_get("submitted_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &NewJob) -> Result<ProductionJob> {
        let now = unix_now()?;

        let id = sqlx::query(
            "INSERT INTO jobs (title, description, script, model, duration_seconds, status, \
             submitted_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.script)
        .bind(&job.model)
        .bind(i64::from(job.duration_seconds))
        .bind(JobStatus::Received.as_str())
        .bind(&job.submitted_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create job")?
        .last_insert_rowid();

        debug!("Created job #{}", id);

        Ok(ProductionJob {
            id,
            title: job.title.clone(),
            description: job.description.clone(),
            script: job.script.clone(),
            model: job.model.clone(),
            duration_seconds: job.duration_seconds,
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
            submitted_by: job.submitted_by.clone(),
            created_at: now,
            updated_at: now,
            delivered_at: None,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<ProductionJob>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_JOB))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get job")?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn update(&self, job: &ProductionJob) -> Result<()> {
        let best_score = job
            .best_score
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let plan = job.plan.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE jobs SET model = ?, status = ?, render_attempts = ?, best_score = ?, \
             best_attempt = ?, credits_used = ?, cost_estimate = ?, video_path = ?, \
             approval_id = ?, plan = ?, attempts = ?, failure_reason = ?, updated_at = ?, \
             delivered_at = ? WHERE id = ?",
        )
        .bind(&job.model)
        .bind(job.status.as_str())
        .bind(i64::from(job.render_attempts))
        .bind(best_score)
        .bind(job.best_attempt.map(i64::from))
        .bind(job.credits_used)
        .bind(job.cost_estimate)
        .bind(
            job.video_path
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        )
        .bind(&job.approval_id)
        .bind(plan)
        .bind(serde_json::to_string(&job.attempts)?)
        .bind(&job.failure_reason)
        .bind(unix_now()?)
        .bind(job.delivered_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update job #{}", job.id))?;

        if result.rows_affected() == 0 {
            return Err(sdk::errors::EngineError::JobNotFound(job.id).into());
        }
        Ok(())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<ProductionJob>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!("{} WHERE status = ? ORDER BY id", SELECT_JOB))
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY id", SELECT_JOB))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to list jobs")?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count, COALESCE(SUM(credits_used), 0) AS credits \
             FROM jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute queue stats")?;

        let mut by_status: BTreeMap<String, i64> = JobStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        let mut total_credits_used = 0;
        for row in rows {
            let status: String = row.try_get("status")?;
            by_status.insert(status, row.try_get("count")?);
            total_credits_used += row.try_get::<i64, _>("credits")?;
        }

        Ok(QueueStats {
            by_status,
            total_credits_used,
        })
    }
}
