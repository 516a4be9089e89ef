/// Approval queue
///
/// Requests submitted by the production controller wait here until a
/// human approves or rejects them through the CLI.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::approval::{ApprovalGate, ApprovalRequest};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use super::unix_now;

/// Decision state of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(EngineError::Database(format!("Unknown approval status '{}'", other)).into()),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored approval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: String,
    pub job_id: i64,
    pub request: ApprovalRequest,
    pub status: ApprovalStatus,
    pub created_at: i64,
    pub decided_at: Option<i64>,
}

/// SQLite-backed [`ApprovalGate`]
#[derive(Clone)]
pub struct SqliteApprovalQueue {
    pool: SqlitePool,
}

impl SqliteApprovalQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ApprovalRecord>> {
        let row = sqlx::query(
            "SELECT id, job_id, payload, status, created_at, decided_at FROM approvals WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get approval")?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    /// Requests still waiting for a decision, oldest first
    pub async fn pending(&self) -> Result<Vec<ApprovalRecord>> {
        let rows = sqlx::query(
            "SELECT id, job_id, payload, status, created_at, decided_at FROM approvals \
             WHERE status = 'pending' ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending approvals")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Record a decision; only pending requests can be decided
    pub async fn decide(&self, id: &str, approved: bool) -> Result<ApprovalStatus> {
        let status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };

        let result = sqlx::query(
            "UPDATE approvals SET status = ?, decided_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(unix_now()?)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to record approval decision")?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Approval(format!(
                "Approval {} does not exist or was already decided",
                id
            ))
            .into());
        }
        info!("Approval {} {}", id, status);
        Ok(status)
    }

    fn row_to_record(row: &SqliteRow) -> Result<ApprovalRecord> {
        let payload: String = row.try_get("payload")?;
        let status: String = row.try_get("status")?;
        Ok(ApprovalRecord {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            request: serde_json::from_str(&payload).context("Invalid approval payload")?,
            status: ApprovalStatus::parse(&status)?,
            created_at: row.try_get("created_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

#[async_trait]
impl ApprovalGate for SqliteApprovalQueue {
    async fn submit(&self, request: &ApprovalRequest) -> Result<Option<String>, EngineError> {
        let id = Uuid::new_v4().to_string();
        let payload =
            serde_json::to_string(request).map_err(|e| EngineError::Approval(e.to_string()))?;
        let now = unix_now().map_err(|e| EngineError::Approval(e.to_string()))?;

        sqlx::query(
            "INSERT INTO approvals (id, job_id, payload, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.job_id)
        .bind(payload)
        .bind(ApprovalStatus::Pending.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Approval(e.to_string()))?;

        info!(
            "Job #{} queued for approval ({} credits estimated)",
            request.job_id, request.estimated_credits
        );
        Ok(Some(id))
    }
}
