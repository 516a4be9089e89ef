//! Approval gate trait
//!
//! Every production run is submitted to a human approval gate before any
//! credits are spent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Payload submitted for approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub job_id: i64,
    pub title: String,
    pub model: String,
    pub duration_seconds: u32,
    pub estimated_credits: i64,
    pub script_preview: String,
}

/// External approval gate
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Submit a request; `None` means the gate approves automatically
    async fn submit(&self, request: &ApprovalRequest) -> Result<Option<String>, EngineError>;
}
