//! Error types and handling
//!
//! This module provides the error types used throughout the Framewright engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Actuator**: Browser automation failures and disconnects
/// - **Judge**: Quality assessment failures
/// - **Production**: Job lookup and state machine violations
/// - **Session**: Reentrancy and kill switch guards
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::JobNotFound(7);
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::ActuatorUnrecoverable { restarts: 3 };
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Actuator errors
    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error("Actuator unrecoverable after {restarts} restarts")]
    ActuatorUnrecoverable { restarts: u32 },

    #[error("Bridge error: {0}")]
    Bridge(String),

    // Judge errors
    #[error("Judge error: {0}")]
    Judge(String),

    #[error("Judge response could not be parsed: {0}")]
    JudgeUnparseable(String),

    // Approval errors
    #[error("Approval error: {0}")]
    Approval(String),

    // Production errors
    #[error("Job not found: #{0}")]
    JobNotFound(i64),

    #[error("Invalid job transition for #{job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: i64,
        from: String,
        to: String,
    },

    #[error("Job #{job_id} is not ready: {reason}")]
    JobNotReady { job_id: i64, reason: String },

    // Feature errors
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    // Session errors
    #[error("A session is already active on this actuator")]
    SessionActive,

    #[error("Kill switch active: {0}")]
    KillSwitchActive(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",

            Self::Actuator(_) => "Browser automation failed. Check the bridge logs",
            Self::ActuatorUnrecoverable { .. } => {
                "Browser could not be restarted. Log in again manually"
            }
            Self::Bridge(_) => "Automation bridge failed. Check actuator.bridge_command",

            Self::Judge(_) => "Quality review failed. The attempt is scored neutrally",
            Self::JudgeUnparseable(_) => "Quality review returned an unreadable verdict",

            Self::Approval(_) => "Approval queue unavailable",

            Self::JobNotFound(_) => "No job with that id. Run 'framewright queue'",
            Self::InvalidTransition { .. } => "The job is not in a state that allows this",
            Self::JobNotReady { .. } => "The job must be approved before production",

            Self::FeatureNotFound(_) => "No feature with that name. Run 'framewright progress'",

            Self::SessionActive => "Wait for the running session to finish",
            Self::KillSwitchActive(_) => "Remove the kill switch file to resume",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::ActuatorUnrecoverable { .. }
            | Self::KillSwitchActive(_)
            | Self::InvalidTransition { .. } => false,

            _ => true,
        }
    }
}
