//! Actuator trait and outcome types
//!
//! The actuator is the automation layer that performs actions against the
//! third-party web application. The engine never touches the browser
//! directly; every interaction goes through this trait so that controllers
//! branch on typed outcomes instead of error text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Classification of an actuator failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorErrorKind {
    /// The browser session is gone; a restart is required
    Disconnected,

    /// The task failed but the session is healthy; retrying may work
    Transient,

    /// The task cannot succeed as instructed
    Fatal,
}

impl ActuatorErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActuatorErrorKind::Disconnected => "disconnected",
            ActuatorErrorKind::Transient => "transient",
            ActuatorErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ActuatorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed actuator failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorError {
    pub kind: ActuatorErrorKind,
    pub message: String,
}

impl ActuatorError {
    pub fn new(kind: ActuatorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ActuatorErrorKind::Disconnected, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ActuatorErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ActuatorErrorKind::Fatal, message)
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a single `run_task` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Whether the actuator reports the task as done
    pub success: bool,

    /// Free-form result text produced by the task
    #[serde(default)]
    pub result: Option<String>,

    /// Failure classification, if the task failed
    #[serde(default)]
    pub error: Option<ActuatorError>,

    /// Number of automation steps consumed
    #[serde(default)]
    pub steps_taken: u32,
}

impl TaskOutcome {
    /// Create a successful outcome
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
            steps_taken: 0,
        }
    }

    /// Create a failed outcome
    pub fn failed(error: ActuatorError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            steps_taken: 0,
        }
    }

    /// True when the failure was a lost browser session
    pub fn disconnected(&self) -> bool {
        matches!(
            self.error,
            Some(ActuatorError {
                kind: ActuatorErrorKind::Disconnected,
                ..
            })
        )
    }

    /// Result text, or an empty string
    pub fn text(&self) -> &str {
        self.result.as_deref().unwrap_or("")
    }

    /// Failure message, or a generic one for unsuccessful outcomes
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(error) => error.to_string(),
            None if self.success => String::new(),
            None => "task reported unsuccessful".to_string(),
        }
    }
}

/// Something visible on screen that may need a reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreenEvent {
    /// The page is asking a question or waiting for confirmation
    Question {
        description: String,
        #[serde(default)]
        suggested_response: Option<String>,
    },

    /// An error banner or dialog is showing
    ErrorDetected { description: String },

    /// A long-running process finished
    Completion { description: String },

    /// Nothing needs attention
    NoAction,
}

/// The automation layer driven by the controllers
///
/// Implementations are stateful (one browser session) and must tolerate
/// being called sequentially from a single controller task.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Run a natural-language task with a bounded number of steps
    async fn run_task(&self, instruction: &str, max_steps: u32) -> TaskOutcome;

    /// Capture the current page, returning the saved path
    async fn take_screenshot(&self, name: &str) -> Option<PathBuf>;

    /// Read the current credit balance, if it can be read
    async fn credit_balance(&self) -> Option<i64>;

    /// Whether the browser session is believed to be alive
    fn is_connected(&self) -> bool;

    /// Stop, restart and re-verify the login; true when usable again
    async fn restart(&self) -> bool;

    /// Look at the screen and classify what needs attention
    async fn observe(&self) -> ScreenEvent {
        ScreenEvent::NoAction
    }

    /// Export the current project's artifact to a local file
    async fn export_artifact(&self, _filename: &str) -> Option<PathBuf> {
        None
    }
}
