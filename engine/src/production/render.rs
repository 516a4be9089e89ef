//! Render sequence
//!
//! One render attempt drives the actuator through project creation, script
//! entry, model selection and the render itself, then waits on the screen
//! monitor and exports the result.

use sdk::actuator::Actuator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actuator::{ScreenMonitor, WaitOutcome};
use crate::config::Config;

/// Inputs for a single render attempt
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: i64,
    pub attempt: u32,
    pub script: String,
    pub model: String,

    /// Review feedback carried over from the previous attempt
    pub adjustments: Option<String>,
}

impl RenderRequest {
    /// File name the artifact is exported under
    pub fn artifact_name(&self) -> String {
        format!("job_{}_attempt_{}.mp4", self.job_id, self.attempt)
    }
}

/// Why a render attempt produced no artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub reason: String,

    /// The browser session was lost during the attempt
    pub disconnected: bool,
}

impl RenderFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            disconnected: false,
        }
    }
}

/// Drives the render sequence through an actuator
pub struct Renderer {
    actuator: Arc<dyn Actuator>,
    monitor: ScreenMonitor,
    max_steps: u32,
    poll_limit: u32,
}

impl Renderer {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        max_steps: u32,
        poll_limit: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            monitor: ScreenMonitor::new(actuator.clone(), poll_interval),
            actuator,
            max_steps,
            poll_limit,
        }
    }

    pub fn from_config(actuator: Arc<dyn Actuator>, config: &Config) -> Self {
        Self::new(
            actuator,
            config.actuator.max_steps,
            config.production.render_poll_limit,
            Duration::from_secs(config.production.render_poll_interval_secs),
        )
    }

    /// Run the full sequence, returning the exported artifact
    pub async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderFailure> {
        info!(
            "Rendering job #{} attempt {} on {}",
            request.job_id, request.attempt, request.model
        );

        self.step(
            "create project",
            "Create a new video project from the home page. Wait until the empty \
             project editor is open."
                .to_string(),
        )
        .await?;

        let mut script_instruction = format!(
            "Enter the following script into the project's script or prompt area:\n\n{}",
            request.script
        );
        if let Some(adjustments) = request.adjustments.as_deref().filter(|a| !a.is_empty()) {
            script_instruction.push_str("\n\nAlso apply these changes: ");
            script_instruction.push_str(adjustments);
        }
        self.step("enter script", script_instruction).await?;

        self.step(
            "select model",
            format!(
                "Open the video model selector and choose the '{}' model.",
                request.model
            ),
        )
        .await?;

        self.step(
            "start render",
            "Start generating the video. Confirm any dialog that asks whether to proceed."
                .to_string(),
        )
        .await?;

        match self.monitor.wait_for_completion(self.poll_limit).await {
            WaitOutcome::Completed { interactions, .. } => {
                debug!("Render finished after {} interaction(s)", interactions);
            }
            WaitOutcome::Failed { description } => {
                return Err(RenderFailure {
                    disconnected: !self.actuator.is_connected(),
                    reason: format!("Render error: {}", description),
                });
            }
            WaitOutcome::TimedOut { checks } => {
                return Err(RenderFailure {
                    disconnected: !self.actuator.is_connected(),
                    reason: format!("Render did not complete after {} checks", checks),
                });
            }
        }

        let artifact_name = request.artifact_name();
        match self.actuator.export_artifact(&artifact_name).await {
            Some(path) => {
                info!("Exported {}", path.display());
                Ok(path)
            }
            None => {
                warn!("Export of {} failed", artifact_name);
                Err(RenderFailure {
                    disconnected: !self.actuator.is_connected(),
                    reason: "Export failed".to_string(),
                })
            }
        }
    }

    async fn step(&self, name: &str, instruction: String) -> Result<(), RenderFailure> {
        debug!("Render step: {}", name);
        let outcome = self.actuator.run_task(&instruction, self.max_steps).await;
        if outcome.success {
            return Ok(());
        }

        warn!("Render step '{}' failed: {}", name, outcome.error_message());
        self.actuator
            .take_screenshot(&format!("render_{}", name.replace(' ', "_")))
            .await;
        let mut failure = RenderFailure::new(format!(
            "Step '{}' failed: {}",
            name,
            outcome.error_message()
        ));
        failure.disconnected = outcome.disconnected();
        Err(failure)
    }
}
