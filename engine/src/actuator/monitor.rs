//! Screen monitoring
//!
//! Long-running steps in the target application (renders, chat-driven
//! project setup) stop and ask questions. The monitor polls
//! [`Actuator::observe`], answers questions affirmatively and reports
//! errors and completion.

use sdk::actuator::{Actuator, ScreenEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reply used when the screen does not suggest one
pub const DEFAULT_REPLY: &str = "Yes, go ahead";

const REPLY_MAX_STEPS: u32 = 10;

/// How a monitored wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed {
        description: String,
        interactions: u32,
    },
    Failed {
        description: String,
    },
    TimedOut {
        checks: u32,
    },
}

/// What a single observation asked of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Nothing to do, keep waiting
    Idle,
    /// A question was answered
    Answered,
    Error(String),
    Done(String),
}

/// Watches the screen through an actuator
pub struct ScreenMonitor {
    actuator: Arc<dyn Actuator>,
    poll_interval: Duration,
}

impl ScreenMonitor {
    pub fn new(actuator: Arc<dyn Actuator>, poll_interval: Duration) -> Self {
        Self {
            actuator,
            poll_interval,
        }
    }

    /// Observe once and react to whatever is on screen
    pub async fn check(&self) -> Reaction {
        match self.actuator.observe().await {
            ScreenEvent::NoAction => Reaction::Idle,
            ScreenEvent::Question {
                description,
                suggested_response,
            } => {
                let reply = suggested_response
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REPLY.to_string());
                info!("Answering on-screen question '{}' with '{}'", description, reply);
                let outcome = self
                    .actuator
                    .run_task(
                        &format!(
                            "The page is asking: '{}'. Respond by typing '{}' in the chat \
                             or input area and pressing Enter, or click the confirmation \
                             button that means yes or proceed.",
                            description, reply
                        ),
                        REPLY_MAX_STEPS,
                    )
                    .await;
                if !outcome.success {
                    warn!("Could not answer question: {}", outcome.error_message());
                }
                Reaction::Answered
            }
            ScreenEvent::ErrorDetected { description } => {
                warn!("Screen shows an error: {}", description);
                self.actuator.take_screenshot("monitor_error").await;
                Reaction::Error(description)
            }
            ScreenEvent::Completion { description } => {
                debug!("Screen reports completion: {}", description);
                Reaction::Done(description)
            }
        }
    }

    /// Poll until completion, an error, or `max_checks` observations
    pub async fn wait_for_completion(&self, max_checks: u32) -> WaitOutcome {
        let mut interactions = 0;
        for check in 0..max_checks {
            match self.check().await {
                Reaction::Done(description) => {
                    return WaitOutcome::Completed {
                        description,
                        interactions,
                    }
                }
                Reaction::Error(description) => return WaitOutcome::Failed { description },
                Reaction::Answered => interactions += 1,
                Reaction::Idle => {}
            }
            if check + 1 < max_checks && !self.poll_interval.is_zero() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        WaitOutcome::TimedOut { checks: max_checks }
    }
}
