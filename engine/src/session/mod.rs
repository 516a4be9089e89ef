//! Learning sessions
//!
//! A session is a time-boxed loop over features: select, dispatch to the
//! actuator, record the outcome, check the stop conditions. Exploration
//! never spends credits on purpose; hands-on sessions do and carry a credit
//! budget with circuit breakers.
//!
//! Session state is ephemeral. Only feature updates are persisted, one
//! write per attempt; the [`SessionSummary`] is returned and logged.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::features::FeatureKey;

pub mod explore;
pub mod hands_on;

pub use explore::{ExploreController, ExploreSettings};
pub use hands_on::{HandsOnController, HandsOnSettings};

/// Kind of session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Explore,
    HandsOn,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Explore => "explore",
            SessionMode::HandsOn => "hands_on",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TimeElapsed,
    /// No selectable feature left
    Converged,
    BudgetExhausted,
    SafetyFloor,
    Overspend,
    ConsecutiveFailures,
    ActuatorUnrecoverable,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::TimeElapsed => "time_elapsed",
            StopReason::Converged => "converged",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::SafetyFloor => "safety_floor",
            StopReason::Overspend => "overspend",
            StopReason::ConsecutiveFailures => "consecutive_failures",
            StopReason::ActuatorUnrecoverable => "actuator_unrecoverable",
        }
    }

    /// Breakers that end a session before its time is up
    pub fn is_breaker(&self) -> bool {
        matches!(
            self,
            StopReason::SafetyFloor
                | StopReason::Overspend
                | StopReason::ConsecutiveFailures
                | StopReason::ActuatorUnrecoverable
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one feature during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptDetail {
    pub category: String,
    pub feature: String,
    pub success: bool,
    pub confidence_delta: f64,
    pub confidence_after: f64,

    /// Credits counted for the attempt; clamped when suspect
    pub credits: i64,

    /// Reading excluded from budget and cost history
    pub suspect: bool,

    pub seconds: f64,
    pub note: String,
}

/// Result of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub mode: SessionMode,
    pub count: usize,

    /// Trusted credits spent
    pub spend: i64,

    /// Clamped credits from suspect readings, not part of `spend`
    pub suspect_spend: i64,

    pub stop_reason: StopReason,
    pub restarts: u32,
    pub elapsed_secs: f64,
    pub details: Vec<AttemptDetail>,
}

/// Per-session bookkeeping
#[derive(Debug)]
pub(crate) struct SessionState {
    started: Instant,
    deadline: Instant,
    pub budget: i64,
    pub spent: i64,
    pub suspect_spend: i64,
    pub attempted: HashSet<FeatureKey>,
    /// Features skipped because their learned cost exceeded the allotment
    pub unaffordable: u32,
    pub consecutive_failures: u32,
    pub details: Vec<AttemptDetail>,
}

impl SessionState {
    pub fn new(duration: Duration, budget: i64) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + duration,
            budget,
            spent: 0,
            suspect_spend: 0,
            attempted: HashSet::new(),
            unaffordable: 0,
            consecutive_failures: 0,
            details: Vec::new(),
        }
    }

    pub fn time_left(&self) -> bool {
        Instant::now() < self.deadline
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn budget_exhausted(&self) -> bool {
        self.spent >= self.budget
    }

    /// Credits one action may spend: the per-action cap or what is left
    pub fn allotment(&self, per_action_cap: i64) -> i64 {
        per_action_cap.min(self.budget - self.spent)
    }

    pub fn record(&mut self, detail: AttemptDetail) {
        if detail.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.details.push(detail);
    }

    /// Sleep between features without overrunning the deadline
    pub async fn pause(&self, pause: Duration) {
        if pause.is_zero() || !self.time_left() {
            return;
        }
        tokio::time::sleep(pause.min(self.remaining_time())).await;
    }

    pub fn finish(self, mode: SessionMode, stop_reason: StopReason, restarts: u32) -> SessionSummary {
        SessionSummary {
            mode,
            count: self.details.len(),
            spend: self.spent,
            suspect_spend: self.suspect_spend,
            stop_reason,
            restarts,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            details: self.details,
        }
    }
}

/// Cut `text` to at most `max` characters
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
