//! Hands-on sessions
//!
//! Practises generative features that exploration has already mapped,
//! spending real credits. Every generation is bracketed by two balance
//! reads; the measured delta feeds the budget, the breakers and the
//! feature's cost history.
//!
//! Before dispatch, features whose learned cost no longer fits the action's
//! allotment are skipped, and a balance already under the safety floor ends
//! the session before anything is generated.
//!
//! Breaker order after each attempt (the attempt is saved first):
//! suspect reading, safety floor, overspend, consecutive failures.

use anyhow::{Context, Result};
use chrono::Utc;
use sdk::actuator::Actuator;
use sdk::knowledge::{KnowledgeRepository, NewKnowledge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::actuator::{CreditDelta, CreditMeter, Health, HealthMonitor};
use crate::config::Config;
use crate::features::{Feature, FeatureMap, FeatureRepository, FeatureSelector, SelectionMode};

use super::{truncate, AttemptDetail, SessionMode, SessionState, SessionSummary, StopReason};

/// Confidence gained for a successful generation
pub const SUCCESS_DELTA: f64 = 0.2;
/// Extra confidence when the result could be assessed
pub const QUALITY_NOTE_BONUS: f64 = 0.1;
/// Confidence gained when the generation failed
pub const FAILURE_DELTA: f64 = 0.05;

const NOTE_MAX_STEPS: u32 = 10;
const NOTE_CHARS: usize = 2000;

/// Tunables for hands-on sessions
#[derive(Debug, Clone)]
pub struct HandsOnSettings {
    pub max_steps: u32,
    pub pause: Duration,
    pub max_consecutive_failures: u32,
    pub max_restarts: u32,
    pub restart_pause: Duration,
    pub safety_floor: i64,
    pub per_action_cap: i64,
    pub plausibility_ceiling: i64,
    pub credit_read_retries: u32,
}

impl HandsOnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.actuator.max_steps,
            pause: Duration::from_secs(config.hands_on.pause_secs),
            max_consecutive_failures: config.hands_on.max_consecutive_failures,
            max_restarts: config.actuator.max_restarts,
            restart_pause: Duration::from_secs(config.actuator.restart_pause_secs),
            safety_floor: config.hands_on.safety_floor,
            per_action_cap: config.hands_on.per_action_cap,
            plausibility_ceiling: config.hands_on.credit_plausibility_ceiling,
            credit_read_retries: config.actuator.credit_read_retries,
        }
    }
}

enum Practice {
    Attempted(PracticeResult),
    /// The opening balance was under the floor; nothing was generated
    BelowFloor { balance: i64 },
}

#[derive(Debug, Clone)]
struct PracticeResult {
    success: bool,
    delta: f64,
    credits: CreditDelta,
    seconds: Option<f64>,
    note: String,
}

/// Time- and credit-boxed practice loop
pub struct HandsOnController {
    actuator: Arc<dyn Actuator>,
    features: Arc<dyn FeatureRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    selector: FeatureSelector,
    meter: CreditMeter,
    settings: HandsOnSettings,
}

impl HandsOnController {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        features: Arc<dyn FeatureRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
        selector: FeatureSelector,
        settings: HandsOnSettings,
    ) -> Self {
        Self {
            meter: CreditMeter::new(settings.plausibility_ceiling, settings.credit_read_retries),
            actuator,
            features,
            knowledge,
            selector,
            settings,
        }
    }

    /// Practise until time or budget run out, nothing is left or a breaker trips
    pub async fn run(&self, duration: Duration, budget: i64) -> Result<SessionSummary> {
        let mut map = self.features.load().await.context("Failed to load features")?;
        let mut state = SessionState::new(duration, budget);
        let mut health = HealthMonitor::new(self.settings.max_restarts, self.settings.restart_pause);

        info!(
            "Hands-on session started: budget {} credits, {}s",
            budget,
            duration.as_secs()
        );

        let stop_reason = loop {
            if !state.time_left() {
                break StopReason::TimeElapsed;
            }
            if health.ensure_connected(self.actuator.as_ref()).await == Health::Unrecoverable {
                break StopReason::ActuatorUnrecoverable;
            }
            if state.budget_exhausted() {
                info!("Budget exhausted: {}/{} credits", state.spent, state.budget);
                break StopReason::BudgetExhausted;
            }

            let allotment = state.allotment(self.settings.per_action_cap);
            let Some(feature) = self.select_affordable(&map, &mut state, allotment) else {
                if state.unaffordable > 0 {
                    info!(
                        "Nothing left fits the remaining allotment of {} credits",
                        allotment
                    );
                    break StopReason::BudgetExhausted;
                }
                info!("No generative feature left to practise");
                break StopReason::Converged;
            };

            info!(
                "Practising [{}] {} (confidence {:.2}, allotment {})",
                feature.category, feature.name, feature.confidence, allotment
            );
            let result = match self.practice(&feature).await {
                Practice::Attempted(result) => result,
                Practice::BelowFloor { balance } => {
                    error!(
                        "Balance {} already below safety floor {}, not generating",
                        balance, self.settings.safety_floor
                    );
                    break StopReason::SafetyFloor;
                }
            };
            let trusted = result.credits.trusted();

            let confidence_after = match map.get_mut(&feature.category, &feature.name) {
                Some(entry) => {
                    entry.record_attempt(result.delta, trusted, result.seconds, Utc::now());
                    self.features
                        .save_feature(entry)
                        .await
                        .with_context(|| format!("Failed to save feature {}", entry.name))?;
                    entry.confidence
                }
                None => feature.confidence,
            };

            if result.credits.suspect {
                warn!(
                    feature = %feature.name,
                    raw = result.credits.raw,
                    counted = result.credits.counted,
                    "Suspect credit reading excluded from budget"
                );
                state.suspect_spend += result.credits.counted;
            }
            state.spent += trusted.unwrap_or(0);

            state.record(AttemptDetail {
                category: feature.category.clone(),
                feature: feature.name.clone(),
                success: result.success,
                confidence_delta: result.delta,
                confidence_after,
                credits: result.credits.counted,
                suspect: result.credits.suspect,
                seconds: result.seconds.unwrap_or(0.0),
                note: result.note,
            });

            if let Some(after) = result.credits.trusted_after() {
                if after < self.settings.safety_floor {
                    error!(
                        "Balance {} below safety floor {}, stopping",
                        after, self.settings.safety_floor
                    );
                    break StopReason::SafetyFloor;
                }
            }
            if let Some(spent) = trusted {
                if spent > allotment {
                    error!(
                        "{} spent {} credits, over its allotment of {}",
                        feature.name, spent, allotment
                    );
                    break StopReason::Overspend;
                }
            }
            if state.consecutive_failures >= self.settings.max_consecutive_failures {
                warn!(
                    "{} consecutive failures, ending hands-on session",
                    state.consecutive_failures
                );
                break StopReason::ConsecutiveFailures;
            }

            state.pause(self.settings.pause).await;
        };

        let summary = state.finish(SessionMode::HandsOn, stop_reason, health.restarts());
        info!(
            "Hands-on session ended ({}): {} features, {} credits spent, {} suspect",
            summary.stop_reason, summary.count, summary.spend, summary.suspect_spend
        );
        Ok(summary)
    }

    /// Next hands-on feature whose learned cost fits `allotment`
    ///
    /// Features that no longer fit are marked attempted; the allotment only
    /// shrinks during a session.
    fn select_affordable(
        &self,
        map: &FeatureMap,
        state: &mut SessionState,
        allotment: i64,
    ) -> Option<Feature> {
        loop {
            let feature = self
                .selector
                .select(map, &state.attempted, SelectionMode::HandsOn)
                .cloned()?;
            state.attempted.insert(feature.key());

            match feature.known_cost() {
                Some(cost) if cost > allotment as f64 => {
                    info!(
                        "Skipping {}: usually costs {:.0} credits, allotment is {}",
                        feature.name, cost, allotment
                    );
                    state.unaffordable += 1;
                }
                _ => return Some(feature),
            }
        }
    }

    async fn practice(&self, feature: &Feature) -> Practice {
        let unmeasured = self.meter.measure(None, None);

        let nav = self
            .actuator
            .run_task(
                &format!(
                    "Navigate to the '{}' feature ({} category) and open it, ready to use.",
                    feature.name, feature.category
                ),
                self.settings.max_steps,
            )
            .await;
        if !nav.success {
            warn!("Could not open {}: {}", feature.name, nav.error_message());
            return Practice::Attempted(PracticeResult {
                success: false,
                delta: FAILURE_DELTA,
                credits: unmeasured,
                seconds: None,
                note: format!("Navigation failed: {}", nav.error_message()),
            });
        }

        let before = self.meter.read_balance(self.actuator.as_ref()).await;
        if let Some(balance) = before.filter(|b| *b < self.settings.safety_floor) {
            return Practice::BelowFloor { balance };
        }
        let started = Instant::now();
        let generated = self
            .actuator
            .run_task(
                &format!(
                    "Use the '{}' feature to generate one short test output with default \
                     settings. {}. Wait until the generation has finished.",
                    feature.name, feature.description
                ),
                self.settings.max_steps,
            )
            .await;
        let seconds = started.elapsed().as_secs_f64();
        let after = self.meter.read_balance(self.actuator.as_ref()).await;
        let credits = self.meter.measure(before, after);

        if !generated.success {
            warn!("Generation with {} failed: {}", feature.name, generated.error_message());
            return Practice::Attempted(PracticeResult {
                success: false,
                delta: FAILURE_DELTA,
                credits,
                seconds: None,
                note: format!("Generation failed: {}", generated.error_message()),
            });
        }

        let mut delta = SUCCESS_DELTA;
        let mut note = "Generated".to_string();
        let assessed = self
            .actuator
            .run_task(
                "Look at the result that was just generated. In two or three sentences, \
                 describe its quality and anything that went wrong.",
                NOTE_MAX_STEPS,
            )
            .await;
        if assessed.success && !assessed.text().trim().is_empty() {
            delta += QUALITY_NOTE_BONUS;
            note = truncate(assessed.text().trim(), NOTE_CHARS);
            let entry = NewKnowledge::new(
                "technical",
                format!("Hands-on: {}", feature.name),
                format!(
                    "{} (credits: {}, {:.0}s)",
                    note,
                    credits
                        .trusted()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    seconds
                ),
                "hands_on",
            )
            .with_confidence(0.7)
            .with_tags(["quality_note", feature.category.as_str(), feature.name.as_str()]);
            if let Err(e) = self.knowledge.add(entry).await {
                warn!("Failed to store quality note: {}", e);
            }
        }

        Practice::Attempted(PracticeResult {
            success: true,
            delta,
            credits,
            seconds: Some(seconds),
            note,
        })
    }
}
