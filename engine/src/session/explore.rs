//! Exploration sessions
//!
//! Walks the feature map in explore order and, for each feature, navigates
//! to it, catalogues the UI and tries the options without generating
//! anything. Reference material from the knowledge store is handed to the
//! actuator for verification; a verified walkthrough earns the largest
//! confidence gain.

use anyhow::{Context, Result};
use chrono::Utc;
use sdk::actuator::Actuator;
use sdk::knowledge::{KnowledgeFilter, KnowledgeRepository, NewKnowledge};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actuator::{Health, HealthMonitor};
use crate::config::Config;
use crate::features::{Feature, FeatureRepository, FeatureSelector, SelectionMode};

use super::{truncate, AttemptDetail, SessionMode, SessionState, SessionSummary, StopReason};

/// Confidence gained when reference material was verified
pub const VERIFIED_DELTA: f64 = 0.5;
/// Confidence gained for a plain successful walkthrough
pub const SUCCESS_DELTA: f64 = 0.3;
/// Confidence gained when the walkthrough got partway
pub const PARTIAL_DELTA: f64 = 0.1;
/// Confidence gained when the feature could not even be reached
pub const NAVIGATION_FAILURE_DELTA: f64 = 0.05;

const REFERENCE_LIMIT: i64 = 5;
const REFERENCE_CHARS: usize = 3000;
const NAV_REFERENCE_CHARS: usize = 1000;
const VERIFY_REFERENCE_CHARS: usize = 2000;
const UI_MAP_CHARS: usize = 2000;
const FINDING_CHARS: usize = 4000;

/// Tunables for exploration sessions
#[derive(Debug, Clone)]
pub struct ExploreSettings {
    pub max_steps: u32,
    pub pause: Duration,
    pub max_consecutive_failures: u32,
    pub max_restarts: u32,
    pub restart_pause: Duration,

    /// Knowledge source marking reference material
    pub reference_source: String,
}

impl ExploreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.actuator.max_steps,
            pause: Duration::from_secs(config.exploration.pause_secs),
            max_consecutive_failures: config.exploration.max_consecutive_failures,
            max_restarts: config.actuator.max_restarts,
            restart_pause: Duration::from_secs(config.actuator.restart_pause_secs),
            reference_source: config.exploration.reference_source.clone(),
        }
    }
}

/// How exploring one feature went
#[derive(Debug, Clone, PartialEq)]
struct ExploreResult {
    success: bool,
    delta: f64,
    note: String,
}

impl ExploreResult {
    fn failed(delta: f64, note: impl Into<String>) -> Self {
        Self {
            success: false,
            delta,
            note: note.into(),
        }
    }
}

/// Time-boxed exploration loop
pub struct ExploreController {
    actuator: Arc<dyn Actuator>,
    features: Arc<dyn FeatureRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    selector: FeatureSelector,
    settings: ExploreSettings,
}

impl ExploreController {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        features: Arc<dyn FeatureRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
        selector: FeatureSelector,
        settings: ExploreSettings,
    ) -> Self {
        Self {
            actuator,
            features,
            knowledge,
            selector,
            settings,
        }
    }

    /// Explore until the time is up, nothing is left or a breaker trips
    pub async fn run(&self, duration: Duration) -> Result<SessionSummary> {
        let mut map = self.features.load().await.context("Failed to load features")?;
        let mut state = SessionState::new(duration, 0);
        let mut health = HealthMonitor::new(self.settings.max_restarts, self.settings.restart_pause);

        info!(
            "Exploration session started: {} features, {}s",
            map.len(),
            duration.as_secs()
        );

        let stop_reason = loop {
            if !state.time_left() {
                break StopReason::TimeElapsed;
            }
            if health.ensure_connected(self.actuator.as_ref()).await == Health::Unrecoverable {
                break StopReason::ActuatorUnrecoverable;
            }

            let Some(feature) = self
                .selector
                .select(&map, &state.attempted, SelectionMode::Explore)
                .cloned()
            else {
                info!("Every feature is explored to depth");
                break StopReason::Converged;
            };
            state.attempted.insert(feature.key());

            info!(
                "Exploring [{}] {} (confidence {:.2})",
                feature.category, feature.name, feature.confidence
            );
            let result = self.explore_feature(&feature).await;

            let confidence_after = match map.get_mut(&feature.category, &feature.name) {
                Some(entry) => {
                    entry.record_attempt(result.delta, None, None, Utc::now());
                    self.features
                        .save_feature(entry)
                        .await
                        .with_context(|| format!("Failed to save feature {}", entry.name))?;
                    entry.confidence
                }
                None => feature.confidence,
            };

            state.record(AttemptDetail {
                category: feature.category.clone(),
                feature: feature.name.clone(),
                success: result.success,
                confidence_delta: result.delta,
                confidence_after,
                credits: 0,
                suspect: false,
                seconds: 0.0,
                note: result.note,
            });

            if state.consecutive_failures >= self.settings.max_consecutive_failures {
                warn!(
                    "{} consecutive failures, ending exploration",
                    state.consecutive_failures
                );
                break StopReason::ConsecutiveFailures;
            }

            state.pause(self.settings.pause).await;
        };

        let summary = state.finish(SessionMode::Explore, stop_reason, health.restarts());
        info!(
            "Exploration session ended ({}): {} features in {:.0}s, {} restarts",
            summary.stop_reason, summary.count, summary.elapsed_secs, summary.restarts
        );
        Ok(summary)
    }

    /// Reference material about a feature, already trimmed for prompts
    async fn reference_material(&self, feature: &Feature) -> Option<String> {
        let filter =
            KnowledgeFilter::source(self.settings.reference_source.clone()).with_limit(REFERENCE_LIMIT);
        let mut found: Vec<String> = Vec::new();

        for query in [&feature.name, &feature.category] {
            match self.knowledge.search(query, &filter).await {
                Ok(entries) => {
                    for entry in entries {
                        if !found.contains(&entry.content) {
                            found.push(entry.content);
                        }
                    }
                }
                Err(e) => warn!("Reference lookup for {} failed: {}", feature.name, e),
            }
        }

        if found.is_empty() {
            None
        } else {
            Some(truncate(&found.join("\n---\n"), REFERENCE_CHARS))
        }
    }

    async fn explore_feature(&self, feature: &Feature) -> ExploreResult {
        let reference = self.reference_material(feature).await;
        if let Some(material) = &reference {
            debug!("Reference material for {}: {} chars", feature.name, material.len());
        }

        let mut nav = format!(
            "Navigate to the '{}' feature area. It belongs to the '{}' category. \
             Feature description: {}. Find and open this feature's UI.",
            feature.name, feature.category, feature.description
        );
        if let Some(material) = &reference {
            nav.push_str(
                "\n\nReference material about this feature (may be outdated, trust what you see):\n",
            );
            nav.push_str(&truncate(material, NAV_REFERENCE_CHARS));
        }

        let outcome = self.actuator.run_task(&nav, self.settings.max_steps).await;
        if !outcome.success {
            warn!("Could not navigate to {}: {}", feature.name, outcome.error_message());
            return ExploreResult::failed(
                NAVIGATION_FAILURE_DELTA,
                format!("Navigation failed: {}", outcome.error_message()),
            );
        }

        let screenshot = self
            .actuator
            .take_screenshot(&format!("explore_{}", feature.name))
            .await;
        match &screenshot {
            Some(path) => debug!("Screenshot of {}: {}", feature.name, path.display()),
            None => debug!("No screenshot of {}", feature.name),
        }

        let mut findings = Vec::new();
        let scan = self
            .actuator
            .run_task(
                &format!(
                    "Look at the current page. You are exploring the '{}' feature. \
                     Identify every button, dropdown, input field, slider and toggle. \
                     List each one with its label, type and current value.",
                    feature.name
                ),
                self.settings.max_steps,
            )
            .await;
        if scan.disconnected() {
            warn!("Disconnected during UI scan of {}", feature.name);
            return ExploreResult::failed(NAVIGATION_FAILURE_DELTA, "Disconnected during UI scan");
        }
        if scan.success {
            findings.push(format!("UI elements: {}", scan.text()));
            self.remember(
                NewKnowledge::new(
                    "technical",
                    format!("UI: {}", feature.name),
                    truncate(scan.text(), UI_MAP_CHARS),
                    "exploration",
                )
                .with_confidence(0.7)
                .with_tags(["ui_element", feature.category.as_str(), feature.name.as_str()]),
            )
            .await;
        }

        let mut options = format!(
            "You are exploring the '{}' feature. Try the available options one by one: \
             open each dropdown and note the choices, check toggle states, note tooltips \
             and help text. Do NOT submit anything that costs credits. ",
            feature.name
        );
        match &reference {
            Some(material) => {
                options.push_str(
                    "\n\nVerify these claims from the reference material against the live \
                     site. For each, report CONFIRMED, CHANGED or NOT FOUND, and note any \
                     options the material does not mention:\n",
                );
                options.push_str(&truncate(material, VERIFY_REFERENCE_CHARS));
            }
            None => options.push_str("Report what you found about each option."),
        }

        let explored = self.actuator.run_task(&options, self.settings.max_steps).await;
        if explored.disconnected() {
            warn!("Disconnected while exploring options of {}", feature.name);
            if !findings.is_empty() {
                self.remember(
                    NewKnowledge::new(
                        "technical",
                        format!("Feature: {} (partial)", feature.name),
                        truncate(&findings.join("\n"), FINDING_CHARS),
                        "exploration",
                    )
                    .with_tags(["feature_exploration", "partial", feature.name.as_str()]),
                )
                .await;
            }
            return ExploreResult::failed(PARTIAL_DELTA, "Disconnected while exploring options");
        }
        if explored.success {
            findings.push(format!("Options explored: {}", explored.text()));
        }

        if findings.is_empty() {
            return ExploreResult::failed(
                PARTIAL_DELTA,
                format!("Reached the feature but learned nothing: {}", explored.error_message()),
            );
        }

        let mut content = truncate(&findings.join("\n"), FINDING_CHARS);
        if let Some(path) = &screenshot {
            content.push_str(&format!("\nScreenshot: {}", path.display()));
        }
        self.remember(
            NewKnowledge::new(
                "technical",
                format!("Feature: {}", feature.name),
                content,
                "exploration",
            )
            .with_confidence(0.8)
            .with_tags(["feature_exploration", feature.category.as_str(), feature.name.as_str()]),
        )
        .await;

        let delta = match (scan.success, reference.is_some()) {
            (true, true) => VERIFIED_DELTA,
            (true, false) => SUCCESS_DELTA,
            (false, _) => PARTIAL_DELTA,
        };
        ExploreResult {
            success: true,
            delta,
            note: if reference.is_some() {
                "Verified against reference material".to_string()
            } else {
                format!("{} finding(s)", findings.len())
            },
        }
    }

    async fn remember(&self, entry: NewKnowledge) {
        if let Err(e) = self.knowledge.add(entry).await {
            warn!("Failed to store finding: {}", e);
        }
    }
}
