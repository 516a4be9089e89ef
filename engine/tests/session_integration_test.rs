mod common;

use chrono::Utc;
use common::*;
use framewright_engine::db::Database;
use framewright_engine::features::{Feature, FeatureRepository, FeatureSelector};
use framewright_engine::session::{
    ExploreController, ExploreSettings, HandsOnController, HandsOnSettings, StopReason,
};
use sdk::actuator::Actuator;
use sdk::knowledge::{KnowledgeFilter, KnowledgeRepository, NewKnowledge};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const LONG: Duration = Duration::from_secs(600);

struct Fixture {
    _temp: TempDir,
    config: framewright_engine::config::Config,
    db: Database,
    actuator: Arc<MockActuator>,
}

impl Fixture {
    async fn new(features: Vec<Feature>) -> Self {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let db = open_db(&config).await;
        seed(&db.features(), features).await;
        Self {
            _temp: temp,
            config,
            db,
            actuator: Arc::new(MockActuator::new()),
        }
    }

    fn explore(&self) -> ExploreController {
        ExploreController::new(
            self.actuator.clone() as Arc<dyn Actuator>,
            Arc::new(self.db.features()),
            Arc::new(self.db.knowledge()),
            FeatureSelector::default(),
            ExploreSettings::from_config(&self.config),
        )
    }

    fn hands_on(&self) -> HandsOnController {
        HandsOnController::new(
            self.actuator.clone() as Arc<dyn Actuator>,
            Arc::new(self.db.features()),
            Arc::new(self.db.knowledge()),
            FeatureSelector::default(),
            HandsOnSettings::from_config(&self.config),
        )
    }

    async fn confidence(&self, name: &str) -> f64 {
        let map = self.db.features().load().await.unwrap();
        map.find(name).unwrap().confidence
    }
}

fn generative(name: &str, confidence: f64) -> Feature {
    Feature::new("editing", name, format!("{} tool", name), 1)
        .generative(true)
        .with_confidence(confidence)
}

/// Generative feature that has already been measured at `cost` credits
fn priced(name: &str, cost: i64) -> Feature {
    let mut feature = generative(name, 0.4);
    feature.record_attempt(0.0, Some(cost), Some(10.0), Utc::now());
    feature
}

fn generated(fx: &Fixture, name: &str) -> bool {
    fx.actuator
        .instructions()
        .iter()
        .any(|i| i.contains(&format!("Use the '{}' feature", name)))
}

// --- exploration ---

#[tokio::test]
async fn test_explore_unexplored_before_partial() {
    let fx = Fixture::new(vec![
        Feature::new("editing", "scene_split", "Split scenes", 1).with_confidence(0.3),
        Feature::new("editing", "prompt_box", "Prompt input", 1),
    ])
    .await;

    let summary = fx.explore().run(LONG).await.unwrap();

    assert_eq!(summary.details[0].feature, "prompt_box");
    assert_eq!(summary.details[1].feature, "scene_split");
    assert_eq!(summary.stop_reason, StopReason::Converged);
    assert_eq!(summary.spend, 0);
}

#[tokio::test]
async fn test_explore_full_success_without_reference() {
    let fx = Fixture::new(vec![Feature::new("editing", "timeline", "Timeline", 1)]).await;

    let summary = fx.explore().run(LONG).await.unwrap();

    assert_eq!(summary.count, 1);
    assert!(summary.details[0].success);
    assert!((summary.details[0].confidence_delta - 0.3).abs() < 1e-9);
    assert!((fx.confidence("timeline").await - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_explore_verifies_reference_material() {
    let fx = Fixture::new(vec![Feature::new("editing", "timeline", "Timeline", 1)]).await;
    fx.db
        .knowledge()
        .add(NewKnowledge::new(
            "tutorial",
            "Using the timeline",
            "The timeline has a razor tool and snapping toggle",
            "tutorial_videos",
        ))
        .await
        .unwrap();

    let summary = fx.explore().run(LONG).await.unwrap();

    assert!((summary.details[0].confidence_delta - 0.5).abs() < 1e-9);
    let instructions = fx.actuator.instructions();
    assert!(instructions[0].contains("razor tool"));
    assert!(instructions.iter().any(|i| i.contains("CONFIRMED")));
}

#[tokio::test]
async fn test_explore_stores_findings() {
    let fx = Fixture::new(vec![Feature::new("editing", "timeline", "Timeline", 1)]).await;

    fx.explore().run(LONG).await.unwrap();

    let found = fx
        .db
        .knowledge()
        .search("timeline", &KnowledgeFilter::source("exploration"))
        .await
        .unwrap();
    let feature = found
        .iter()
        .find(|e| e.topic == "Feature: timeline")
        .unwrap();
    assert!(feature.content.contains("Screenshot: /tmp/explore_timeline.png"));
    assert!(found.iter().any(|e| e.topic == "UI: timeline"));
}

#[tokio::test]
async fn test_explore_stops_after_three_failures() {
    let fx = Fixture::new(
        (0..5)
            .map(|i| Feature::new("editing", format!("f{}", i), "x", 1))
            .collect(),
    )
    .await;
    fx.actuator.set_default_task(failed("element not found"));

    let summary = fx.explore().run(LONG).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::ConsecutiveFailures);
    assert_eq!(summary.count, 3);
    assert!(summary.details.iter().all(|d| !d.success));
    // a failed navigation still counts as a sliver of progress
    assert!((fx.confidence("f0").await - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_explore_zero_duration() {
    let fx = Fixture::new(vec![Feature::new("editing", "timeline", "Timeline", 1)]).await;

    let summary = fx.explore().run(Duration::ZERO).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::TimeElapsed);
    assert_eq!(summary.count, 0);
    assert!(fx.actuator.instructions().is_empty());
}

#[tokio::test]
async fn test_explore_reconnects_after_disconnect() {
    let fx = Fixture::new(vec![
        Feature::new("editing", "a", "x", 1),
        Feature::new("editing", "b", "x", 2),
    ])
    .await;
    fx.actuator.push_tasks([disconnected()]);

    let summary = fx.explore().run(LONG).await.unwrap();

    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.count, 2);
    assert!(!summary.details[0].success);
    assert!(summary.details[1].success);
}

#[tokio::test]
async fn test_explore_actuator_unrecoverable() {
    let fx = Fixture::new(vec![Feature::new("editing", "timeline", "Timeline", 1)]).await;
    fx.actuator.set_connected(false);
    fx.actuator.push_restarts([false, false, false]);

    let summary = fx.explore().run(LONG).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::ActuatorUnrecoverable);
    assert_eq!(fx.actuator.restart_calls(), 3);
    assert_eq!(summary.count, 0);
}

// --- hands-on ---

#[tokio::test]
async fn test_hands_on_suspect_reading_excluded() {
    let fx = Fixture::new(vec![generative("render", 0.4), generative("upscale", 0.35)]).await;
    // before 1000, after 0 and its re-read 0; then a normal 500 -> 480
    fx.actuator
        .push_balances([Some(1000), Some(0), Some(0), Some(500), Some(480)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    let first = &summary.details[0];
    assert_eq!(first.feature, "render");
    assert!(first.suspect);
    assert_eq!(first.credits, 200);
    assert_eq!(summary.suspect_spend, 200);
    assert_eq!(summary.spend, 20);
    assert_eq!(summary.count, 2);
    assert_eq!(summary.stop_reason, StopReason::Converged);

    let map = fx.db.features().load().await.unwrap();
    assert!(map.find("render").unwrap().cost_history.is_empty());
    assert_eq!(
        map.find("upscale").unwrap().cost_history.iter().copied().collect::<Vec<_>>(),
        vec![20]
    );
}

#[tokio::test]
async fn test_hands_on_success_with_quality_note() {
    let fx = Fixture::new(vec![generative("render", 0.4)]).await;
    fx.actuator.push_balances([Some(500), Some(470)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    let detail = &summary.details[0];
    assert!(detail.success);
    assert!((detail.confidence_delta - 0.3).abs() < 1e-9);
    assert_eq!(detail.credits, 30);
    assert!((fx.confidence("render").await - 0.7).abs() < 1e-9);

    let notes = fx
        .db
        .knowledge()
        .search("render", &KnowledgeFilter::source("hands_on"))
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].content.contains("credits: 30"));
}

#[tokio::test]
async fn test_hands_on_overspend_trips() {
    let fx = Fixture::new(vec![generative("render", 0.4), generative("upscale", 0.4)]).await;
    fx.actuator.push_balances([Some(1000), Some(950)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Overspend);
    assert_eq!(summary.count, 1);
    assert_eq!(summary.spend, 50);
}

#[tokio::test]
async fn test_hands_on_safety_floor_trips() {
    let fx = Fixture::new(vec![generative("render", 0.4), generative("upscale", 0.4)]).await;
    fx.actuator.push_balances([Some(80), Some(45)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::SafetyFloor);
    assert_eq!(summary.count, 1);
}

#[tokio::test]
async fn test_hands_on_budget_exhausted_within_allotments() {
    let fx = Fixture::new(vec![
        generative("a", 0.4),
        generative("b", 0.4),
        generative("c", 0.4),
    ])
    .await;
    fx.actuator
        .push_balances([Some(1000), Some(970), Some(970), Some(950)]);

    let summary = fx.hands_on().run(LONG, 50).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.spend, 50);
    assert_eq!(summary.count, 2);
    assert!(summary.spend <= 50);
}

#[tokio::test]
async fn test_hands_on_skips_non_generative() {
    let fx = Fixture::new(vec![
        Feature::new("editing", "timeline", "Timeline", 1).with_confidence(0.4),
        generative("render", 0.4),
    ])
    .await;
    fx.actuator.push_balances([Some(500), Some(490)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.count, 1);
    assert_eq!(summary.details[0].feature, "render");
}

#[tokio::test]
async fn test_hands_on_three_failures() {
    let fx = Fixture::new(
        (0..5)
            .map(|i| generative(&format!("g{}", i), 0.4))
            .collect(),
    )
    .await;
    fx.actuator.set_default_task(failed("button missing"));

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::ConsecutiveFailures);
    assert_eq!(summary.count, 3);
    assert_eq!(summary.spend, 0);
}

#[tokio::test]
async fn test_hands_on_unmeasured_balance_not_counted() {
    let fx = Fixture::new(vec![generative("render", 0.4)]).await;

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.spend, 0);
    assert_eq!(summary.details[0].credits, 0);
    assert!(!summary.details[0].suspect);
    let map = fx.db.features().load().await.unwrap();
    assert!(map.find("render").unwrap().cost_history.is_empty());
}

#[tokio::test]
async fn test_hands_on_actuator_unrecoverable() {
    let fx = Fixture::new(vec![generative("render", 0.4)]).await;
    fx.actuator.set_connected(false);
    fx.actuator.push_restarts([false, false, false]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::ActuatorUnrecoverable);
    assert_eq!(summary.count, 0);
}

#[tokio::test]
async fn test_hands_on_balance_below_floor_generates_nothing() {
    let fx = Fixture::new(vec![generative("render", 0.4)]).await;
    fx.actuator.push_balances([Some(40), Some(30)]);

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::SafetyFloor);
    assert!(!generated(&fx, "render"));
    assert_eq!(summary.spend, 0);
    assert_eq!(summary.count, 0);
    assert!((fx.confidence("render").await - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_hands_on_skips_features_that_would_overshoot_budget() {
    let features = vec![priced("trim", 30), priced("upscale", 35), priced("denoise", 15)];
    let fx = Fixture::new(features.clone()).await;
    for feature in &features {
        fx.db.features().save_feature(feature).await.unwrap();
    }
    // trim 1000 -> 970, then denoise 970 -> 955
    fx.actuator
        .push_balances([Some(1000), Some(970), Some(970), Some(955)]);

    let summary = fx.hands_on().run(LONG, 50).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.spend, 45);
    assert!(summary.spend <= 50);
    let practised: Vec<&str> = summary.details.iter().map(|d| d.feature.as_str()).collect();
    assert_eq!(practised, vec!["trim", "denoise"]);
    assert!(!generated(&fx, "upscale"));
}

#[tokio::test]
async fn test_hands_on_same_name_in_two_categories() {
    let fx = Fixture::new(vec![
        Feature::new("audio", "settings", "Audio settings", 1)
            .generative(true)
            .with_confidence(0.4),
        Feature::new("video", "settings", "Video settings", 1)
            .generative(true)
            .with_confidence(0.4),
    ])
    .await;

    let summary = fx.hands_on().run(LONG, 100).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Converged);
    let practised: Vec<(&str, &str)> = summary
        .details
        .iter()
        .map(|d| (d.category.as_str(), d.feature.as_str()))
        .collect();
    assert_eq!(practised, vec![("audio", "settings"), ("video", "settings")]);
}
