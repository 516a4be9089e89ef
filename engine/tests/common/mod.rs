//! Shared test collaborators
//!
//! Scripted actuator, judge and approval gate, plus helpers that open a
//! throwaway database and a config with every pause set to zero.
#![allow(dead_code)]

use async_trait::async_trait;
use framewright_engine::config::Config;
use framewright_engine::db::Database;
use framewright_engine::features::{Feature, FeatureMap, FeatureRepository};
use sdk::actuator::{Actuator, ActuatorError, ScreenEvent, TaskOutcome};
use sdk::approval::{ApprovalGate, ApprovalRequest};
use sdk::errors::EngineError;
use sdk::judge::{Judge, JudgeContext, JudgeVerdict, Recommendation};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Actuator driven by queued outcomes
pub struct MockActuator {
    tasks: Mutex<VecDeque<TaskOutcome>>,
    default_task: Mutex<TaskOutcome>,
    balances: Mutex<VecDeque<Option<i64>>>,
    last_balance: Mutex<Option<i64>>,
    events: Mutex<VecDeque<ScreenEvent>>,
    default_event: Mutex<ScreenEvent>,
    restarts: Mutex<VecDeque<bool>>,
    connected: AtomicBool,
    restart_calls: AtomicU32,
    instructions: Mutex<Vec<String>>,
    export: Mutex<Option<PathBuf>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            default_task: Mutex::new(TaskOutcome::ok("done")),
            balances: Mutex::new(VecDeque::new()),
            last_balance: Mutex::new(None),
            events: Mutex::new(VecDeque::new()),
            default_event: Mutex::new(ScreenEvent::Completion {
                description: "Render finished".to_string(),
            }),
            restarts: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(true),
            restart_calls: AtomicU32::new(0),
            instructions: Mutex::new(Vec::new()),
            export: Mutex::new(None),
        }
    }

    pub fn push_tasks(&self, outcomes: impl IntoIterator<Item = TaskOutcome>) {
        self.tasks.lock().unwrap().extend(outcomes);
    }

    /// Outcome for every task once the queue is empty
    pub fn set_default_task(&self, outcome: TaskOutcome) {
        *self.default_task.lock().unwrap() = outcome;
    }

    /// Queued readings; the last one repeats once the queue is empty
    pub fn push_balances(&self, readings: impl IntoIterator<Item = Option<i64>>) {
        self.balances.lock().unwrap().extend(readings);
    }

    pub fn push_events(&self, events: impl IntoIterator<Item = ScreenEvent>) {
        self.events.lock().unwrap().extend(events);
    }

    pub fn push_restarts(&self, results: impl IntoIterator<Item = bool>) {
        self.restarts.lock().unwrap().extend(results);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_export(&self, path: Option<PathBuf>) {
        *self.export.lock().unwrap() = path;
    }

    pub fn restart_calls(&self) -> u32 {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn run_task(&self, instruction: &str, _max_steps: u32) -> TaskOutcome {
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());
        let queued = self.tasks.lock().unwrap().pop_front();
        let outcome = queued.unwrap_or_else(|| self.default_task.lock().unwrap().clone());
        if outcome.disconnected() {
            self.set_connected(false);
        }
        outcome
    }

    async fn take_screenshot(&self, name: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/tmp/{}.png", name)))
    }

    async fn credit_balance(&self) -> Option<i64> {
        let next = self.balances.lock().unwrap().pop_front();
        let mut last = self.last_balance.lock().unwrap();
        if let Some(reading) = next {
            *last = reading;
        }
        *last
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn restart(&self) -> bool {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.restarts.lock().unwrap().pop_front().unwrap_or(true);
        self.set_connected(ok);
        ok
    }

    async fn observe(&self) -> ScreenEvent {
        let queued = self.events.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.default_event.lock().unwrap().clone())
    }

    async fn export_artifact(&self, filename: &str) -> Option<PathBuf> {
        let dir = self.export.lock().unwrap().clone()?;
        let path = dir.join(filename);
        std::fs::write(&path, filename.as_bytes()).ok()?;
        Some(path)
    }
}

pub fn failed(message: &str) -> TaskOutcome {
    TaskOutcome::failed(ActuatorError::transient(message))
}

pub fn disconnected() -> TaskOutcome {
    TaskOutcome::failed(ActuatorError::disconnected("browser closed"))
}

/// Judge answering from a queue of scores
pub struct MockJudge {
    verdicts: Mutex<VecDeque<Result<JudgeVerdict, String>>>,
    calls: Mutex<Vec<JudgeContext>>,
}

impl MockJudge {
    pub fn new() -> Self {
        Self {
            verdicts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one verdict per overall score
    pub fn with_scores(scores: &[f64]) -> Self {
        let judge = Self::new();
        for score in scores {
            judge.push(Ok(verdict(*score)));
        }
        judge
    }

    pub fn push(&self, verdict: Result<JudgeVerdict, String>) {
        self.verdicts.lock().unwrap().push_back(verdict);
    }

    pub fn calls(&self) -> Vec<JudgeContext> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Judge for MockJudge {
    async fn score(
        &self,
        artifact: &Path,
        _reference_script: &str,
        context: &JudgeContext,
    ) -> Result<JudgeVerdict, EngineError> {
        assert!(artifact.exists(), "judge got a missing artifact");
        self.calls.lock().unwrap().push(context.clone());
        let next = self.verdicts.lock().unwrap().pop_front();
        match next {
            Some(Ok(verdict)) => Ok(verdict),
            Some(Err(message)) => Err(EngineError::Judge(message)),
            None => Err(EngineError::Judge("no verdict scripted".to_string())),
        }
    }
}

/// Verdict whose weighted overall equals `score`
pub fn verdict(score: f64) -> JudgeVerdict {
    JudgeVerdict {
        visual_quality: score,
        motion: score,
        consistency: score,
        audio_sync: score,
        script_adherence: score,
        issues: vec![format!("Scored {}", score)],
        recommendation: if score >= 7.0 {
            Recommendation::Approve
        } else {
            Recommendation::Regenerate
        },
        regeneration_notes: format!("Make it better than {}", score),
        checklist: Vec::new(),
    }
}

/// Approval gate that records requests
pub struct RecordingGate {
    pub answer: Option<String>,
    pub requests: Mutex<Vec<ApprovalRequest>>,
}

impl RecordingGate {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ApprovalGate for RecordingGate {
    async fn submit(&self, request: &ApprovalRequest) -> Result<Option<String>, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.answer.clone())
    }
}

/// Config rooted in `temp` with no pauses
pub fn test_config(temp: &TempDir) -> Config {
    let root = temp.path();
    let toml = format!(
        r#"
[core]
data_dir = {data:?}
kill_switch_file = {stop:?}

[actuator]
restart_pause_secs = 0
credit_read_retries = 1

[exploration]
pause_secs = 0

[hands_on]
pause_secs = 0
per_action_cap = 40
safety_floor = 50
credit_plausibility_ceiling = 200

[production]
portfolio_dir = {portfolio:?}
render_poll_limit = 3
render_poll_interval_secs = 0
"#,
        data = root.join("data").display().to_string(),
        stop = root.join("STOP").display().to_string(),
        portfolio = root.join("portfolio").display().to_string(),
    );
    Config::from_toml_str(&toml).unwrap()
}

pub async fn open_db(config: &Config) -> Database {
    Database::new(&config.database_path()).await.unwrap()
}

pub async fn seed(features: &dyn FeatureRepository, list: Vec<Feature>) {
    let mut map = FeatureMap::new();
    for feature in list {
        map.insert(feature);
    }
    features.seed(&map).await.unwrap();
}

/// Directory the mock actuator exports artifacts into
pub fn export_dir(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("exports");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
