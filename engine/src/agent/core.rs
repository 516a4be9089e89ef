//! Agent Core
//!
//! The agent owns one actuator and wires every controller to it. All
//! collaborators are injected through [`AgentDeps`]; nothing is built lazily.
//!
//! # Guards
//!
//! Anything that drives the actuator (exploration, hands-on practice,
//! production) first checks the kill switch file and then takes the session
//! guard. The guard is never awaited: a second caller gets
//! [`EngineError::SessionActive`] immediately.

use anyhow::{Context, Result};
use sdk::actuator::Actuator;
use sdk::approval::ApprovalGate;
use sdk::errors::EngineError;
use sdk::judge::Judge;
use sdk::knowledge::KnowledgeRepository;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::Config;
use crate::features::{
    CostEntry, Curriculum, FeatureRepository, FeatureSelector, LearningProgress, SelectionMode,
};
use crate::production::{
    JobRepository, JobStatus, NewJob, ProductionController, ProductionDeps, ProductionJob,
    ProductionOutcome, QueueStats,
};
use crate::session::{
    ExploreController, ExploreSettings, HandsOnController, HandsOnSettings, SessionSummary,
};

/// Collaborators injected into the agent
#[derive(Clone)]
pub struct AgentDeps {
    pub actuator: Arc<dyn Actuator>,
    pub judge: Arc<dyn Judge>,
    pub features: Arc<dyn FeatureRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub approvals: Option<Arc<dyn ApprovalGate>>,
}

/// What an automatic session decided to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AutoOutcome {
    /// Unexplored features remained, so the agent explored
    Explored { summary: SessionSummary },

    /// Everything was explored but generative features were not yet proficient
    HandsOn { summary: SessionSummary },

    /// Nothing left to learn; ready for production
    Ready { progress: LearningProgress },
}

/// Agent wiring every controller to one actuator
pub struct Agent {
    config: Config,
    features: Arc<dyn FeatureRepository>,
    jobs: Arc<dyn JobRepository>,
    selector: FeatureSelector,
    explore: ExploreController,
    hands_on: HandsOnController,
    production: ProductionController,
    session_guard: Mutex<()>,
}

impl Agent {
    pub fn new(config: Config, deps: AgentDeps) -> Self {
        let selector = FeatureSelector::new(
            config.exploration.job_relevant.clone(),
            config.hands_on.generative_categories.clone(),
        );

        let explore = ExploreController::new(
            deps.actuator.clone(),
            deps.features.clone(),
            deps.knowledge.clone(),
            selector.clone(),
            ExploreSettings::from_config(&config),
        );
        let hands_on = HandsOnController::new(
            deps.actuator.clone(),
            deps.features.clone(),
            deps.knowledge.clone(),
            selector.clone(),
            HandsOnSettings::from_config(&config),
        );
        let production = ProductionController::new(
            ProductionDeps {
                jobs: deps.jobs.clone(),
                knowledge: deps.knowledge,
                approvals: deps.approvals,
                actuator: deps.actuator,
                judge: deps.judge,
            },
            &config,
        );

        Self {
            features: deps.features,
            jobs: deps.jobs,
            selector,
            explore,
            hands_on,
            production,
            session_guard: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Refuse to start while the kill switch is engaged or another session
    /// holds the actuator
    fn acquire(&self) -> Result<MutexGuard<'_, ()>, EngineError> {
        if self.config.kill_switch_engaged() {
            warn!(
                "Kill switch engaged at {}",
                self.config.core.kill_switch_file.display()
            );
            return Err(EngineError::KillSwitchActive(
                self.config.core.kill_switch_file.display().to_string(),
            ));
        }
        self.session_guard
            .try_lock()
            .map_err(|_| EngineError::SessionActive)
    }

    /// Run a time-boxed exploration session
    pub async fn explore(&self, duration: Duration) -> Result<SessionSummary> {
        let _guard = self.acquire()?;
        self.explore.run(duration).await
    }

    /// Run a time- and credit-boxed hands-on session
    pub async fn hands_on(&self, duration: Duration, budget: i64) -> Result<SessionSummary> {
        let _guard = self.acquire()?;
        self.hands_on.run(duration, budget).await
    }

    /// Explore while anything is unexplored, then practise generative
    /// features that are not yet proficient
    pub async fn auto_session(&self, duration: Duration, budget: i64) -> Result<AutoOutcome> {
        let _guard = self.acquire()?;
        let map = self.features.load().await.context("Failed to load features")?;

        if map.iter().any(|f| f.confidence == 0.0) {
            info!("Auto session: unexplored features remain, exploring");
            let summary = self.explore.run(duration).await?;
            return Ok(AutoOutcome::Explored { summary });
        }

        if self
            .selector
            .select(&map, &HashSet::new(), SelectionMode::HandsOn)
            .is_some()
        {
            info!("Auto session: practising generative features");
            let summary = self.hands_on.run(duration, budget).await?;
            return Ok(AutoOutcome::HandsOn { summary });
        }

        info!("Auto session: nothing left to learn");
        Ok(AutoOutcome::Ready {
            progress: map.progress(),
        })
    }

    /// Store, plan and submit a job for approval
    pub async fn submit_job(&self, new_job: &NewJob) -> Result<ProductionJob> {
        let job = self.production.submit(new_job).await?;
        self.production.plan(job.id).await?;
        self.production.request_approval(job.id).await
    }

    pub async fn record_decision(&self, job_id: i64, approved: bool) -> Result<ProductionJob> {
        self.production.record_decision(job_id, approved).await
    }

    /// Render an approved (or interrupted) job
    pub async fn produce(&self, job_id: i64) -> Result<ProductionOutcome> {
        let _guard = self.acquire()?;
        self.production.produce(job_id).await
    }

    pub async fn job(&self, job_id: i64) -> Result<ProductionJob> {
        self.production.job(job_id).await
    }

    pub async fn jobs(&self, status: Option<JobStatus>) -> Result<Vec<ProductionJob>> {
        self.jobs.list(status).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.jobs.queue_stats().await
    }

    pub async fn progress(&self) -> Result<LearningProgress> {
        Ok(self.features.load().await?.progress())
    }

    pub async fn cost_sheet(&self) -> Result<Vec<CostEntry>> {
        Ok(self.features.load().await?.cost_sheet())
    }

    /// Add curriculum features the repository does not know yet
    pub async fn seed(&self, curriculum: &Curriculum) -> Result<usize> {
        self.features.seed(&curriculum.to_feature_map()).await
    }

    /// Put a feature back to zero confidence so it is explored again
    pub async fn reset_feature(&self, category: &str, name: &str) -> Result<()> {
        let map = self.features.load().await?;
        let mut feature = map
            .get(category, name)
            .cloned()
            .ok_or_else(|| EngineError::FeatureNotFound(format!("{}/{}", category, name)))?;
        feature.reset_confidence();
        self.features.save_feature(&feature).await?;
        info!("Reset confidence of {}/{}", category, name);
        Ok(())
    }
}
