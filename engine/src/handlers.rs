//! Command handlers for CLI operations
//!
//! Each handler opens the database, builds the agent and prints its result
//! as text or JSON. The automation bridge is only spawned by commands that
//! drive the actuator.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agent::{Agent, AgentDeps, AutoOutcome};
use crate::bridge::{Bridge, BridgeActuator, BridgeJudge};
use crate::config::Config;
use crate::db::Database;
use crate::features::{CostEntry, Curriculum, LearningProgress};
use crate::production::{JobStatus, NewJob, ProductionJob, ProductionOutcome, QueueStats};
use crate::session::SessionSummary;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a command needs
struct Runtime {
    agent: Agent,
    database: Database,
    bridge: Arc<Bridge>,
}

impl Runtime {
    async fn open(config: &Config) -> Result<Self> {
        let database = Database::new(&config.database_path())
            .await
            .context("Failed to open database")?;
        let bridge = Arc::new(Bridge::from_config(&config.actuator));

        let deps = AgentDeps {
            actuator: Arc::new(BridgeActuator::new(bridge.clone())),
            judge: Arc::new(BridgeJudge::new(bridge.clone())),
            features: Arc::new(database.features()),
            knowledge: Arc::new(database.knowledge()),
            jobs: Arc::new(database.jobs()),
            approvals: Some(Arc::new(database.approvals())),
        };

        Ok(Self {
            agent: Agent::new(config.clone(), deps),
            database,
            bridge,
        })
    }

    /// Spawn the bridge for commands that drive the actuator
    async fn start_bridge(&self) -> Result<()> {
        self.bridge
            .start()
            .await
            .context("Failed to start the automation bridge")
    }

    async fn close(self) -> Result<()> {
        self.bridge.shutdown().await;
        self.database.close().await
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn minutes(requested: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(requested.unwrap_or(default) * 60)
}

fn print_summary(summary: &SessionSummary) {
    println!("{} session finished: {}", summary.mode, summary.stop_reason);
    println!("  Features attempted: {}", summary.count);
    println!("  Credits spent:      {}", summary.spend);
    if summary.suspect_spend > 0 {
        println!(
            "  Suspect readings:   {} credits (excluded from spend)",
            summary.suspect_spend
        );
    }
    println!("  Restarts:           {}", summary.restarts);
    println!("  Elapsed:            {:.0}s", summary.elapsed_secs);

    if !summary.details.is_empty() {
        println!();
        for detail in &summary.details {
            let mark = if detail.success { "+" } else { "-" };
            let suspect = if detail.suspect { " (suspect)" } else { "" };
            println!(
                "  {} {}/{}: +{:.2} -> {:.2}, {} credits{}",
                mark,
                detail.category,
                detail.feature,
                detail.confidence_delta,
                detail.confidence_after,
                detail.credits,
                suspect
            );
        }
    }
}

fn print_progress(progress: &LearningProgress) {
    let total = &progress.total;
    println!(
        "Learning progress: {}/{} explored ({:.0}%), {} proficient, {} mastered",
        total.explored,
        total.total,
        total.percent_explored(),
        total.proficient,
        total.mastered
    );
    for (category, stats) in &progress.categories {
        println!(
            "  {:<20} {:>3}/{:<3} explored, {} proficient, {} mastered",
            category, stats.explored, stats.total, stats.proficient, stats.mastered
        );
    }
}

fn print_queue(stats: &QueueStats) {
    println!("Job queue:");
    for (status, count) in &stats.by_status {
        println!("  {:<10} {}", status, count);
    }
    println!("  Credits used: {}", stats.total_credits_used);
}

fn print_job(job: &ProductionJob) {
    println!("Job #{}: {} [{}]", job.id, job.title, job.status);
    println!("  Model:       {} ({}s)", job.model, job.duration_seconds);
    println!("  Estimate:    {} credits", job.cost_estimate);
    println!("  Credits:     {}", job.credits_used);
    println!("  Attempts:    {}", job.render_attempts);
    if let (Some(score), Some(attempt)) = (&job.best_score, job.best_attempt) {
        println!(
            "  Best score:  {:.1} from attempt {} ({})",
            score.overall, attempt, score.recommendation
        );
    }
    if let Some(path) = &job.video_path {
        println!("  Video:       {}", path.display());
    }
    if let Some(approval) = &job.approval_id {
        println!("  Approval:    {}", approval);
    }
    if let Some(reason) = &job.failure_reason {
        println!("  Reason:      {}", reason);
    }
    for attempt in &job.attempts {
        let result = match (&attempt.score, &attempt.error) {
            (Some(score), _) => format!("scored {:.1}", score.overall),
            (None, Some(error)) => error.clone(),
            (None, None) => "no result".to_string(),
        };
        let suspect = if attempt.suspect_reading {
            ", suspect reading"
        } else {
            ""
        };
        println!(
            "    #{}: {} ({} credits{})",
            attempt.attempt, result, attempt.credits, suspect
        );
    }
}

fn print_outcome(outcome: &ProductionOutcome) {
    println!(
        "Job #{} {} after {} attempt(s)",
        outcome.job_id, outcome.status, outcome.attempts
    );
    if let (Some(score), Some(attempt)) = (outcome.best_score, outcome.best_attempt) {
        println!("  Best score: {:.1} (attempt {})", score, attempt);
    }
    println!("  Credits used: {}", outcome.credits_used);
    if let Some(path) = &outcome.video_path {
        println!("  Video: {}", path.display());
    }
    if let Some(path) = &outcome.portfolio_path {
        println!("  Portfolio: {}", path.display());
    }
    if let Some(reason) = &outcome.reason {
        println!("  Reason: {}", reason);
    }
}

/// Run an exploration session
pub async fn handle_explore(
    requested_minutes: Option<u64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    runtime.start_bridge().await?;

    let duration = minutes(requested_minutes, config.exploration.default_minutes);
    info!("Exploring for {} minutes", duration.as_secs() / 60);
    let result = runtime.agent.explore(duration).await;
    runtime.close().await?;
    let summary = result?;

    match format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => print_json(&summary)?,
    }
    Ok(())
}

/// Run a hands-on session
pub async fn handle_hands_on(
    requested_minutes: Option<u64>,
    budget: Option<i64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    runtime.start_bridge().await?;

    let duration = minutes(requested_minutes, config.hands_on.default_minutes);
    let budget = budget.unwrap_or(config.hands_on.default_budget);
    let result = runtime.agent.hands_on(duration, budget).await;
    runtime.close().await?;
    let summary = result?;

    match format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => print_json(&summary)?,
    }
    Ok(())
}

/// Explore or practise, whichever is needed
pub async fn handle_auto(
    requested_minutes: Option<u64>,
    budget: Option<i64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    runtime.start_bridge().await?;

    let duration = minutes(requested_minutes, config.exploration.default_minutes);
    let budget = budget.unwrap_or(config.hands_on.default_budget);
    let result = runtime.agent.auto_session(duration, budget).await;
    runtime.close().await?;
    let outcome = result?;

    match format {
        OutputFormat::Text => match &outcome {
            AutoOutcome::Explored { summary } | AutoOutcome::HandsOn { summary } => {
                print_summary(summary)
            }
            AutoOutcome::Ready { progress } => {
                println!("Nothing left to learn; ready for production.");
                print_progress(progress);
            }
        },
        OutputFormat::Json => print_json(&outcome)?,
    }
    Ok(())
}

/// Show progress, queue and kill switch state
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let progress = runtime.agent.progress().await?;
    let queue = runtime.agent.queue_stats().await?;
    let kill_switch = config.kill_switch_engaged();
    runtime.close().await?;

    match format {
        OutputFormat::Text => {
            print_progress(&progress);
            println!();
            print_queue(&queue);
            println!();
            println!(
                "Kill switch: {} ({})",
                if kill_switch { "ENGAGED" } else { "off" },
                config.core.kill_switch_file.display()
            );
            println!("Bridge: {}", config.actuator.bridge_command);
        }
        OutputFormat::Json => print_json(&json!({
            "progress": progress,
            "queue": queue,
            "kill_switch": kill_switch,
            "bridge_command": config.actuator.bridge_command,
        }))?,
    }
    Ok(())
}

pub async fn handle_progress(config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let progress = runtime.agent.progress().await?;
    runtime.close().await?;

    match format {
        OutputFormat::Text => print_progress(&progress),
        OutputFormat::Json => print_json(&progress)?,
    }
    Ok(())
}

pub async fn handle_costs(config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let sheet: Vec<CostEntry> = runtime.agent.cost_sheet().await?;
    runtime.close().await?;

    match format {
        OutputFormat::Text => {
            if sheet.is_empty() {
                println!("No cost data yet. Run a hands-on session first.");
                return Ok(());
            }
            println!(
                "{:<20} {:<24} {:>10} {:>10} {:>8}",
                "Category", "Feature", "Credits", "Seconds", "Samples"
            );
            for entry in &sheet {
                println!(
                    "{:<20} {:<24} {:>10.1} {:>10.1} {:>8}",
                    entry.category,
                    entry.feature,
                    entry.avg_credit_cost,
                    entry.avg_generation_time,
                    entry.samples
                );
            }
        }
        OutputFormat::Json => print_json(&sheet)?,
    }
    Ok(())
}

/// Seed features from a curriculum file or the configured one
pub async fn handle_seed(
    curriculum_path: Option<&Path>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let curriculum = Curriculum::load_or_builtin(curriculum_path.unwrap_or(&config.curriculum.path))?;
    let runtime = Runtime::open(config).await?;
    let added = runtime.agent.seed(&curriculum).await?;
    let progress = runtime.agent.progress().await?;
    runtime.close().await?;

    match format {
        OutputFormat::Text => {
            println!(
                "Added {} new feature(s); {} known in total.",
                added, progress.total.total
            );
        }
        OutputFormat::Json => print_json(&json!({
            "added": added,
            "total": progress.total.total,
        }))?,
    }
    Ok(())
}

pub async fn handle_feature_reset(
    category: &str,
    name: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let result = runtime.agent.reset_feature(category, name).await;
    runtime.close().await?;
    result?;

    match format {
        OutputFormat::Text => println!("Reset confidence of '{}/{}' to 0.", category, name),
        OutputFormat::Json => print_json(&json!({ "category": category, "reset": name }))?,
    }
    Ok(())
}

/// Submit, plan and queue a job
pub async fn handle_job_submit(new_job: NewJob, config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let result = runtime.agent.submit_job(&new_job).await;
    runtime.close().await?;
    let job = result?;

    match format {
        OutputFormat::Text => {
            print_job(&job);
            if job.status == JobStatus::Planned {
                println!();
                println!(
                    "Waiting for approval. Run 'framewright job approve {}' to proceed.",
                    job.id
                );
            }
        }
        OutputFormat::Json => print_json(&job)?,
    }
    Ok(())
}

/// Record an approver's decision on the queue and the job
pub async fn handle_job_decision(
    job_id: i64,
    approved: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let result = async {
        let job = runtime.agent.job(job_id).await?;
        if let Some(approval_id) = &job.approval_id {
            runtime.database.approvals().decide(approval_id, approved).await?;
        }
        runtime.agent.record_decision(job_id, approved).await
    }
    .await;
    runtime.close().await?;
    let job = result?;

    match format {
        OutputFormat::Text => print_job(&job),
        OutputFormat::Json => print_json(&job)?,
    }
    Ok(())
}

/// Render an approved job
pub async fn handle_job_produce(job_id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    runtime.start_bridge().await?;
    let result = runtime.agent.produce(job_id).await;
    runtime.close().await?;
    let outcome = result?;

    match format {
        OutputFormat::Text => print_outcome(&outcome),
        OutputFormat::Json => print_json(&outcome)?,
    }
    Ok(())
}

pub async fn handle_job_show(job_id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let result = runtime.agent.job(job_id).await;
    runtime.close().await?;
    let job = result?;

    match format {
        OutputFormat::Text => print_job(&job),
        OutputFormat::Json => print_json(&job)?,
    }
    Ok(())
}

/// List approval requests waiting for a decision
pub async fn handle_pending(config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let pending = runtime.database.approvals().pending().await;
    runtime.close().await?;
    let pending = pending?;

    match format {
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("No approvals pending");
                return Ok(());
            }
            for record in &pending {
                let created = chrono::DateTime::from_timestamp(record.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!(
                    "Job #{}: {} ({}, {}s, ~{} credits) requested {}",
                    record.job_id,
                    record.request.title,
                    record.request.model,
                    record.request.duration_seconds,
                    record.request.estimated_credits,
                    created
                );
            }
        }
        OutputFormat::Json => print_json(&pending)?,
    }
    Ok(())
}

/// Show the queue overview, or list jobs with one status
pub async fn handle_queue(status: Option<&str>, config: &Config, format: OutputFormat) -> Result<()> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    let runtime = Runtime::open(config).await?;
    let stats = runtime.agent.queue_stats().await;
    let jobs = runtime.agent.jobs(status).await;
    runtime.close().await?;
    let (stats, jobs) = (stats?, jobs?);

    match format {
        OutputFormat::Text => {
            print_queue(&stats);
            if !jobs.is_empty() {
                println!();
                for job in &jobs {
                    println!(
                        "  #{:<5} {:<10} {:<30} {} credits",
                        job.id, job.status, job.title, job.credits_used
                    );
                }
            }
        }
        OutputFormat::Json => print_json(&json!({
            "stats": stats,
            "jobs": jobs,
        }))?,
    }
    Ok(())
}
