mod common;

use common::*;
use framewright_engine::config::Config;
use framewright_engine::db::Database;
use framewright_engine::production::{
    AttemptRecord, JobRepository, JobStatus, NewJob, ProductionController, ProductionDeps,
    QualityScore,
};
use sdk::approval::ApprovalGate;
use sdk::errors::EngineError;
use sdk::judge::Recommendation;
use sdk::knowledge::{KnowledgeFilter, KnowledgeRepository, NewKnowledge};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    config: Config,
    db: Database,
    actuator: Arc<MockActuator>,
}

impl Fixture {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let db = open_db(&config).await;
        let actuator = Arc::new(MockActuator::new());
        actuator.set_export(Some(export_dir(&temp)));
        Self {
            _temp: temp,
            config,
            db,
            actuator,
        }
    }

    fn controller(
        &self,
        judge: Arc<MockJudge>,
        approvals: Option<Arc<dyn ApprovalGate>>,
    ) -> ProductionController {
        ProductionController::new(
            ProductionDeps {
                jobs: Arc::new(self.db.jobs()),
                knowledge: Arc::new(self.db.knowledge()),
                approvals,
                actuator: self.actuator.clone(),
                judge,
            },
            &self.config,
        )
    }

    /// Balances for `attempts` renders costing `each` credits apiece
    fn script_credits(&self, attempts: i64, each: i64) {
        let mut balance = 1000;
        let mut readings = Vec::new();
        for _ in 0..attempts {
            readings.push(Some(balance));
            balance -= each;
            readings.push(Some(balance));
        }
        self.actuator.push_balances(readings);
    }

    /// Script instructions given to each render attempt, in order
    fn script_steps(&self) -> Vec<String> {
        self.actuator
            .instructions()
            .into_iter()
            .filter(|i| i.starts_with("Enter the following script"))
            .collect()
    }
}

async fn approved_job(controller: &ProductionController) -> i64 {
    let job = controller
        .submit(&NewJob::new("Fox teaser", "A fox runs through snow").with_duration(10))
        .await
        .unwrap();
    controller.plan(job.id).await.unwrap();
    let job = controller.request_approval(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Approved);
    job.id
}

fn engine_error(err: &anyhow::Error) -> &EngineError {
    err.downcast_ref::<EngineError>()
        .expect("expected an EngineError")
}

#[tokio::test]
async fn test_delivers_on_third_attempt() {
    let fx = Fixture::new().await;
    fx.script_credits(3, 40);
    let judge = Arc::new(MockJudge::with_scores(&[5.0, 6.5, 7.2]));
    let controller = fx.controller(judge.clone(), None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.best_attempt, Some(3));
    assert!((outcome.best_score.unwrap() - 7.2).abs() < 1e-9);
    assert_eq!(outcome.credits_used, 120);
    assert!(outcome.portfolio_path.is_none());
    assert!(outcome
        .video_path
        .unwrap()
        .ends_with(format!("job_{}_attempt_3.mp4", id)));

    let job = controller.job(id).await.unwrap();
    assert_eq!(job.attempts.len(), 3);
    assert_eq!(job.credits_used, job.attempts.iter().map(|a| a.credits).sum::<i64>());
    assert!(job.delivered_at.is_some());
    assert!(job.failure_reason.is_none());
}

#[tokio::test]
async fn test_each_attempt_carries_previous_feedback() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::with_scores(&[5.0, 6.5, 7.2]));
    let controller = fx.controller(judge.clone(), None);
    let id = approved_job(&controller).await;

    controller.produce(id).await.unwrap();

    let steps = fx.script_steps();
    assert_eq!(steps.len(), 3);
    assert!(!steps[0].contains("Also apply"));
    assert!(steps[1].contains("Attempt 2 of 3"));
    assert!(steps[1].contains("Make it better than 5"));
    assert!(steps[2].contains("Attempt 3 of 3"));
    assert!(steps[2].contains("Make it better than 6.5"));
    assert_ne!(steps[1], steps[2]);

    let attempts: Vec<u32> = judge.calls().iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fails_below_threshold_keeping_best() {
    let fx = Fixture::new().await;
    fx.script_credits(3, 30);
    let judge = Arc::new(MockJudge::with_scores(&[5.0, 6.5, 6.0]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.best_attempt, Some(2));
    assert!((outcome.best_score.unwrap() - 6.5).abs() < 1e-9);
    assert_eq!(outcome.credits_used, 90);
    let reason = outcome.reason.unwrap();
    assert!(reason.contains("6.5"));
    assert!(reason.contains("attempt 2"));
    assert!(outcome
        .video_path
        .unwrap()
        .ends_with(format!("job_{}_attempt_2.mp4", id)));
}

#[tokio::test]
async fn test_stops_at_first_deliverable_attempt() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::with_scores(&[7.5, 9.0]));
    let controller = fx.controller(judge.clone(), None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(judge.calls().len(), 1);
}

#[tokio::test]
async fn test_never_more_than_three_attempts() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::with_scores(&[3.0, 3.0, 3.0, 9.0]));
    let controller = fx.controller(judge.clone(), None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(judge.calls().len(), 3);
}

#[tokio::test]
async fn test_judge_error_scores_neutrally() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::new());
    judge.push(Err("judge timed out".to_string()));
    judge.push(Ok(verdict(8.5)));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.attempts, 2);
    let job = controller.job(id).await.unwrap();
    let first = job.attempts[0].score.as_ref().unwrap();
    assert!((first.overall - 5.0).abs() < 1e-9);
    assert!(first.issues[0].contains("judge timed out"));
}

#[tokio::test]
async fn test_portfolio_copy_at_eight() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::with_scores(&[8.5]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    let copy = outcome.portfolio_path.unwrap();
    assert!(copy.exists());
    assert!(copy.starts_with(&fx.config.production.portfolio_dir));
}

#[tokio::test]
async fn test_failed_render_step_moves_to_next_attempt() {
    let fx = Fixture::new().await;
    fx.actuator.push_tasks([failed("no new project button")]);
    let judge = Arc::new(MockJudge::with_scores(&[7.4]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.best_attempt, Some(2));
    let job = controller.job(id).await.unwrap();
    let error = job.attempts[0].error.as_deref().unwrap();
    assert!(error.contains("create project"));
    assert!(job.attempts[0].score.is_none());
}

#[tokio::test]
async fn test_reconnects_between_attempts() {
    let fx = Fixture::new().await;
    fx.actuator.push_tasks([disconnected()]);
    let judge = Arc::new(MockJudge::with_scores(&[7.5]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(fx.actuator.restart_calls(), 1);
    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn test_unrecoverable_actuator_fails_job() {
    let fx = Fixture::new().await;
    let judge = Arc::new(MockJudge::new());
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;
    fx.actuator.set_connected(false);
    fx.actuator.push_restarts([false, false, false]);

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.attempts, 0);
    assert!(outcome.reason.unwrap().contains("unrecoverable"));
}

#[tokio::test]
async fn test_suspect_reading_not_charged() {
    let fx = Fixture::new().await;
    fx.actuator.push_balances([Some(1000), Some(0), Some(0)]);
    let judge = Arc::new(MockJudge::with_scores(&[7.5]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.credits_used, 0);
    let job = controller.job(id).await.unwrap();
    assert!(job.attempts[0].suspect_reading);
}

#[tokio::test]
async fn test_resume_continues_from_next_attempt() {
    let fx = Fixture::new().await;
    let jobs = fx.db.jobs();
    let judge = Arc::new(MockJudge::with_scores(&[7.5]));
    let controller = fx.controller(judge.clone(), None);
    let id = approved_job(&controller).await;

    // simulate a run interrupted after one reviewed attempt
    let mut job = controller.job(id).await.unwrap();
    let score = QualityScore::from_dimensions(
        [6.0; 5],
        Recommendation::Regenerate,
        Vec::new(),
        "Brighter lighting".to_string(),
    );
    job.status = JobStatus::Producing;
    job.render_attempts = 1;
    job.best_score = Some(score.clone());
    job.best_attempt = Some(1);
    job.attempts.push(AttemptRecord {
        attempt: 1,
        credits: 30,
        suspect_reading: false,
        score: Some(score),
        artifact: None,
        error: None,
        adjustments: None,
    });
    job.credits_used = 30;
    jobs.update(&job).await.unwrap();
    fx.actuator.push_balances([Some(500), Some(460)]);

    let outcome = controller.produce(id).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Delivered);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.credits_used, 70);
    assert_eq!(judge.calls()[0].attempt, 2);
    let steps = fx.script_steps();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].contains("Attempt 2 of 3"));
    assert!(steps[0].contains("Brighter lighting"));
}

#[tokio::test]
async fn test_plan_resolves_model_and_knowledge() {
    let fx = Fixture::new().await;
    fx.db
        .knowledge()
        .add(NewKnowledge::new(
            "technical",
            "Seedance model tips",
            "Keep prompts under three sentences",
            "hands_on",
        ))
        .await
        .unwrap();
    let controller = fx.controller(Arc::new(MockJudge::new()), None);

    let job = controller
        .submit(&NewJob::new("Fox", "A fox").with_duration(10))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Received);
    let job = controller.plan(job.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Planned);
    assert_eq!(job.model, "seedance");
    assert_eq!(job.cost_estimate, 40);
    let plan = job.plan.unwrap();
    assert_eq!(plan.knowledge_context.len(), 1);
    assert_eq!(plan.knowledge_context[0].topic, "Seedance model tips");
}

#[tokio::test]
async fn test_submit_requires_script_or_description() {
    let fx = Fixture::new().await;
    let controller = fx.controller(Arc::new(MockJudge::new()), None);

    let err = controller.submit(&NewJob::new("Empty", "  ")).await.unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Config(_)));

    let job = controller
        .submit(&NewJob::new("Described", "").with_description("A quiet harbour at dawn"))
        .await
        .unwrap();
    assert_eq!(job.source_text(), "A quiet harbour at dawn");
}

#[tokio::test]
async fn test_approval_gate_holds_job() {
    let fx = Fixture::new().await;
    let gate = Arc::new(RecordingGate::new(Some("appr-1")));
    let controller = fx.controller(Arc::new(MockJudge::new()), Some(gate.clone()));

    let job = controller
        .submit(&NewJob::new("Fox", "A fox").with_model("kling").with_duration(5))
        .await
        .unwrap();
    controller.plan(job.id).await.unwrap();
    let job = controller.request_approval(job.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Planned);
    assert_eq!(job.approval_id.as_deref(), Some("appr-1"));
    let requests = gate.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "kling");
    assert_eq!(requests[0].estimated_credits, 20);

    let err = controller.produce(job.id).await.unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::JobNotReady { .. }));

    let job = controller.record_decision(job.id, true).await.unwrap();
    assert_eq!(job.status, JobStatus::Approved);
}

#[tokio::test]
async fn test_rejection_is_terminal() {
    let fx = Fixture::new().await;
    let gate = Arc::new(RecordingGate::new(Some("appr-2")));
    let controller = fx.controller(Arc::new(MockJudge::new()), Some(gate));

    let job = controller.submit(&NewJob::new("Fox", "A fox")).await.unwrap();
    controller.plan(job.id).await.unwrap();
    controller.request_approval(job.id).await.unwrap();
    let job = controller.record_decision(job.id, false).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure_reason.as_deref(), Some("rejected by approver"));

    let err = controller.produce(job.id).await.unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_sqlite_queue_as_gate() {
    let fx = Fixture::new().await;
    let queue = fx.db.approvals();
    let controller = fx.controller(Arc::new(MockJudge::new()), Some(Arc::new(queue.clone())));

    let job = controller.submit(&NewJob::new("Fox", "A fox")).await.unwrap();
    controller.plan(job.id).await.unwrap();
    let job = controller.request_approval(job.id).await.unwrap();

    let pending = queue.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].job_id, job.id);
    assert_eq!(job.approval_id.as_deref(), Some(pending[0].id.as_str()));
}

#[tokio::test]
async fn test_reviews_become_knowledge_and_stats() {
    let fx = Fixture::new().await;
    fx.script_credits(1, 25);
    let judge = Arc::new(MockJudge::with_scores(&[7.5]));
    let controller = fx.controller(judge, None);
    let id = approved_job(&controller).await;

    controller.produce(id).await.unwrap();

    let reviews = fx
        .db
        .knowledge()
        .search("review", &KnowledgeFilter::category("quality"))
        .await
        .unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(reviews[0].content.starts_with("Score 7.5/10"));

    let stats = fx.db.jobs().queue_stats().await.unwrap();
    assert_eq!(stats.by_status.get("delivered"), Some(&1));
    assert_eq!(stats.total_credits_used, 25);
}
