// Framewright
// Main entry point for the framewright binary

use anyhow::Context;
use clap::Parser;
use framewright_engine::cli::{Cli, Command, FeatureAction, JobAction};
use framewright_engine::config::Config;
use framewright_engine::handlers::{
    handle_auto, handle_costs, handle_explore, handle_feature_reset, handle_hands_on,
    handle_job_decision, handle_job_produce, handle_job_show, handle_job_submit, handle_pending,
    handle_progress, handle_queue, handle_seed, handle_status, OutputFormat,
};
use framewright_engine::production::NewJob;
use framewright_engine::telemetry::init_telemetry_with;
use sdk::errors::ErrorExt;
use sdk::EngineError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with(log_level, config.core.log_format);

    tracing::info!(
        "Framewright v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let result = run(cli.command, &config, format).await;
    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
    }
    result
}

async fn run(command: Command, config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Command::Explore { minutes } => handle_explore(minutes, config, format).await,

        Command::HandsOn { minutes, budget } => {
            handle_hands_on(minutes, budget, config, format).await
        }

        Command::Auto { minutes, budget } => handle_auto(minutes, budget, config, format).await,

        Command::Status => handle_status(config, format).await,

        Command::Progress => handle_progress(config, format).await,

        Command::Costs => handle_costs(config, format).await,

        Command::Seed { curriculum } => handle_seed(curriculum.as_deref(), config, format).await,

        Command::Features { action } => match action {
            FeatureAction::Reset { category, name } => {
                handle_feature_reset(&category, &name, config, format).await
            }
        },

        Command::Job { action } => match action {
            JobAction::Submit {
                title,
                script,
                script_file,
                description,
                model,
                duration,
            } => {
                let script = match script_file {
                    Some(path) => tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read script {}", path.display()))?,
                    None => script.unwrap_or_default(),
                };
                let new_job = NewJob::new(title, script)
                    .with_description(description.unwrap_or_default())
                    .with_model(model)
                    .with_duration(duration);
                handle_job_submit(new_job, config, format).await
            }
            JobAction::Approve { job_id } => handle_job_decision(job_id, true, config, format).await,
            JobAction::Reject { job_id } => handle_job_decision(job_id, false, config, format).await,
            JobAction::Produce { job_id } => handle_job_produce(job_id, config, format).await,
            JobAction::Show { job_id } => handle_job_show(job_id, config, format).await,
            JobAction::Pending => handle_pending(config, format).await,
        },

        Command::Queue { status } => handle_queue(status.as_deref(), config, format).await,
    }
}
