//! Portfolio of the best deliveries

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Copy a delivered artifact into the portfolio directory
pub async fn add_to_portfolio(portfolio_dir: &Path, job_id: i64, artifact: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(portfolio_dir)
        .await
        .context("Failed to create portfolio directory")?;

    let file_name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());
    let destination = portfolio_dir.join(format!("portfolio_{}_{}", job_id, file_name));

    tokio::fs::copy(artifact, &destination)
        .await
        .with_context(|| format!("Failed to copy {} to portfolio", artifact.display()))?;

    info!("Added job #{} to portfolio: {}", job_id, destination.display());
    Ok(destination)
}
