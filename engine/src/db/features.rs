/// Feature persistence
///
/// One row per feature keyed by (category, name). Cost and time histories
/// are stored as JSON arrays; `rowid` keeps curriculum order.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::features::{Feature, FeatureMap, FeatureRepository};

const SELECT_FEATURES: &str = "SELECT category, name, description, confidence, priority, \
     generative, explored_count, last_explored, cost_history, time_history, \
     avg_credit_cost, avg_generation_time, notes \
     FROM features ORDER BY category, rowid";

/// SQLite-backed [`FeatureRepository`]
#[derive(Clone)]
pub struct SqliteFeatureRepository {
    pool: SqlitePool,
}

impl SqliteFeatureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Put a feature back to zero confidence
    pub async fn reset_confidence(&self, category: &str, name: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE features SET confidence = 0.0 WHERE category = ? AND name = ?")
                .bind(category)
                .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to reset feature confidence")?;

        if result.rows_affected() == 0 {
            return Err(EngineError::FeatureNotFound(format!("{}/{}", category, name)).into());
        }
        info!("Reset confidence of {}/{}", category, name);
        Ok(())
    }

    fn row_to_feature(row: &SqliteRow) -> Result<Feature> {
        let last_explored: Option<String> = row.try_get("last_explored")?;
        let last_explored = last_explored
            .map(|text| {
                DateTime::parse_from_rfc3339(&text)
                    .map(|at| at.with_timezone(&Utc))
                    .with_context(|| format!("Invalid last_explored timestamp '{}'", text))
            })
            .transpose()?;

        let cost_history: VecDeque<i64> =
            serde_json::from_str(&row.try_get::<String, _>("cost_history")?)
                .context("Invalid cost history")?;
        let time_history: VecDeque<f64> =
            serde_json::from_str(&row.try_get::<String, _>("time_history")?)
                .context("Invalid time history")?;

        Ok(Feature {
            category: row.try_get("category")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            confidence: row.try_get("confidence")?,
            priority: row.try_get("priority")?,
            generative: row.try_get("generative")?,
            explored_count: row.try_get::<i64, _>("explored_count")?.max(0) as u32,
            last_explored,
            cost_history,
            time_history,
            avg_credit_cost: row.try_get("avg_credit_cost")?,
            avg_generation_time: row.try_get("avg_generation_time")?,
            notes: row.try_get("notes")?,
        })
    }
}

#[async_trait]
impl FeatureRepository for SqliteFeatureRepository {
    async fn load(&self) -> Result<FeatureMap> {
        let rows = sqlx::query(SELECT_FEATURES)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load features")?;

        let mut map = FeatureMap::new();
        for row in &rows {
            map.insert(Self::row_to_feature(row)?);
        }
        debug!("Loaded {} features", map.len());
        Ok(map)
    }

    async fn save_feature(&self, feature: &Feature) -> Result<()> {
        sqlx::query(
            "INSERT INTO features (category, name, description, confidence, priority, generative, \
             explored_count, last_explored, cost_history, time_history, avg_credit_cost, \
             avg_generation_time, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(category, name) DO UPDATE SET \
             description = excluded.description, confidence = excluded.confidence, \
             priority = excluded.priority, generative = excluded.generative, \
             explored_count = excluded.explored_count, last_explored = excluded.last_explored, \
             cost_history = excluded.cost_history, time_history = excluded.time_history, \
             avg_credit_cost = excluded.avg_credit_cost, \
             avg_generation_time = excluded.avg_generation_time, notes = excluded.notes",
        )
        .bind(&feature.category)
        .bind(&feature.name)
        .bind(&feature.description)
        .bind(feature.confidence)
        .bind(feature.priority)
        .bind(feature.generative)
        .bind(i64::from(feature.explored_count))
        .bind(feature.last_explored.map(|at| at.to_rfc3339()))
        .bind(serde_json::to_string(&feature.cost_history)?)
        .bind(serde_json::to_string(&feature.time_history)?)
        .bind(feature.avg_credit_cost)
        .bind(feature.avg_generation_time)
        .bind(&feature.notes)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save feature {}", feature.name))?;

        Ok(())
    }

    async fn seed(&self, map: &FeatureMap) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin seed")?;
        let mut added = 0;

        for feature in map.iter() {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO features (category, name, description, confidence, \
                 priority, generative, notes) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&feature.category)
            .bind(&feature.name)
            .bind(&feature.description)
            .bind(feature.confidence)
            .bind(feature.priority)
            .bind(feature.generative)
            .bind(&feature.notes)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to seed feature {}", feature.name))?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await.context("Failed to commit seed")?;
        info!("Seeded {} new features ({} in curriculum)", added, map.len());
        Ok(added)
    }
}
