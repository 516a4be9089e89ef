/// Knowledge store
///
/// Findings from exploration, hands-on practice and quality reviews, plus
/// imported reference material. Search matches every query word against
/// topic, content and tags, ranking entries by how many words hit and then
/// by confidence.
use anyhow::Context;
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::knowledge::{KnowledgeEntry, KnowledgeFilter, KnowledgeRepository, NewKnowledge};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::unix_now;

const DEFAULT_LIMIT: i64 = 20;

/// Words shorter than this are ignored in queries
const MIN_TERM_CHARS: usize = 2;

/// SQLite-backed [`KnowledgeRepository`]
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored entries
    pub async fn count(&self) -> anyhow::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM knowledge")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count knowledge")
    }

    fn row_to_entry(row: &SqliteRow) -> anyhow::Result<KnowledgeEntry> {
        let tags: String = row.try_get("tags")?;
        Ok(KnowledgeEntry {
            id: row.try_get("id")?,
            category: row.try_get("category")?,
            topic: row.try_get("topic")?,
            content: row.try_get("content")?,
            source: row.try_get("source")?,
            confidence: row.try_get("confidence")?,
            tags: serde_json::from_str(&tags).context("Invalid knowledge tags")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|term| term.chars().count() >= MIN_TERM_CHARS)
        .map(|term| term.to_lowercase())
        .collect();
    terms.dedup();
    terms
}

fn database_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Database(e.to_string())
}

#[async_trait]
impl KnowledgeRepository for SqliteKnowledgeStore {
    async fn add(&self, entry: NewKnowledge) -> Result<i64, EngineError> {
        let tags = serde_json::to_string(&entry.tags).map_err(database_error)?;
        let now = unix_now().map_err(database_error)?;

        let id = sqlx::query(
            "INSERT INTO knowledge (category, topic, content, source, confidence, tags, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.category)
        .bind(&entry.topic)
        .bind(&entry.content)
        .bind(&entry.source)
        .bind(entry.confidence.clamp(0.0, 1.0))
        .bind(tags)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database_error)?
        .last_insert_rowid();

        debug!("Stored knowledge #{}: {}", id, entry.topic);
        Ok(id)
    }

    async fn search(
        &self,
        query: &str,
        filter: &KnowledgeFilter,
    ) -> Result<Vec<KnowledgeEntry>, EngineError> {
        let terms = query_terms(query);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT * FROM (SELECT id, category, topic, content, source, confidence, tags, \
             created_at",
        );

        // relevance: one point per matching term
        builder.push(", (0");
        for term in &terms {
            builder
                .push(" + (LOWER(topic || ' ' || content || ' ' || tags) LIKE ")
                .push_bind(format!("%{}%", term))
                .push(")");
        }
        builder.push(") AS relevance FROM knowledge WHERE 1 = 1");

        if let Some(category) = &filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(source) = &filter.source {
            builder
                .push(" AND source LIKE ")
                .push_bind(format!("%{}%", source));
        }
        builder.push(")");
        if !terms.is_empty() {
            builder.push(" WHERE relevance > 0");
        }

        builder
            .push(" ORDER BY relevance DESC, confidence DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT).max(0));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter()
            .map(|row| Self::row_to_entry(row).map_err(database_error))
            .collect()
    }
}
