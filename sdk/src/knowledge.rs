//! Knowledge repository trait and entry types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// A knowledge entry to be stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledge {
    pub category: String,
    pub topic: String,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub tags: Vec<String>,
}

impl NewKnowledge {
    pub fn new(
        category: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            topic: topic.into(),
            content: content.into(),
            source: source.into(),
            confidence: 0.5,
            tags: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A stored knowledge entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub category: String,
    pub topic: String,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub created_at: i64,
}

/// Optional filters for a knowledge search
#[derive(Debug, Clone, Default)]
pub struct KnowledgeFilter {
    pub category: Option<String>,

    /// Substring the entry source must contain
    pub source: Option<String>,

    pub limit: Option<i64>,
}

impl KnowledgeFilter {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Permanent store of findings
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Store an entry and return its id
    async fn add(&self, entry: NewKnowledge) -> Result<i64, EngineError>;

    /// Search entries whose topic or content match the query
    async fn search(
        &self,
        query: &str,
        filter: &KnowledgeFilter,
    ) -> Result<Vec<KnowledgeEntry>, EngineError>;
}
