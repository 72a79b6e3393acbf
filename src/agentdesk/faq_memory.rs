//! FAQ memory: question/answer pairs searched by embedding similarity.
//!
//! Records are loaded from a JSON file and embedded lazily on first use. Searches rank records by
//! cosine distance to the query (lower is closer) and keep only those strictly below a threshold,
//! which is what lets the chat path answer from the FAQ without invoking an agent.

use crate::agentdesk::embeddings::{cosine_distance, EmbeddingGenerator};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Distance threshold used by [`FaqMemory::get_answer`].
pub const DEFAULT_ANSWER_THRESHOLD: f32 = 0.19;

#[derive(Debug, Clone, PartialEq)]
pub enum FaqError {
    /// The FAQ file could not be read or parsed.
    Load(String),
    /// The embedding service failed.
    Embedding(String),
    /// Two vectors of different sizes were compared.
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for FaqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaqError::Load(msg) => write!(f, "failed to load FAQ data: {}", msg),
            FaqError::Embedding(msg) => write!(f, "embedding failed: {}", msg),
            FaqError::DimensionMismatch { expected, actual } => write!(
                f,
                "vector dimension mismatch: expected {}, got {}",
                expected, actual
            ),
        }
    }
}

impl Error for FaqError {}

/// One FAQ entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FaqRecord {
    pub id: String,
    /// Text that is embedded.
    pub content: String,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub item_type: String,
    /// Tags joined with `", "`.
    pub tags: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

impl FaqRecord {
    pub fn new(id: impl Into<String>, question: &str, answer: &str) -> Self {
        Self {
            id: id.into(),
            content: record_content(question, answer),
            question: question.to_string(),
            answer: answer.to_string(),
            category: "general".to_string(),
            item_type: "question".to_string(),
            tags: String::new(),
            vector: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = tags.join(", ");
        self
    }
}

fn record_content(question: &str, answer: &str) -> String {
    match (question.is_empty(), answer.is_empty()) {
        (false, false) => format!("Q: {}\nA: {}", question, answer),
        (false, true) => question.to_string(),
        _ => answer.to_string(),
    }
}

#[derive(Deserialize)]
struct FaqItem {
    id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    category: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Read a JSON array of `{id, question, answer, category?, type?, tags?}`.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<FaqRecord>, FaqError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| FaqError::Load(format!("{}: {}", path.display(), e)))?;
    let items: Vec<FaqItem> = serde_json::from_str(&raw)
        .map_err(|e| FaqError::Load(format!("{}: {}", path.display(), e)))?;

    Ok(items
        .into_iter()
        .map(|item| {
            let mut record = FaqRecord::new(item.id, &item.question, &item.answer)
                .with_category(item.category.unwrap_or_else(|| "general".to_string()))
                .with_tags(&item.tags);
            if let Some(item_type) = item.item_type {
                record.item_type = item_type;
            }
            record
        })
        .collect())
}

/// A record and its cosine distance to the query.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FaqHit {
    pub record: FaqRecord,
    pub score: f32,
}

pub struct FaqMemory {
    records: Vec<FaqRecord>,
    embedder: Arc<dyn EmbeddingGenerator>,
    collection: RwLock<Option<Vec<FaqRecord>>>,
}

static SHARED: OnceCell<Arc<FaqMemory>> = OnceCell::new();

impl FaqMemory {
    pub fn new(records: Vec<FaqRecord>, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            records,
            embedder,
            collection: RwLock::new(None),
        }
    }

    pub fn from_json_file(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> Result<Self, FaqError> {
        Ok(Self::new(load_records(path)?, embedder))
    }

    /// Process-wide instance; the file is read by the first caller only.
    pub fn shared(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> Result<Arc<FaqMemory>, FaqError> {
        SHARED
            .get_or_try_init(|| Self::from_json_file(path, embedder).map(Arc::new))
            .cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub async fn is_initialized(&self) -> bool {
        self.collection.read().await.is_some()
    }

    /// Embed every record. Does nothing when already initialized.
    pub async fn initialize(&self) -> Result<(), FaqError> {
        let mut collection = self.collection.write().await;
        if collection.is_some() {
            return Ok(());
        }
        let contents: Vec<String> = self.records.iter().map(|r| r.content.clone()).collect();
        let vectors = self
            .embedder
            .embed(&contents)
            .await
            .map_err(|e| FaqError::Embedding(e.to_string()))?;
        if vectors.len() != self.records.len() {
            return Err(FaqError::Embedding(format!(
                "{} vectors for {} records",
                vectors.len(),
                self.records.len()
            )));
        }
        let indexed = self
            .records
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(mut record, vector)| {
                record.vector = vector;
                record
            })
            .collect::<Vec<_>>();
        log::info!("FAQ memory initialized with {} records", indexed.len());
        *collection = Some(indexed);
        Ok(())
    }

    /// Records closest to `query`, best first.
    ///
    /// Only records whose distance is strictly below `score_threshold` are returned, at most
    /// `limit` of them. `category` filters on exact match; an empty category matches all.
    pub async fn search_faq(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<FaqHit>, FaqError> {
        self.initialize().await?;
        let query_vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| FaqError::Embedding(e.to_string()))?;

        let collection = self.collection.read().await;
        let Some(records) = collection.as_ref() else {
            return Ok(Vec::new());
        };

        let category = category.filter(|c| !c.is_empty());
        let mut ranked = Vec::new();
        for record in records {
            if category.is_some_and(|c| c != record.category) {
                continue;
            }
            ranked.push((cosine_distance(&query_vector, &record.vector)?, record));
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let hits: Vec<FaqHit> = ranked
            .into_iter()
            .filter(|(score, _)| *score < score_threshold)
            .take(limit)
            .map(|(score, record)| {
                log::info!("found FAQ record {} with score {}", record.id, score);
                FaqHit {
                    record: record.clone(),
                    score,
                }
            })
            .collect();
        Ok(hits)
    }

    /// Answer of the closest record under [`DEFAULT_ANSWER_THRESHOLD`].
    pub async fn get_answer(
        &self,
        query: &str,
        category: Option<&str>,
    ) -> Result<Option<String>, FaqError> {
        Ok(self
            .search_faq(query, category, 1, DEFAULT_ANSWER_THRESHOLD)
            .await?
            .into_iter()
            .next()
            .map(|hit| hit.record.answer))
    }

    /// Embed and insert a new entry; returns its id.
    ///
    /// Entries added this way live in the indexed collection only and are gone after
    /// [`close`](Self::close).
    pub async fn add_faq(
        &self,
        question: &str,
        answer: &str,
        category: &str,
        tags: &[String],
    ) -> Result<String, FaqError> {
        self.initialize().await?;
        let mut record = FaqRecord::new(uuid::Uuid::new_v4().to_string(), question, answer)
            .with_category(category)
            .with_tags(tags);
        record.content = format!("Q: {}\nA: {}", question, answer);
        record.vector = self
            .embedder
            .embed_one(&record.content)
            .await
            .map_err(|e| FaqError::Embedding(e.to_string()))?;

        let id = record.id.clone();
        if let Some(records) = self.collection.write().await.as_mut() {
            records.push(record);
        }
        Ok(id)
    }

    /// Drop the indexed collection; the next search re-embeds the loaded records.
    pub async fn close(&self) {
        if self.collection.write().await.take().is_some() {
            log::info!("FAQ memory closed");
        }
    }
}

/// Chat-path cache check: the single closest record under `threshold`, any category.
pub async fn cache_lookup(
    memory: &FaqMemory,
    query: &str,
    threshold: f32,
) -> Result<Option<FaqHit>, FaqError> {
    Ok(memory
        .search_faq(query, None, 1, threshold)
        .await?
        .into_iter()
        .next())
}
