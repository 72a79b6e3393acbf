//! Tests for the FAQ memory over the shipped coffee-shop data
//!
//! Uses a bag-of-words embedder so distances are easy to reason about.

use agentdesk::embeddings::EmbeddingGenerator;
use agentdesk::faq_memory::{cache_lookup, load_records, FaqMemory};
use agentdesk::faq_protocol::{FaqProtocol, ADD_FAQ_ENTRY, GET_FAQ_ANSWER, SEARCH_FAQ};
use agentdesk::tool_protocol::ToolProtocol;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

const VOCABULARY: [&str; 6] = ["flat white", "latte", "cold brew", "wi-fi", "rewards", "beans"];

struct BagOfWords;

#[async_trait]
impl EmbeddingGenerator for BagOfWords {
    async fn embed(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, Box<dyn Error + Send + Sync>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|w| text.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

fn data_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/faq-qna-items.json")
}

fn memory() -> Arc<FaqMemory> {
    Arc::new(FaqMemory::from_json_file(data_file(), Arc::new(BagOfWords)).unwrap())
}

// ============= Data Tests =============

#[test]
fn test_shipped_data_loads() {
    let records = load_records(data_file()).unwrap();
    assert_eq!(records.len(), 8);
    let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), records.len());
    assert!(records
        .iter()
        .all(|r| r.content.starts_with("Q: ") && !r.category.is_empty()));
    assert_eq!(records[7].tags, "wifi, store");
}

// ============= Search Tests =============

#[tokio::test]
async fn test_search_ranks_closest_first_and_filters_category() {
    let memory = memory();

    let hits = memory
        .search_faq("What is cold brew?", None, 3, 0.5)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
    assert_eq!(ids, vec!["faq-007", "faq-001"]);
    assert!(hits[0].score < hits[1].score);

    let general = memory
        .search_faq("What is cold brew?", Some("general"), 3, 0.5)
        .await
        .unwrap();
    assert!(general.is_empty());
}

#[tokio::test]
async fn test_cache_lookup_uses_threshold() {
    let memory = memory();

    let hit = cache_lookup(&memory, "Do you have Wi-Fi?", 0.25)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.record.id, "faq-008");

    assert!(cache_lookup(&memory, "Do you roast your own beans?", 0.25)
        .await
        .unwrap()
        .is_none());
}

// ============= Tool Tests =============

#[tokio::test]
async fn test_added_entry_is_answerable() {
    let protocol = FaqProtocol::new(memory());

    let added = protocol
        .execute(
            ADD_FAQ_ENTRY,
            json!({
                "question": "Do you sell whole beans?",
                "answer": "Yes, every store sells whole beans.",
                "category": "retail",
                "tags": "beans, retail"
            }),
        )
        .await
        .unwrap();
    assert!(added
        .to_output_text()
        .starts_with("Successfully added FAQ entry with ID: "));

    let answer = protocol
        .execute(GET_FAQ_ANSWER, json!({"query": "Can I buy beans?"}))
        .await
        .unwrap();
    assert_eq!(
        answer.to_output_text(),
        "FAQ Answer: Yes, every store sells whole beans."
    );

    let search = protocol
        .execute(
            SEARCH_FAQ,
            json!({"query": "beans", "category": "retail", "limit": 1}),
        )
        .await
        .unwrap()
        .to_output_text();
    assert!(search.starts_with("Found 1 FAQ result(s) for 'beans':"));
    assert!(search.contains("Tags: beans, retail"));
}

#[tokio::test]
async fn test_unanswerable_question() {
    let protocol = FaqProtocol::new(memory());
    let answer = protocol
        .execute(GET_FAQ_ANSWER, json!({"query": "Do you sell bagels?"}))
        .await
        .unwrap();
    assert_eq!(
        answer.to_output_text(),
        "No specific answer found in FAQ for: 'Do you sell bagels?'"
    );
}
