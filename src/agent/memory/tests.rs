use super::*;
use crate::providers::base::LLMResponse;

#[test]
fn test_append_today_creates_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::for_conversation(dir.path(), "telegram", "1").unwrap();

    store.append_today("first note").unwrap();
    let content = std::fs::read_to_string(store.today_file()).unwrap();
    assert!(content.starts_with("# "));
    assert!(content.contains("first note"));

    store.append_today("second note").unwrap();
    let content = std::fs::read_to_string(store.today_file()).unwrap();
    assert!(content.contains("first note"));
    assert!(content.contains("second note"));
}

#[test]
fn test_long_term_write_and_append() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::for_conversation(dir.path(), "telegram", "1").unwrap();

    assert_eq!(store.read_long_term().unwrap(), "");
    store.append_long_term("likes rust").unwrap();
    store.append_long_term("lives in utc").unwrap();
    let content = store.read_long_term().unwrap();
    assert!(content.contains("likes rust"));
    assert!(content.contains("lives in utc"));

    store.write_long_term("replaced").unwrap();
    assert_eq!(store.read_long_term().unwrap(), "replaced");
}

#[test]
fn test_stores_are_scoped_per_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let a = MemoryStore::for_conversation(dir.path(), "telegram", "chat-A").unwrap();
    let b = MemoryStore::for_conversation(dir.path(), "telegram", "chat-B").unwrap();

    a.append_today("top-secret-123").unwrap();
    a.append_long_term("top-secret-123").unwrap();

    assert_eq!(b.read_long_term().unwrap(), "");
    assert_eq!(b.read_recent_daily(7).unwrap(), "");
    for c in b.recall_candidates().unwrap() {
        assert!(!c.content.contains("top-secret-123"));
    }
}

#[test]
fn test_recall_candidates_include_long_term_and_daily() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::for_conversation(dir.path(), "web", "s").unwrap();
    store.write_long_term("para one\n\npara two").unwrap();
    store.append_today("daily entry").unwrap();

    let candidates = store.recall_candidates().unwrap();
    assert!(candidates.len() >= 3);
    assert!(candidates.iter().any(|c| c.content.contains("para one")));
    assert!(candidates.iter().any(|c| c.content.contains("daily entry")));
}

#[test]
fn test_parse_index_array_lenient() {
    assert_eq!(parse_index_array("[2, 0, 1]", 3, 5), Some(vec![2, 0, 1]));
    // Prose around the array is tolerated
    assert_eq!(
        parse_index_array("The relevant ones are [1, 4].", 5, 5),
        Some(vec![1, 4])
    );
    // Out-of-range and duplicates dropped, top_k applied
    assert_eq!(parse_index_array("[9, 1, 1, 0]", 3, 1), Some(vec![1]));
    assert_eq!(parse_index_array("no array here", 3, 5), None);
}

struct FixedRanker(Vec<usize>);

#[async_trait]
impl RecallRanker for FixedRanker {
    async fn rank(
        &self,
        _query: &str,
        _candidates: &[MemorySnippet],
        _top_k: usize,
    ) -> anyhow::Result<Vec<usize>> {
        Ok(self.0.clone())
    }
}

struct FailingRanker;

#[async_trait]
impl RecallRanker for FailingRanker {
    async fn rank(
        &self,
        _query: &str,
        _candidates: &[MemorySnippet],
        _top_k: usize,
    ) -> anyhow::Result<Vec<usize>> {
        anyhow::bail!("ranker unavailable")
    }
}

fn snippets(n: usize) -> Vec<MemorySnippet> {
    (0..n)
        .map(|i| MemorySnippet {
            source: format!("s{}", i),
            content: format!("c{}", i),
        })
        .collect()
}

#[tokio::test]
async fn test_ranked_recall_uses_ranker_result() {
    let selected = ranked_recall(&FixedRanker(vec![2, 0]), "q", &snippets(4), 3).await;
    assert_eq!(selected, vec![2, 0]);
}

#[tokio::test]
async fn test_ranked_recall_falls_back_to_recency() {
    let selected = ranked_recall(&FailingRanker, "q", &snippets(5), 2).await;
    assert_eq!(selected, vec![3, 4]);
}

struct JsonProvider(String);

#[async_trait]
impl crate::providers::base::LLMProvider for JsonProvider {
    async fn chat(
        &self,
        _req: crate::providers::base::ChatRequest<'_>,
    ) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse::text(self.0.clone()))
    }

    fn default_model(&self) -> &str {
        "test"
    }
}

#[tokio::test]
async fn test_llm_ranker_parses_provider_output() {
    let ranker = LlmRecallRanker::new(Arc::new(JsonProvider("[1, 0]".to_string())), "test");
    let indices = ranker.rank("query", &snippets(3), 5).await.unwrap();
    assert_eq!(indices, vec![1, 0]);
}
