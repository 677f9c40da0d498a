//! Query records and request/response types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner assigned when a caller does not name one
pub const DEFAULT_USER_ID: &str = "nobody";

/// Answer returned when retrieval finds nothing relevant enough
pub const NO_MATCH_ANSWER: &str = "Unable to find matching results.";

/// Default record lifetime: six months of 30 days
pub const DEFAULT_TTL_SECS: i64 = 60 * 60 * 24 * 30 * 6;

/// One user question and its eventual answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryModel {
    /// Random UUID v4 as 32 lowercase hex digits
    #[serde(default = "new_query_id")]
    pub query_id: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Unix seconds
    #[serde(default = "now_secs")]
    pub created_at: i64,
    /// Unix seconds after which the record expires
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    pub query_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub is_complete: bool,
}

fn new_query_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn default_ttl() -> i64 {
    now_secs() + DEFAULT_TTL_SECS
}

impl QueryModel {
    /// Create an incomplete record with the default lifetime
    pub fn new(user_id: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self::with_ttl(user_id, query_text, DEFAULT_TTL_SECS)
    }

    /// Create an incomplete record that expires `ttl_secs` from now
    pub fn with_ttl(
        user_id: impl Into<String>,
        query_text: impl Into<String>,
        ttl_secs: i64,
    ) -> Self {
        let created_at = now_secs();
        Self {
            query_id: new_query_id(),
            user_id: user_id.into(),
            created_at,
            ttl: created_at + ttl_secs,
            query_text: query_text.into(),
            answer_text: None,
            sources: Vec::new(),
            is_complete: false,
        }
    }

    /// Record the pipeline's answer and mark the query complete
    pub fn complete(&mut self, response: QueryResponse) {
        self.answer_text = Some(response.response_text);
        self.sources = response.sources;
        self.is_complete = true;
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl <= now
    }
}

/// A cited page of an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Source {
    /// File name within the user's source folder
    pub filename: String,
    /// 1-indexed page number
    pub page: u32,
}

impl Source {
    pub fn new(filename: impl Into<String>, page: u32) -> Self {
        Self {
            filename: filename.into(),
            page,
        }
    }

    /// Display label, e.g. `report.pdf - Page: 3`
    pub fn label(&self) -> String {
        format!("{} - Page: {}", self.filename, self.page)
    }
}

/// Output of the RAG pipeline for one question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub query_text: String,
    pub response_text: String,
    pub sources: Vec<Source>,
}

impl QueryResponse {
    /// Response used when no chunk is relevant enough
    pub fn no_match(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            response_text: NO_MATCH_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.sources.is_empty() && self.response_text == NO_MATCH_ANSWER
    }
}

/// Body of a query submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQueryRequest {
    pub query_text: String,
}

/// Query parameters for listing a user's queries
#[derive(Debug, Clone, Deserialize)]
pub struct ListQueriesParams {
    #[serde(default = "default_count")]
    pub count: usize,
}

/// Upper bound for one listing page
pub const MAX_LIST_COUNT: usize = 100;

fn default_count() -> usize {
    25
}

impl Default for ListQueriesParams {
    fn default() -> Self {
        Self { count: default_count() }
    }
}

impl ListQueriesParams {
    pub fn effective_count(&self) -> usize {
        self.count.clamp(1, MAX_LIST_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_query_defaults() {
        let q = QueryModel::new("alice", "what is rust?");
        assert_eq!(q.query_id.len(), 32);
        assert!(q.query_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(q.user_id, "alice");
        assert_eq!(q.ttl - q.created_at, 15_552_000);
        assert!(!q.is_complete);
        assert!(q.answer_text.is_none());
        assert!(q.sources.is_empty());
    }

    #[test]
    fn test_incomplete_omits_answer() {
        let q = QueryModel::new("alice", "question");
        let json = serde_json::to_value(&q).unwrap();
        assert!(json.get("answer_text").is_none());
        assert_eq!(json["is_complete"], false);
        assert_eq!(json["sources"], serde_json::json!([]));
    }

    #[test]
    fn test_deserialize_defaults() {
        let q: QueryModel = serde_json::from_str(r#"{"query_text": "hi"}"#).unwrap();
        assert_eq!(q.user_id, "nobody");
        assert_eq!(q.query_id.len(), 32);
        assert!(q.ttl > q.created_at);
        assert!(!q.is_complete);
    }

    #[test]
    fn test_complete() {
        let mut q = QueryModel::new("bob", "question");
        q.complete(QueryResponse {
            query_text: "question".into(),
            response_text: "answer".into(),
            sources: vec![Source::new("a.pdf", 2)],
        });
        assert!(q.is_complete);
        assert_eq!(q.answer_text.as_deref(), Some("answer"));
        assert_eq!(q.sources[0].label(), "a.pdf - Page: 2");
    }

    #[test]
    fn test_expiry() {
        let q = QueryModel::with_ttl("u", "q", 10);
        assert!(!q.is_expired(q.created_at));
        assert!(q.is_expired(q.created_at + 10));
    }

    #[test]
    fn test_list_count_clamped() {
        assert_eq!(ListQueriesParams { count: 0 }.effective_count(), 1);
        assert_eq!(ListQueriesParams { count: 500 }.effective_count(), MAX_LIST_COUNT);
        assert_eq!(ListQueriesParams::default().effective_count(), 25);
    }

    #[test]
    fn test_no_match() {
        let r = QueryResponse::no_match("q");
        assert!(r.is_no_match());
        assert_eq!(r.response_text, "Unable to find matching results.");
    }
}
