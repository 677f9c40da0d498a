//! SQLite table of query records
//!
//! Records are keyed by `query_id`. Listing goes through an index on
//! `(user_id, created_at)` so a user's recent queries come back newest first.
//! Records past their `ttl` are never returned and are removed by
//! [`QueryTable::purge_expired`].

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{QueryModel, Source};

/// Query record table
#[derive(Clone)]
pub struct QueryTable {
    conn: Arc<Mutex<Connection>>,
}

impl QueryTable {
    /// Create or open the table at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open query table: {}", e)))?;

        let table = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        table.migrate()?;
        Ok(table)
    }

    /// Create an in-memory table
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory table: {}", e)))?;

        let table = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        table.migrate()?;
        Ok(table)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS queries (
                query_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                ttl INTEGER NOT NULL,
                query_text TEXT NOT NULL,
                answer_text TEXT,
                sources TEXT NOT NULL DEFAULT '[]',
                is_complete INTEGER NOT NULL DEFAULT 0
            );

            -- UserIdSortedByCreatedAt
            CREATE INDEX IF NOT EXISTS idx_queries_user_created
                ON queries(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_queries_ttl ON queries(ttl);
            "#,
        )
        .map_err(|e| Error::storage(format!("Failed to migrate query table: {}", e)))?;

        Ok(())
    }

    /// Insert or replace a record
    pub fn put_item(&self, item: &QueryModel) -> Result<()> {
        let sources = serde_json::to_string(&item.sources)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO queries (
                query_id, user_id, created_at, ttl, query_text, answer_text, sources, is_complete
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(query_id) DO UPDATE SET
                user_id = excluded.user_id,
                created_at = excluded.created_at,
                ttl = excluded.ttl,
                query_text = excluded.query_text,
                answer_text = excluded.answer_text,
                sources = excluded.sources,
                is_complete = excluded.is_complete
            "#,
            params![
                item.query_id,
                item.user_id,
                item.created_at,
                item.ttl,
                item.query_text,
                item.answer_text,
                sources,
                item.is_complete,
            ],
        )
        .map_err(|e| Error::storage(format!("Failed to put query {}: {}", item.query_id, e)))?;

        Ok(())
    }

    /// Get a live record by id
    pub fn get_item(&self, query_id: &str) -> Result<Option<QueryModel>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT * FROM queries WHERE query_id = ?1 AND ttl > ?2",
            params![query_id, now()],
            row_to_query,
        )
        .optional()
        .map_err(|e| Error::storage(format!("Failed to get query {}: {}", query_id, e)))
    }

    /// Get a live record by id, only if `user_id` owns it
    pub fn get_user_item(&self, user_id: &str, query_id: &str) -> Result<Option<QueryModel>> {
        Ok(self
            .get_item(query_id)?
            .filter(|item| item.user_id == user_id))
    }

    /// A user's live records, newest first, at most `count`
    pub fn list_items(&self, user_id: &str, count: usize) -> Result<Vec<QueryModel>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT * FROM queries WHERE user_id = ?1 AND ttl > ?2
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3",
            )
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let items = stmt
            .query_map(params![user_id, now(), count as i64], row_to_query)
            .map_err(|e| Error::storage(format!("Failed to list queries: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::storage(format!("Failed to read query: {}", e)))?;

        Ok(items)
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete_item(&self, query_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM queries WHERE query_id = ?1", params![query_id])
            .map_err(|e| Error::storage(format!("Failed to delete query {}: {}", query_id, e)))?;
        Ok(deleted > 0)
    }

    /// Delete records whose ttl is at or before `now`
    pub fn purge_expired(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM queries WHERE ttl <= ?1", params![now])
            .map_err(|e| Error::storage(format!("Failed to purge expired queries: {}", e)))?;

        if deleted > 0 {
            tracing::info!("Purged {} expired queries", deleted);
        }
        Ok(deleted)
    }

    /// Total stored records, including expired ones not yet purged
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM queries", [], |row| row.get(0))
            .map_err(|e| Error::storage(format!("Failed to count queries: {}", e)))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_query(row: &Row) -> rusqlite::Result<QueryModel> {
    let sources_json: String = row.get("sources")?;
    let sources: Vec<Source> = serde_json::from_str(&sources_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(QueryModel {
        query_id: row.get("query_id")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
        ttl: row.get("ttl")?,
        query_text: row.get("query_text")?,
        answer_text: row.get("answer_text")?,
        sources,
        is_complete: row.get("is_complete")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryResponse;

    fn query_at(user: &str, text: &str, created_at: i64) -> QueryModel {
        let mut q = QueryModel::new(user, text);
        q.created_at = created_at;
        q
    }

    #[test]
    fn test_put_and_get() {
        let table = QueryTable::in_memory().unwrap();
        let item = QueryModel::new("alice", "what is rust?");
        table.put_item(&item).unwrap();

        let stored = table.get_item(&item.query_id).unwrap().unwrap();
        assert_eq!(stored, item);
        assert!(!stored.is_complete);
        assert!(stored.answer_text.is_none());
    }

    #[test]
    fn test_put_replaces() {
        let table = QueryTable::in_memory().unwrap();
        let mut item = QueryModel::new("alice", "q");
        table.put_item(&item).unwrap();

        item.complete(QueryResponse {
            query_text: "q".into(),
            response_text: "a".into(),
            sources: vec![Source::new("a.pdf", 3), Source::new("b.pdf", 1)],
        });
        table.put_item(&item).unwrap();

        let stored = table.get_item(&item.query_id).unwrap().unwrap();
        assert!(stored.is_complete);
        assert_eq!(stored.answer_text.as_deref(), Some("a"));
        assert_eq!(stored.sources, item.sources);
        assert_eq!(table.len().unwrap(), 1);
    }

    #[test]
    fn test_get_user_item_checks_owner() {
        let table = QueryTable::in_memory().unwrap();
        let item = QueryModel::new("alice", "q");
        table.put_item(&item).unwrap();

        assert!(table.get_user_item("alice", &item.query_id).unwrap().is_some());
        assert!(table.get_user_item("bob", &item.query_id).unwrap().is_none());
        assert!(table.get_item("missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_item() {
        let table = QueryTable::in_memory().unwrap();
        let item = QueryModel::new("alice", "q");
        table.put_item(&item).unwrap();

        assert!(table.delete_item(&item.query_id).unwrap());
        assert!(!table.delete_item(&item.query_id).unwrap());
        assert!(table.is_empty().unwrap());
    }

    #[test]
    fn test_list_newest_first_per_user() {
        let table = QueryTable::in_memory().unwrap();
        let base = chrono::Utc::now().timestamp();
        table.put_item(&query_at("alice", "first", base - 30)).unwrap();
        table.put_item(&query_at("alice", "third", base - 10)).unwrap();
        table.put_item(&query_at("alice", "second", base - 20)).unwrap();
        table.put_item(&query_at("bob", "other", base)).unwrap();

        let items = table.list_items("alice", 10).unwrap();
        let texts: Vec<&str> = items.iter().map(|q| q.query_text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);
        assert!(items.iter().all(|q| q.user_id == "alice"));

        let limited = table.list_items("alice", 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].query_text, "third");

        assert!(table.list_items("carol", 10).unwrap().is_empty());
    }

    #[test]
    fn test_expired_hidden_and_purged() {
        let table = QueryTable::in_memory().unwrap();
        let live = QueryModel::new("alice", "live");
        let mut expired = QueryModel::new("alice", "old");
        expired.ttl = expired.created_at - 1;

        table.put_item(&live).unwrap();
        table.put_item(&expired).unwrap();

        assert!(table.get_item(&expired.query_id).unwrap().is_none());
        assert_eq!(table.list_items("alice", 10).unwrap().len(), 1);

        assert_eq!(table.purge_expired(chrono::Utc::now().timestamp()).unwrap(), 1);
        assert_eq!(table.len().unwrap(), 1);
    }
}
