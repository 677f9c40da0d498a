//! Periodic removal of expired query records

use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::storage::QueryTable;

/// Purge records whose ttl has passed
pub async fn sweep_once(table: &QueryTable) -> Result<usize> {
    let table = table.clone();
    let now = chrono::Utc::now().timestamp();

    tokio::task::spawn_blocking(move || table.purge_expired(now))
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
}

/// Sweep the table every `interval` until the runtime shuts down
pub fn spawn_ttl_sweeper(table: QueryTable, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&table).await {
                tracing::warn!("Expired record sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryModel;

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let table = QueryTable::in_memory().unwrap();

        let mut expired = QueryModel::new("nobody", "old");
        expired.ttl = chrono::Utc::now().timestamp() - 10;
        let live = QueryModel::new("nobody", "new");
        table.put_item(&expired).unwrap();
        table.put_item(&live).unwrap();

        assert_eq!(sweep_once(&table).await.unwrap(), 1);
        assert_eq!(table.len().unwrap(), 1);
        assert!(table.get_item(&live.query_id).unwrap().is_some());
    }
}
