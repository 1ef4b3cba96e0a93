use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::models::TokenRecord;
use crate::db::TokenStore;

/// Process-local token store.
///
/// Used when no PostgreSQL section is configured (or the database is
/// unreachable at startup). Applies the same merge rules as the SQL upsert.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<TokenRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn get(&self, mint: &str) -> Option<TokenRecord> {
        self.records.lock().await.iter().find(|r| r.mint == mint).cloned()
    }
}

impl TokenStore for MemoryStore {
    async fn load_all(&self, limit: usize) -> anyhow::Result<Vec<TokenRecord>> {
        let mut records = self.records.lock().await.clone();
        records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn upsert(&self, record: &TokenRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.mint == record.mint) {
            Some(existing) => existing.replace_from(record.clone()),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn update_migration(
        &self,
        mint: &str,
        migrated: bool,
        migrated_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        if !migrated {
            return Ok(());
        }
        let mut records = self.records.lock().await;
        if let Some(existing) = records.iter_mut().find(|r| r.mint == mint) {
            existing.mark_migrated(migrated_at.unwrap_or_else(Utc::now));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(mint: &str, at: i64) -> TokenRecord {
        TokenRecord::new(mint.into(), mint.into(), mint.into(), ts(at))
    }

    #[tokio::test]
    async fn test_load_all_newest_first_and_capped() {
        let store = MemoryStore::new();
        for (mint, at) in [("A", 1), ("B", 3), ("C", 2)] {
            store.upsert(&record(mint, at)).await.unwrap();
        }

        let loaded = store.load_all(2).await.unwrap();
        let mints: Vec<&str> = loaded.iter().map(|r| r.mint.as_str()).collect();
        assert_eq!(mints, ["B", "C"]);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_mint() {
        let store = MemoryStore::new();
        store.upsert(&record("A", 1)).await.unwrap();
        store.upsert(&record("A", 5).with_volume(2.0)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.get("A").await.unwrap();
        assert_eq!(stored.volume, 2.0);
        assert_eq!(stored.observed_at, ts(1));
    }

    #[tokio::test]
    async fn test_update_migration_is_monotonic() {
        let store = MemoryStore::new();
        store.upsert(&record("A", 1)).await.unwrap();
        store.update_migration("A", true, Some(ts(4))).await.unwrap();
        store.update_migration("A", true, Some(ts(9))).await.unwrap();
        store.update_migration("A", false, None).await.unwrap();
        // Unknown mint is a no-op
        store.update_migration("Z", true, Some(ts(9))).await.unwrap();

        let stored = store.get("A").await.unwrap();
        assert!(stored.migrated);
        assert_eq!(stored.migrated_at, Some(ts(4)));
        assert_eq!(store.len().await, 1);
    }
}
