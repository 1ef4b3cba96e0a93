use std::future::Future;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::Settings;

mod memory;
pub mod models;
pub mod postgres;
mod writer;

pub use memory::MemoryStore;
pub use postgres::PostgresClient;
pub use writer::{PersistMessage, PersistenceWriter};

use models::TokenRecord;

/// Durable home of token records.
///
/// Every call may fail; callers log and carry on with the in-memory working
/// set as the source of truth.
pub trait TokenStore: Send + Sync + 'static {
    /// Stored records, newest first, at most `limit`.
    fn load_all(&self, limit: usize) -> impl Future<Output = anyhow::Result<Vec<TokenRecord>>> + Send;

    /// Idempotent create-or-update keyed by mint.
    fn upsert(&self, record: &TokenRecord) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn update_migration(
        &self,
        mint: &str,
        migrated: bool,
        migrated_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Store selected at startup.
#[derive(Clone)]
pub enum Store {
    Postgres(PostgresClient),
    Memory(MemoryStore),
}

impl Store {
    /// Connects and migrates PostgreSQL when configured, otherwise (or when
    /// the database is unreachable) falls back to the in-memory store.
    pub async fn connect(settings: &Settings) -> Self {
        let Some(pg_settings) = settings.postgres.as_ref() else {
            info!("No PostgreSQL configured, using in-memory store");
            return Store::Memory(MemoryStore::new());
        };

        let client = match PostgresClient::new(pg_settings).await {
            Ok(client) => client,
            Err(e) => {
                warn!("{:#}. Falling back to in-memory store", e);
                return Store::Memory(MemoryStore::new());
            },
        };

        if let Err(e) = client.migrate().await {
            warn!("PostgreSQL migration failed: {:#}. Falling back to in-memory store", e);
            return Store::Memory(MemoryStore::new());
        }

        Store::Postgres(client)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }
}

impl TokenStore for Store {
    async fn load_all(&self, limit: usize) -> anyhow::Result<Vec<TokenRecord>> {
        match self {
            Store::Postgres(client) => client.load_tokens(limit as i64).await,
            Store::Memory(store) => store.load_all(limit).await,
        }
    }

    async fn upsert(&self, record: &TokenRecord) -> anyhow::Result<()> {
        match self {
            Store::Postgres(client) => client.upsert_token(record).await,
            Store::Memory(store) => store.upsert(record).await,
        }
    }

    async fn update_migration(
        &self,
        mint: &str,
        migrated: bool,
        migrated_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        match self {
            Store::Postgres(client) => {
                let updated = client.update_migration(mint, migrated, migrated_at).await?;
                if updated == 0 {
                    log::debug!("Migration for unknown mint {} not stored", mint);
                }
                Ok(())
            },
            Store::Memory(store) => store.update_migration(mint, migrated, migrated_at).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_postgres_section_uses_memory() {
        let store = Store::connect(&Settings::default()).await;
        assert_eq!(store.kind(), "memory");
    }
}
