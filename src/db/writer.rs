use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::db::models::TokenRecord;
use crate::db::TokenStore;

pub enum PersistMessage {
    /// Create-or-update keyed by mint
    Upsert(TokenRecord),
    /// Targeted migration update
    Migration {
        mint: String,
        migrated: bool,
        migrated_at: Option<DateTime<Utc>>,
    },
    /// Shutdown signal
    Shutdown,
}

/// Applies persistence requests in arrival order.
///
/// The pipeline never waits on the store: writes are queued here and a
/// failing write is logged and dropped.
pub struct PersistenceWriter<S> {
    store: S,
    receiver: mpsc::Receiver<PersistMessage>,
}

impl<S: TokenStore> PersistenceWriter<S> {
    pub fn new(store: S, receiver: mpsc::Receiver<PersistMessage>) -> Self {
        Self { store, receiver }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;

                msg = self.receiver.recv() => {
                    match msg {
                        Some(PersistMessage::Shutdown) => {
                            info!("Persistence writer received shutdown signal");
                            break;
                        }
                        Some(msg) => self.apply(msg).await,
                        None => {
                            info!("Persistence writer channel closed");
                            break;
                        }
                    }
                }

                _ = cancellation_token.cancelled() => {
                    info!("Persistence writer received cancellation signal");
                    // Flush what the pipeline already queued
                    while let Ok(msg) = self.receiver.try_recv() {
                        if matches!(msg, PersistMessage::Shutdown) {
                            break;
                        }
                        self.apply(msg).await;
                    }
                    break;
                }
            }
        }

        info!("Persistence writer stopped");
        Ok(())
    }

    async fn apply(&self, msg: PersistMessage) {
        match msg {
            PersistMessage::Upsert(record) => {
                if let Err(e) = self.store.upsert(&record).await {
                    warn!("Failed to persist token {}: {:#}", record.mint, e);
                }
            },
            PersistMessage::Migration {
                mint,
                migrated,
                migrated_at,
            } => {
                if let Err(e) = self.store.update_migration(&mint, migrated, migrated_at).await {
                    warn!("Failed to persist migration for {}: {:#}", mint, e);
                }
            },
            PersistMessage::Shutdown => {},
        }
    }
}
