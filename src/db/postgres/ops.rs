use chrono::{DateTime, Utc};
use log::{error, warn};
use rustc_hash::FxHashMap;

use crate::db::models::{ContentLink, LinkKind, TokenMetadata, TokenRecord, TokenSummary};
use crate::db::postgres::PostgresClient;
use crate::utils::sanitize_string;

impl PostgresClient {
    // ==================== TOKENS ====================

    /// Most recent tokens with their content links, newest first
    pub async fn load_tokens(&self, limit: i64) -> anyhow::Result<Vec<TokenRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                id, mint, name, symbol, uri, metadata_resolved, description, image_url,
                volume, migrated, migration_at, created_at
            FROM launchwatch.tokens
            ORDER BY created_at DESC
            LIMIT $1
        "#;

        let rows = client.query(query, &[&limit]).await?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.get("id")).collect();
        let link_rows = client
            .query(
                r#"
                SELECT token_id, url, kind
                FROM launchwatch.content_links
                WHERE token_id = ANY($1)
                ORDER BY id
                "#,
                &[&ids],
            )
            .await?;

        let mut links: FxHashMap<i64, Vec<ContentLink>> = FxHashMap::default();
        for row in &link_rows {
            let kind: String = row.get("kind");
            let Some(kind) = LinkKind::parse(&kind) else {
                warn!("Skipping content link with unknown kind {}", kind);
                continue;
            };
            links.entry(row.get("token_id")).or_default().push(ContentLink {
                url: row.get("url"),
                kind,
            });
        }

        let records = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                row_to_token_record(row, links.get(&id).map(Vec::as_slice).unwrap_or_default())
            })
            .collect();

        Ok(records)
    }

    /// Create-or-update keyed by mint, then attach any new content links.
    ///
    /// Migration never moves backwards and the first creation time is kept.
    /// A failing link insert is logged and skipped.
    pub async fn upsert_token(&self, record: &TokenRecord) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO launchwatch.tokens AS t (
                mint, name, symbol, uri, metadata_resolved, description, image_url,
                volume, migrated, migration_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (mint) DO UPDATE SET
                name = EXCLUDED.name,
                symbol = EXCLUDED.symbol,
                uri = EXCLUDED.uri,
                metadata_resolved = t.metadata_resolved OR EXCLUDED.metadata_resolved,
                description = CASE WHEN EXCLUDED.metadata_resolved THEN EXCLUDED.description ELSE t.description END,
                image_url = CASE WHEN EXCLUDED.metadata_resolved THEN EXCLUDED.image_url ELSE t.image_url END,
                volume = EXCLUDED.volume,
                migrated = t.migrated OR EXCLUDED.migrated,
                migration_at = COALESCE(t.migration_at, EXCLUDED.migration_at)
            RETURNING id
        "#;

        let metadata = record.metadata.as_ref();
        let uri = record.descriptor_uri.as_deref().map(sanitize_string);
        let description = metadata
            .and_then(|m| m.description.as_deref())
            .map(sanitize_string);
        let image = metadata.and_then(|m| m.image.as_deref()).map(sanitize_string);

        let row = client
            .query_one(
                query,
                &[
                    &sanitize_string(&record.mint),
                    &sanitize_string(&record.name),
                    &sanitize_string(&record.symbol),
                    &uri,
                    &metadata.is_some(),
                    &description,
                    &image,
                    &record.volume,
                    &record.migrated,
                    &record.migrated_at,
                    &record.observed_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to upsert token {}: {:?}", record.mint, e);
                e
            })?;
        let token_id: i64 = row.get("id");

        let Some(metadata) = metadata else {
            return Ok(());
        };

        for link in ContentLink::from_metadata(metadata) {
            let result = client
                .execute(
                    r#"
                    INSERT INTO launchwatch.content_links (token_id, url, kind)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (token_id, url) DO NOTHING
                    "#,
                    &[&token_id, &sanitize_string(&link.url), &link.kind.as_str()],
                )
                .await;

            if let Err(e) = result {
                warn!(
                    "Failed to store {} link for {}: {:?}",
                    link.kind.as_str(),
                    record.mint,
                    e
                );
            }
        }

        Ok(())
    }

    /// Targeted migration update. Returns the number of rows touched
    /// (0 when the mint was never stored).
    pub async fn update_migration(
        &self,
        mint: &str,
        migrated: bool,
        migrated_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE launchwatch.tokens
                SET migrated = migrated OR $2,
                    migration_at = COALESCE(migration_at, $3)
                WHERE mint = $1
                "#,
                &[&mint, &migrated, &migrated_at],
            )
            .await?;

        Ok(updated)
    }

    // ==================== STATS ====================

    pub async fn count_tokens(&self) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS count FROM launchwatch.tokens", &[])
            .await?;
        Ok(row.get("count"))
    }

    pub async fn count_content_links(&self) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS count FROM launchwatch.content_links", &[])
            .await?;
        Ok(row.get("count"))
    }

    pub async fn recent_tokens(&self, limit: i64) -> anyhow::Result<Vec<TokenSummary>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                t.mint, t.name, t.symbol, t.created_at, t.migrated,
                COUNT(l.id) AS link_count
            FROM launchwatch.tokens t
            LEFT JOIN launchwatch.content_links l ON l.token_id = t.id
            GROUP BY t.id
            ORDER BY t.created_at DESC
            LIMIT $1
        "#;

        let rows = client.query(query, &[&limit]).await?;
        let summaries = rows
            .iter()
            .map(|row| TokenSummary {
                mint: row.get("mint"),
                name: row.get("name"),
                symbol: row.get("symbol"),
                created_at: row.get("created_at"),
                migrated: row.get("migrated"),
                link_count: row.get("link_count"),
            })
            .collect();

        Ok(summaries)
    }
}

// ==================== HELPER FUNCTIONS ====================

fn row_to_token_record(row: &tokio_postgres::Row, links: &[ContentLink]) -> TokenRecord {
    let name: String = row.get("name");
    let symbol: String = row.get("symbol");

    let metadata_resolved: bool = row.get("metadata_resolved");
    let metadata = metadata_resolved.then(|| {
        let mut metadata = TokenMetadata::new(name.clone(), symbol.clone());
        metadata.description = row.get("description");
        metadata.image = row.get("image_url");
        for link in links {
            link.apply_to(&mut metadata);
        }
        metadata
    });

    TokenRecord {
        mint: row.get("mint"),
        name,
        symbol,
        descriptor_uri: row.get("uri"),
        metadata,
        observed_at: row.get("created_at"),
        volume: row.get("volume"),
        migrated: row.get("migrated"),
        migrated_at: row.get("migration_at"),
    }
}
