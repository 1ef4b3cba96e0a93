use std::time::Duration;

use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

const SCHEMA_PATH: &str = "schema/postgres.sql";
const CONNECT_ATTEMPTS: u32 = 3;

/// Splits a schema script on `;`, ignoring semicolons inside `$$` bodies.
/// Blank statements are dropped.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_body = false;
    let mut start = 0;
    let mut rest = sql.char_indices().peekable();

    while let Some((i, c)) = rest.next() {
        match c {
            '$' if rest.peek().map(|&(_, next)| next) == Some('$') => {
                rest.next();
                in_body = !in_body;
            },
            ';' if !in_body => {
                statements.push(&sql[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    statements.push(&sql[start..]);

    statements.retain(|stmt| !stmt.trim().is_empty());
    statements
}

/// PostgreSQL client with connection pooling.
///
/// Durable home of token records and their content links. Uses
/// `deadpool-postgres` for connection management.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: &PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL at {}:{}", settings.host, settings.port);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        let mut attempt = 1;
        loop {
            match pool.get().await {
                Ok(_) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self { pool });
                },
                Err(e) if attempt >= CONNECT_ATTEMPTS => {
                    return Err(e).with_context(|| {
                        format!("Failed to connect to PostgreSQL after {} attempts", attempt)
                    });
                },
                Err(e) => {
                    let delay = Duration::from_millis(200 << (attempt - 1));
                    warn!(
                        "PostgreSQL connect attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, CONNECT_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }

    /// Round-trips `SELECT 1` on a pooled connection.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }

    /// Applies the idempotent schema script statement by statement.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string(SCHEMA_PATH)
            .await
            .with_context(|| format!("Failed to read {}", SCHEMA_PATH))?;

        for stmt in split_sql_statements(&schema).into_iter().map(str::trim) {
            client
                .execute(stmt, &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL schema applied successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_statements() {
        let sql = "CREATE TABLE a (id INT);\n\nCREATE INDEX i ON a (id);\n  ;\nSELECT 1";
        let statements: Vec<&str> = split_sql_statements(sql).into_iter().map(str::trim).collect();
        assert_eq!(
            statements,
            ["CREATE TABLE a (id INT)", "CREATE INDEX i ON a (id)", "SELECT 1"]
        );
    }

    #[test]
    fn test_split_keeps_dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS TRIGGER AS $$\nBEGIN\n  NEW.x = 1;\n  RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql;\nSELECT 2;";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("RETURN NEW;"));
        assert!(statements[0].trim_end().ends_with("plpgsql"));
        assert_eq!(statements[1].trim(), "SELECT 2");
    }

    #[test]
    fn test_schema_file_splits_cleanly() {
        let schema = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/schema/postgres.sql")).unwrap();
        let statements = split_sql_statements(&schema);
        assert!(statements.iter().any(|s| s.contains("launchwatch.tokens (")));
        assert!(statements.iter().any(|s| s.contains("UNIQUE (token_id, url)")));
        // Trigger function body stays in one piece
        assert!(statements
            .iter()
            .any(|s| s.contains("NEW.updated_at = NOW();") && s.contains("plpgsql")));
    }
}
