use anyhow::Context;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

use launchwatch::{PostgresClient, Settings};

const RECENT_TOKENS: i64 = 5;

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("Failed to initialize logger")?;

    let settings = Settings::new().context("Failed to load config")?;
    let pg_settings = settings
        .postgres
        .as_ref()
        .context("No postgres section configured, nothing to check")?;

    let client = PostgresClient::new(pg_settings).await?;
    client.health_check().await?;

    let tokens = client.count_tokens().await?;
    let links = client.count_content_links().await?;
    info!("Total tokens in database: {}", tokens);
    info!("Total content links in database: {}", links);

    let recent = client.recent_tokens(RECENT_TOKENS).await?;
    info!("Recent tokens:");
    for token in recent {
        info!(
            "  {} ({}) {} created {} migrated={} links={}",
            token.name, token.symbol, token.mint, token.created_at, token.migrated, token.link_count
        );
    }

    Ok(())
}
