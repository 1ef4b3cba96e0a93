use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{debug, error, info, LevelFilter};
use rustc_hash::FxHashSet;
use simple_logger::SimpleLogger;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use launchwatch::{
    db::PersistMessage,
    grouping::ContentType,
    worker::{Control, FeedStatus},
    EmbedProxy, EmbedResult, FeedManager, GroupView, IngestPipeline, MetadataFetcher,
    PersistenceWriter, Settings, Store, WebSocketTransport,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("Failed to initialize logger")?;

    let settings = Arc::new(
        Settings::new().context("Failed to load config. Please ensure config.yaml is valid")?,
    );

    let transport = WebSocketTransport::new(&settings.feed.url).context("Invalid feed configuration")?;
    let http_timeout = Duration::from_secs(settings.metadata.timeout_secs);
    let metadata = MetadataFetcher::new(http_timeout)?;
    let embed = EmbedProxy::new(&settings.embed, http_timeout)?;

    let store = Store::connect(&settings).await;
    info!("Using {} token store", store.kind());

    let cancellation_token = CancellationToken::new();

    let (persist_tx, persist_rx) = mpsc::channel::<PersistMessage>(1024);
    let (raw_tx, raw_rx) = mpsc::channel::<String>(1024);
    let (control_tx, control_rx) = mpsc::channel::<Control>(8);

    // Persistence writer: applies store writes in order
    let writer = PersistenceWriter::new(store.clone(), persist_rx);
    let writer_token = cancellation_token.child_token();
    let writer_handle = tokio::spawn(async move {
        if let Err(e) = writer.run(writer_token).await {
            error!("Persistence writer failed: {:#}", e);
        }
    });

    // Pipeline: sole owner of the working set
    let mut pipeline = IngestPipeline::new(metadata, settings.working_set.capacity, persist_tx);
    pipeline.bootstrap(&store).await;
    let view_rx = pipeline.subscribe();

    let pipeline_token = cancellation_token.child_token();
    let pipeline_handle = tokio::spawn(async move {
        if let Err(e) = pipeline.run(raw_rx, control_rx, pipeline_token).await {
            error!("Ingest pipeline failed: {:#}", e);
        }
    });

    let mut feed = FeedManager::new(transport, &settings.feed, raw_tx);
    let status_rx = feed.subscribe();
    let feed_token = cancellation_token.child_token();
    let feed_handle = tokio::spawn(async move {
        let state = feed.run(feed_token).await;
        info!("Feed connection manager finished in state {:?}", state);
    });

    info!("Feed connection manager started for {}", settings.feed.url);

    let view_token = cancellation_token.child_token();
    let view_handle = tokio::spawn(report_view(view_rx, status_rx, embed, view_token));

    wait_for_shutdown(control_tx).await?;

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for feed connection manager to stop...");
    let _ = feed_handle.await;

    info!("Waiting for ingest pipeline to stop...");
    let _ = pipeline_handle.await;

    info!("Waiting for persistence writer to flush...");
    let _ = writer_handle.await;
    let _ = view_handle.await;

    info!("All tasks stopped");
    Ok(())
}

/// Blocks until Ctrl+C or SIGTERM. SIGUSR1 toggles the live view pause.
#[cfg(unix)]
async fn wait_for_shutdown(control_tx: mpsc::Sender<Control>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm_stream =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigusr1_stream =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;

    info!("Service running. Press Ctrl+C to stop, send SIGUSR1 to pause/resume the live view.");

    let mut paused = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
                return Ok(());
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
                return Ok(());
            },
            _ = sigusr1_stream.recv() => {
                paused = !paused;
                let command = if paused { Control::Pause } else { Control::Resume };
                if control_tx.send(command).await.is_err() {
                    error!("Ingest pipeline is not running, cannot apply {:?}", command);
                }
            },
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_control_tx: mpsc::Sender<Control>) -> anyhow::Result<()> {
    info!("Service running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
    Ok(())
}

/// Logs every published view and resolves embeds for newly seen content.
async fn report_view(
    mut view_rx: watch::Receiver<Arc<GroupView>>,
    status_rx: watch::Receiver<FeedStatus>,
    embed: EmbedProxy,
    cancellation_token: CancellationToken,
) {
    let mut seen: FxHashSet<String> = FxHashSet::default();

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            },
        }

        let view = view_rx.borrow_and_update().clone();
        let status = status_rx.borrow().clone();
        info!(
            "{} tokens, {} groups ({} migrated, {} new) | {} tweets, {} videos, {} other | feed {:?}",
            view.record_count,
            view.groups.len(),
            view.migrated_groups().len(),
            view.new_groups().len(),
            view.tweets().len(),
            view.videos().len(),
            view.other_content().len(),
            status.state
        );

        for group in &view.groups {
            if !seen.insert(group.content_url.clone()) {
                continue;
            }
            if !group.embeddable
                || !matches!(
                    group.content_type,
                    ContentType::Twitter | ContentType::Tiktok | ContentType::Instagram
                )
            {
                continue;
            }

            match embed.fetch(&group.content_url, group.content_type).await {
                EmbedResult::Embed(_) => debug!("Embed ready for {}", group.content_url),
                EmbedResult::Fallback { url, reason } => {
                    debug!("Embed unavailable for {}: {}", url, reason)
                },
                EmbedResult::Unsupported => {},
            }
        }

        // Forget links that left the working set
        seen.retain(|url| view.groups.iter().any(|g| &g.content_url == url));
    }
}
