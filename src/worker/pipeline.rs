use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::db::{PersistMessage, TokenStore};
use crate::grouping::GroupView;
use crate::worker::metadata_fetcher::MetadataSource;
use crate::worker::normalizer::{NormalizedEvent, Normalizer};
use crate::worker::working_set::{Upsert, WorkingSet};

/// Commands accepted by a running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Stop updating the group view; keep ingesting and persisting
    Pause,
    /// Apply everything deferred while paused, in arrival order
    Resume,
}

/// Single writer over the working set.
///
/// Raw frames are normalized one at a time in arrival order, forwarded to the
/// persistence writer, merged into the working set, and the regrouped view
/// is published to watchers.
pub struct IngestPipeline<M> {
    normalizer: Normalizer<M>,
    working_set: WorkingSet,
    persist_sender: mpsc::Sender<PersistMessage>,
    view: watch::Sender<Arc<GroupView>>,
    paused: bool,
    deferred: VecDeque<NormalizedEvent>,
    /// Working set changed while paused without a view being published
    unpublished: bool,
}

impl<M: MetadataSource> IngestPipeline<M> {
    pub fn new(metadata: M, capacity: usize, persist_sender: mpsc::Sender<PersistMessage>) -> Self {
        let (view, _) = watch::channel(Arc::new(GroupView::default()));
        Self {
            normalizer: Normalizer::new(metadata),
            working_set: WorkingSet::new(capacity),
            persist_sender,
            view,
            paused: false,
            deferred: VecDeque::new(),
            unpublished: false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<GroupView>> {
        self.view.subscribe()
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Replaces the working set with the stored history.
    ///
    /// A failing store leaves the working set empty; the live feed fills it.
    pub async fn bootstrap<S: TokenStore>(&mut self, store: &S) {
        match store.load_all(self.working_set.capacity()).await {
            Ok(records) => {
                info!("Loaded {} stored tokens", records.len());
                self.working_set.replace_all(records);
            },
            Err(e) => warn!("Failed to load stored tokens, starting empty: {:#}", e),
        }
        self.publish();
    }

    pub async fn run(
        mut self,
        mut raw_receiver: mpsc::Receiver<String>,
        mut control_receiver: mpsc::Receiver<Control>,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => {
                    info!("Ingest pipeline received cancellation signal");
                    break;
                }

                Some(command) = control_receiver.recv() => self.control(command),

                msg = raw_receiver.recv() => {
                    match msg {
                        Some(text) => self.ingest(&text).await,
                        None => {
                            info!("Feed channel closed");
                            break;
                        }
                    }
                }
            }
        }

        if self.persist_sender.send(PersistMessage::Shutdown).await.is_err() {
            debug!("Persistence writer already stopped");
        }
        info!("Ingest pipeline stopped");
        Ok(())
    }

    pub fn control(&mut self, command: Control) {
        match command {
            Control::Pause if !self.paused => {
                info!("Live view paused");
                self.paused = true;
            },
            Control::Resume if self.paused => {
                self.paused = false;
                let pending = self.deferred.len();
                let mut changed = std::mem::take(&mut self.unpublished);
                while let Some(event) = self.deferred.pop_front() {
                    changed |= self.apply(event);
                }
                info!("Live view resumed, applied {} deferred events", pending);
                if changed {
                    self.publish();
                }
            },
            _ => {},
        }
    }

    /// Normalizes one raw frame and applies its events.
    pub async fn ingest(&mut self, text: &str) {
        for event in self.normalizer.normalize_text(text).await {
            self.persist(&event).await;

            if self.paused {
                self.defer(event);
            } else if self.apply(event) {
                self.publish();
            }
        }
    }

    async fn persist(&self, event: &NormalizedEvent) {
        let msg = match event {
            NormalizedEvent::NewLaunch(record) => PersistMessage::Upsert(record.clone()),
            NormalizedEvent::Migration { mint, at } => PersistMessage::Migration {
                mint: mint.clone(),
                migrated: true,
                migrated_at: Some(*at),
            },
        };

        if self.persist_sender.send(msg).await.is_err() {
            warn!("Persistence writer is gone, {} not persisted", event.mint());
        }
    }

    /// Queues an event until resume. On overflow the oldest queued event is
    /// merged into the working set without publishing, so nothing is lost.
    fn defer(&mut self, event: NormalizedEvent) {
        if self.deferred.len() >= self.working_set.capacity() {
            if let Some(oldest) = self.deferred.pop_front() {
                debug!("Deferred queue full, applying update for {} unpublished", oldest.mint());
                self.unpublished |= self.apply(oldest);
            }
        }
        self.deferred.push_back(event);
    }

    /// Merges one event into the working set. Returns whether it changed.
    fn apply(&mut self, event: NormalizedEvent) -> bool {
        match event {
            NormalizedEvent::NewLaunch(record) => {
                let mint = record.mint.clone();
                match self.working_set.upsert(record) {
                    Upsert::Inserted { evicted } => {
                        for old in evicted {
                            debug!("Evicted {} from working set", old.mint);
                        }
                        debug!("New token {}", mint);
                    },
                    Upsert::Replaced => debug!("Updated token {}", mint),
                }
                true
            },
            NormalizedEvent::Migration { mint, at } => {
                let Some(existing) = self.working_set.get(&mint) else {
                    debug!("Migration for {} outside the working set", mint);
                    return false;
                };
                if existing.migrated {
                    return false;
                }

                let mut updated = existing.clone();
                updated.mark_migrated(at);
                self.working_set.upsert(updated);
                info!("Token {} migrated", mint);
                true
            },
        }
    }

    fn publish(&self) {
        let view = GroupView::from_records(&self.working_set.records());
        self.view.send_replace(Arc::new(view));
    }
}
