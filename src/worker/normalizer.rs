use chrono::{DateTime, Utc};
use log::debug;

use crate::db::models::TokenRecord;
use crate::worker::metadata_fetcher::MetadataSource;
use crate::worker::parser::{self, DecodeError, FeedEvent, ParsedMessage};

/// Canonical event produced from one feed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    /// Fresh record, enriched with metadata when the descriptor resolved
    NewLaunch(TokenRecord),
    /// Partial update: `migrated = true`, `migrated_at = at`
    Migration { mint: String, at: DateTime<Utc> },
}

impl NormalizedEvent {
    pub fn mint(&self) -> &str {
        match self {
            NormalizedEvent::NewLaunch(record) => &record.mint,
            NormalizedEvent::Migration { mint, .. } => mint,
        }
    }
}

/// Turns decoded feed events into working-set updates.
///
/// The descriptor fetch is the only suspension point; it is attempted once
/// and its absence never holds back the launch event.
pub struct Normalizer<M> {
    metadata: M,
}

impl<M: MetadataSource> Normalizer<M> {
    pub fn new(metadata: M) -> Self {
        Self { metadata }
    }

    pub async fn normalize(&self, event: FeedEvent) -> NormalizedEvent {
        match event {
            FeedEvent::NewLaunch(launch) => {
                let metadata = match launch.uri.as_deref() {
                    Some(uri) => self.metadata.fetch(uri).await,
                    None => None,
                };

                let record = TokenRecord::new(launch.mint, launch.name, launch.symbol, Utc::now())
                    .with_descriptor_uri(launch.uri)
                    .with_volume(launch.initial_buy)
                    .with_metadata(metadata);

                NormalizedEvent::NewLaunch(record)
            },
            FeedEvent::Migration(migration) => NormalizedEvent::Migration {
                mint: migration.mint,
                at: Utc::now(),
            },
        }
    }

    /// Decodes and normalizes one raw frame.
    ///
    /// Acknowledgements and unrecognized frames produce no events and are
    /// only logged.
    pub async fn normalize_text(&self, text: &str) -> Vec<NormalizedEvent> {
        let events = match parser::parse_message(text) {
            Ok(ParsedMessage::Events(events)) => events,
            Ok(ParsedMessage::Ack(message)) => {
                debug!("Feed acknowledged: {}", message);
                return Vec::new();
            },
            Err(DecodeError::Unrecognized) => {
                debug!("Discarding unrecognized feed message: {}", text);
                return Vec::new();
            },
            Err(e) => {
                debug!("Discarding malformed feed message ({}): {}", e, text);
                return Vec::new();
            },
        };

        let mut normalized = Vec::with_capacity(events.len());
        for event in events {
            normalized.push(self.normalize(event).await);
        }
        normalized
    }
}
