//! Decoding of raw feed frames into typed events.
//!
//! Inbound frames are untyped JSON objects. Each one is validated field by
//! field and turned into zero or more `FeedEvent`s; anything else is reported
//! as a `DecodeError` for the caller to log and drop.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::non_empty;

/// Discriminator value marking a migration frame.
pub const MIGRATION_TYPE: &str = "migration";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("unrecognized message shape")]
    Unrecognized,
}

/// A token launch as announced by the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchMessage {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub uri: Option<String>,
    /// Initial activity (`initialBuy`), 0 when absent
    pub initial_buy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationMessage {
    pub mint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    NewLaunch(LaunchMessage),
    Migration(MigrationMessage),
}

impl FeedEvent {
    pub fn mint(&self) -> &str {
        match self {
            FeedEvent::NewLaunch(m) => &m.mint,
            FeedEvent::Migration(m) => &m.mint,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// A launch and/or a migration. A frame carrying both shapes yields the
    /// launch first.
    Events(Vec<FeedEvent>),
    /// Subscription acknowledgement (`{"message": "..."}`)
    Ack(String),
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    non_empty(obj.get(key).and_then(Value::as_str))
}

fn parse_launch(obj: &Map<String, Value>) -> Option<LaunchMessage> {
    let (mint, name, symbol) = (
        str_field(obj, "mint")?,
        str_field(obj, "name")?,
        str_field(obj, "symbol")?,
    );

    let initial_buy = obj
        .get("initialBuy")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);

    Some(LaunchMessage {
        mint: mint.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        uri: str_field(obj, "uri").map(str::to_string),
        initial_buy,
    })
}

fn parse_migration(obj: &Map<String, Value>) -> Option<MigrationMessage> {
    if obj.get("type").and_then(Value::as_str) != Some(MIGRATION_TYPE) {
        return None;
    }
    Some(MigrationMessage {
        mint: str_field(obj, "mint")?.to_string(),
    })
}

/// Classifies one raw feed frame.
pub fn parse_message(text: &str) -> Result<ParsedMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let mut events = Vec::with_capacity(1);
    if let Some(launch) = parse_launch(&obj) {
        events.push(FeedEvent::NewLaunch(launch));
    }
    if let Some(migration) = parse_migration(&obj) {
        events.push(FeedEvent::Migration(migration));
    }
    if !events.is_empty() {
        return Ok(ParsedMessage::Events(events));
    }

    match str_field(&obj, "message") {
        Some(message) => Ok(ParsedMessage::Ack(message.to_string())),
        None => Err(DecodeError::Unrecognized),
    }
}
