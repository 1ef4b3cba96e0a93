use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::non_empty;

/// Structured metadata resolved from a token's descriptor document.
///
/// Every field is optional on the wire; documents are extracted best-effort.
/// Unknown fields are ignored, and null or non-string values read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub image: Option<String>,

    // Social links
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub twitter: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub telegram: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub website: Option<String>,
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

impl TokenMetadata {
    pub fn new(name: String, symbol: String) -> Self {
        Self {
            name,
            symbol,
            ..Default::default()
        }
    }

    /// First present link in grouping priority order: twitter, telegram, website.
    /// Blank strings count as absent.
    pub fn primary_link(&self) -> Option<&str> {
        non_empty(self.twitter.as_deref())
            .or_else(|| non_empty(self.telegram.as_deref()))
            .or_else(|| non_empty(self.website.as_deref()))
    }
}

/// One token-launch observation (working set entry and durable row).
///
/// Primary Key: mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    // Primary key
    pub mint: String,

    // Feed-supplied display fields
    pub name: String,
    pub symbol: String,
    pub descriptor_uri: Option<String>,

    // Resolved after the initial observation
    pub metadata: Option<TokenMetadata>,

    // Ingestion time, not feed-provided
    pub observed_at: DateTime<Utc>,
    pub volume: f64,

    // Migration state (one-way)
    pub migrated: bool,
    pub migrated_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Constructor for a fresh launch observation (used by the normalizer)
    pub fn new(mint: String, name: String, symbol: String, observed_at: DateTime<Utc>) -> Self {
        Self {
            mint,
            name,
            symbol,
            descriptor_uri: None,
            metadata: None,
            observed_at,
            volume: 0.0,
            migrated: false,
            migrated_at: None,
        }
    }

    pub fn with_descriptor_uri(mut self, uri: Option<String>) -> Self {
        self.descriptor_uri = uri;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<TokenMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Marks the record migrated. `migrated_at` is set exactly once; later
    /// calls leave the first timestamp in place.
    pub fn mark_migrated(&mut self, at: DateTime<Utc>) {
        self.migrated = true;
        if self.migrated_at.is_none() {
            self.migrated_at = Some(at);
        }
    }

    /// Replaces the mutable fields with those of a newer observation of the
    /// same mint.
    ///
    /// `observed_at` keeps the first ingestion time, migration state only
    /// moves forward, and metadata is only replaced when the newer
    /// observation carries one.
    pub fn replace_from(&mut self, newer: TokenRecord) {
        debug_assert_eq!(self.mint, newer.mint);

        self.name = newer.name;
        self.symbol = newer.symbol;
        self.descriptor_uri = newer.descriptor_uri;
        self.volume = newer.volume;
        if newer.metadata.is_some() {
            self.metadata = newer.metadata;
        }
        if newer.migrated {
            self.mark_migrated(newer.migrated_at.unwrap_or_else(Utc::now));
        }
    }
}

/// Row summary printed by the database check tool.
#[derive(Debug, Clone)]
pub struct TokenSummary {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub migrated: bool,
    pub link_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_primary_link_priority_and_blank_links() {
        let mut metadata = TokenMetadata::new("Foo".into(), "FOO".into());
        assert_eq!(metadata.primary_link(), None);

        metadata.website = Some("https://foo.io".into());
        metadata.telegram = Some("   ".into());
        assert_eq!(metadata.primary_link(), Some("https://foo.io"));

        metadata.telegram = Some("https://t.me/foo".into());
        assert_eq!(metadata.primary_link(), Some("https://t.me/foo"));

        metadata.twitter = Some("https://x.com/foo".into());
        assert_eq!(metadata.primary_link(), Some("https://x.com/foo"));
    }

    #[test]
    fn test_metadata_document_is_extracted_best_effort() {
        let doc = r#"{
            "name": "Foo",
            "symbol": "FOO",
            "twitter": "https://x.com/foo/status/1",
            "createdOn": "https://pump.fun",
            "showName": true
        }"#;
        let metadata: TokenMetadata = serde_json::from_str(doc).unwrap();
        assert_eq!(metadata.name, "Foo");
        assert_eq!(metadata.twitter.as_deref(), Some("https://x.com/foo/status/1"));
        assert!(metadata.image.is_none());

        let sparse: TokenMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(sparse, TokenMetadata::default());
    }

    #[test]
    fn test_null_and_mistyped_fields_read_as_absent() {
        let doc = r#"{
            "name": null,
            "symbol": "S",
            "image": ["not", "a", "url"],
            "website": 123,
            "twitter": "https://x.com/a/status/1"
        }"#;
        let metadata: TokenMetadata = serde_json::from_str(doc).unwrap();
        assert_eq!(metadata.name, "");
        assert_eq!(metadata.symbol, "S");
        assert!(metadata.image.is_none());
        assert!(metadata.website.is_none());
        assert_eq!(metadata.primary_link(), Some("https://x.com/a/status/1"));
    }

    #[test]
    fn test_mark_migrated_keeps_first_timestamp() {
        let mut record = TokenRecord::new("A".into(), "Foo".into(), "FOO".into(), ts(10));
        record.mark_migrated(ts(20));
        record.mark_migrated(ts(30));
        assert!(record.migrated);
        assert_eq!(record.migrated_at, Some(ts(20)));
    }

    #[test]
    fn test_replace_from_preserves_first_observation_and_migration() {
        let mut record = TokenRecord::new("A".into(), "Foo".into(), "FOO".into(), ts(10))
            .with_metadata(Some(TokenMetadata::new("Foo".into(), "FOO".into())))
            .with_volume(1.0);
        record.mark_migrated(ts(20));

        let newer = TokenRecord::new("A".into(), "Foo2".into(), "FOO2".into(), ts(50))
            .with_volume(3.5);
        record.replace_from(newer);

        assert_eq!(record.name, "Foo2");
        assert_eq!(record.volume, 3.5);
        assert_eq!(record.observed_at, ts(10));
        assert!(record.metadata.is_some());
        assert!(record.migrated);
        assert_eq!(record.migrated_at, Some(ts(20)));
    }
}
