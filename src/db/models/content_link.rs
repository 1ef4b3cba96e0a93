use serde::{Deserialize, Serialize};

use crate::db::models::TokenMetadata;
use crate::utils::non_empty;

/// Which metadata slot a persisted link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Twitter,
    Telegram,
    Website,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Twitter => "twitter",
            LinkKind::Telegram => "telegram",
            LinkKind::Website => "website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "twitter" => Some(LinkKind::Twitter),
            "telegram" => Some(LinkKind::Telegram),
            "website" => Some(LinkKind::Website),
            _ => None,
        }
    }
}

/// Social link attached to a token (PostgreSQL)
///
/// Unique Key: (token_id, url)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLink {
    pub url: String,
    pub kind: LinkKind,
}

impl ContentLink {
    /// Links carried by a metadata record, in twitter, telegram, website order.
    pub fn from_metadata(metadata: &TokenMetadata) -> Vec<ContentLink> {
        [
            (LinkKind::Twitter, metadata.twitter.as_deref()),
            (LinkKind::Telegram, metadata.telegram.as_deref()),
            (LinkKind::Website, metadata.website.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, url)| {
            non_empty(url).map(|url| ContentLink {
                url: url.to_string(),
                kind,
            })
        })
        .collect()
    }

    /// Writes this link back into the matching metadata slot.
    /// The first link of a kind wins.
    pub fn apply_to(&self, metadata: &mut TokenMetadata) {
        let slot = match self.kind {
            LinkKind::Twitter => &mut metadata.twitter,
            LinkKind::Telegram => &mut metadata.telegram,
            LinkKind::Website => &mut metadata.website,
        };
        if slot.is_none() {
            *slot = Some(self.url.clone());
        }
    }
}
