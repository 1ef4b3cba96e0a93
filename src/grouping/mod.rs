//! Grouping engine: partitions the working set by content link.
//!
//! The output is a pure projection of the records it is given. It is
//! recomputed from scratch on every working-set change and never persisted.

mod content_type;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::db::models::TokenRecord;

pub use content_type::{detect, ContentInfo, ContentType};

/// Tokens sharing one content link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentGroup {
    pub content_url: String,
    pub content_type: ContentType,
    pub embeddable: bool,
    pub embed_url: Option<String>,
    /// First-seen order within the group
    pub members: Vec<TokenRecord>,
    /// Most recent `migrated_at` among migrated members
    pub latest_migration: Option<DateTime<Utc>>,
}

impl ContentGroup {
    fn new(content_url: String, info: ContentInfo) -> Self {
        Self {
            content_url,
            content_type: info.content_type,
            embeddable: info.embeddable,
            embed_url: info.embed_url,
            members: Vec::new(),
            latest_migration: None,
        }
    }

    fn push(&mut self, record: &TokenRecord) {
        if record.migrated {
            if let Some(at) = record.migrated_at {
                self.latest_migration = Some(self.latest_migration.map_or(at, |cur| cur.max(at)));
            }
        }
        self.members.push(record.clone());
    }

    /// Most recent member observation time.
    pub fn latest_observed(&self) -> Option<DateTime<Utc>> {
        self.members.iter().map(|m| m.observed_at).max()
    }

    pub fn has_migration(&self) -> bool {
        self.latest_migration.is_some()
    }

    /// Embeddable tweet (`/<user>/status/<id>`), shown in its own column.
    pub fn is_tweet(&self) -> bool {
        self.content_type == ContentType::Twitter && self.embeddable
    }

    pub fn is_video(&self) -> bool {
        self.content_type == ContentType::Youtube && self.embeddable
    }
}

/// Group ordering.
///
/// When both groups have a migration, the more recent migration comes first.
/// Otherwise the group with the more recently observed member comes first.
/// This is one comparator over the whole list, not two passes.
pub fn compare_groups(a: &ContentGroup, b: &ContentGroup) -> Ordering {
    match (a.latest_migration, b.latest_migration) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        _ => b.latest_observed().cmp(&a.latest_observed()),
    }
}

/// Stable insertion sort driven by `compare_groups`.
///
/// The comparator is not guaranteed to be transitive across mixed
/// migrated/unmigrated lists, and `slice::sort_by` may panic on such input.
/// Group lists are bounded by the working-set capacity.
fn sort_groups(groups: &mut [ContentGroup]) {
    for i in 1..groups.len() {
        let mut j = i;
        while j > 0 && compare_groups(&groups[j - 1], &groups[j]) == Ordering::Greater {
            groups.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Partitions records by their primary content link.
///
/// Records without metadata, or whose metadata has no link, are left out.
/// Groups are keyed by the exact link string.
pub fn group_by_content(records: &[TokenRecord]) -> Vec<ContentGroup> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut groups: Vec<ContentGroup> = Vec::new();

    for record in records {
        let Some(link) = record.metadata.as_ref().and_then(|m| m.primary_link()) else {
            continue;
        };

        let slot = *index.entry(link).or_insert_with(|| {
            groups.push(ContentGroup::new(link.to_string(), detect(link)));
            groups.len() - 1
        });
        groups[slot].push(record);
    }

    sort_groups(&mut groups);
    groups
}

/// Derived view handed to consumers after every working-set change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupView {
    pub groups: Vec<ContentGroup>,
    /// Working-set size, grouped or not
    pub record_count: usize,
}

impl GroupView {
    pub fn from_records(records: &[TokenRecord]) -> Self {
        Self {
            groups: group_by_content(records),
            record_count: records.len(),
        }
    }

    pub fn migrated_groups(&self) -> Vec<&ContentGroup> {
        self.groups.iter().filter(|g| g.has_migration()).collect()
    }

    pub fn new_groups(&self) -> Vec<&ContentGroup> {
        self.groups.iter().filter(|g| !g.has_migration()).collect()
    }

    pub fn tweets(&self) -> Vec<&ContentGroup> {
        self.groups.iter().filter(|g| g.is_tweet()).collect()
    }

    pub fn videos(&self) -> Vec<&ContentGroup> {
        self.groups.iter().filter(|g| g.is_video()).collect()
    }

    /// Everything that is neither an embeddable tweet nor a video.
    pub fn other_content(&self) -> Vec<&ContentGroup> {
        self.groups
            .iter()
            .filter(|g| !g.is_tweet() && !g.is_video())
            .collect()
    }

    pub fn grouped_record_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TokenMetadata;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(mint: &str, observed: i64, twitter: Option<&str>) -> TokenRecord {
        let metadata = twitter.map(|link| {
            let mut m = TokenMetadata::new(mint.to_string(), mint.to_string());
            m.twitter = Some(link.to_string());
            m
        });
        TokenRecord::new(mint.into(), mint.into(), mint.into(), ts(observed)).with_metadata(metadata)
    }

    fn migrated(mut r: TokenRecord, at: i64) -> TokenRecord {
        r.mark_migrated(ts(at));
        r
    }

    #[test]
    fn test_records_without_links_are_ungrouped() {
        let mut no_links = record("B", 5, None);
        no_links.metadata = Some(TokenMetadata::new("B".into(), "B".into()));
        let records = vec![record("A", 10, None), no_links, record("C", 1, Some("https://x.com/c"))];

        let view = GroupView::from_records(&records);
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.record_count, 3);
        assert_eq!(view.grouped_record_count(), 1);
    }

    #[test]
    fn test_link_priority_picks_twitter_over_telegram_and_website() {
        let mut r = record("A", 1, None);
        let mut m = TokenMetadata::new("A".into(), "A".into());
        m.website = Some("https://a.io".into());
        m.telegram = Some("https://t.me/a".into());
        r.metadata = Some(m.clone());
        let groups = group_by_content(&[r.clone()]);
        assert_eq!(groups[0].content_url, "https://t.me/a");
        assert_eq!(groups[0].content_type, ContentType::Telegram);

        m.twitter = Some("https://x.com/a".into());
        r.metadata = Some(m);
        let groups = group_by_content(&[r]);
        assert_eq!(groups[0].content_url, "https://x.com/a");
    }

    #[test]
    fn test_members_keep_first_seen_order_and_track_latest_migration() {
        let link = "https://x.com/u/status/1";
        let records = vec![
            migrated(record("A", 30, Some(link)), 40),
            record("B", 20, Some(link)),
            migrated(record("C", 10, Some(link)), 50),
        ];
        let groups = group_by_content(&records);
        assert_eq!(groups.len(), 1);
        let mints: Vec<&str> = groups[0].members.iter().map(|m| m.mint.as_str()).collect();
        assert_eq!(mints, ["A", "B", "C"]);
        assert_eq!(groups[0].latest_migration, Some(ts(50)));
        assert_eq!(groups[0].latest_observed(), Some(ts(30)));
        assert!(groups[0].is_tweet());
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let records = vec![
            record("A", 3, Some("https://x.com/a")),
            migrated(record("B", 2, Some("https://x.com/b")), 9),
            record("C", 1, Some("https://x.com/a")),
            migrated(record("D", 4, Some("https://t.me/d")), 7),
        ];
        assert_eq!(group_by_content(&records), group_by_content(&records));
    }

    #[test]
    fn test_both_migrated_sort_by_latest_migration() {
        let records = vec![
            migrated(record("A", 100, Some("https://x.com/a")), 110),
            migrated(record("B", 1, Some("https://x.com/b")), 200),
        ];
        let groups = group_by_content(&records);
        assert_eq!(groups[0].content_url, "https://x.com/b");
        assert_eq!(groups[1].content_url, "https://x.com/a");
    }

    #[test]
    fn test_migrated_group_does_not_outrank_newer_unmigrated_group() {
        // A migrated at T1 with an older member; B unmigrated but observed at T2 > T1.
        let records = vec![
            migrated(record("A", 5, Some("https://x.com/a")), 10),
            record("B", 20, Some("https://x.com/b")),
        ];
        let groups = group_by_content(&records);
        assert_eq!(groups[0].content_url, "https://x.com/b");
        assert_eq!(groups[1].content_url, "https://x.com/a");
    }

    #[test]
    fn test_unmigrated_groups_sort_by_most_recent_member() {
        let records = vec![
            record("A", 1, Some("https://x.com/a")),
            record("B", 5, Some("https://x.com/b")),
            record("C", 9, Some("https://x.com/a")),
        ];
        let groups = group_by_content(&records);
        assert_eq!(groups[0].content_url, "https://x.com/a");
        assert_eq!(groups[1].content_url, "https://x.com/b");
    }

    #[test]
    fn test_equal_groups_keep_first_seen_order() {
        let records = vec![
            record("A", 5, Some("https://x.com/a")),
            record("B", 5, Some("https://x.com/b")),
        ];
        let groups = group_by_content(&records);
        assert_eq!(groups[0].content_url, "https://x.com/a");
    }

    #[test]
    fn test_view_partitions() {
        let records = vec![
            migrated(record("A", 1, Some("https://x.com/u/status/1")), 2),
            record("B", 3, Some("https://youtu.be/abc")),
            record("C", 4, Some("https://x.com/someone")),
        ];
        let view = GroupView::from_records(&records);
        assert_eq!(view.migrated_groups().len(), 1);
        assert_eq!(view.new_groups().len(), 2);
        assert_eq!(view.tweets().len(), 1);
        assert_eq!(view.videos().len(), 1);
        assert_eq!(view.other_content().len(), 1);
        assert_eq!(view.other_content()[0].content_url, "https://x.com/someone");
    }
}
