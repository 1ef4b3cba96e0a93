use std::collections::VecDeque;

use log::debug;

use crate::db::models::TokenRecord;

/// Result of merging one record into the working set.
#[derive(Debug, PartialEq)]
pub enum Upsert {
    /// New mint, inserted at the head. Carries anything evicted from the tail.
    Inserted { evicted: Vec<TokenRecord> },
    /// Existing mint, fields replaced in place
    Replaced,
}

/// Bounded, most-recent-first collection of token records.
///
/// `mint` is unique within the set. Inserting past capacity evicts from the
/// tail (oldest); replacing an existing mint never evicts.
#[derive(Debug)]
pub struct WorkingSet {
    records: VecDeque<TokenRecord>,
    capacity: usize,
}

impl WorkingSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, mint: &str) -> Option<&TokenRecord> {
        self.records.iter().find(|r| r.mint == mint)
    }

    /// Records in working-set order, newest first.
    pub fn records(&self) -> Vec<TokenRecord> {
        self.records.iter().cloned().collect()
    }

    /// Replaces the whole content with a bulk-loaded, newest-first list.
    ///
    /// Duplicate mints keep their first (newest) occurrence and the result is
    /// cut down to capacity.
    pub fn replace_all(&mut self, records: Vec<TokenRecord>) {
        self.records.clear();
        for record in records {
            if self.records.len() == self.capacity {
                break;
            }
            if self.get(&record.mint).is_some() {
                debug!("Skipping duplicate mint {} in bulk load", record.mint);
                continue;
            }
            self.records.push_back(record);
        }
    }

    /// Inserts a new mint at the head or replaces the existing record's
    /// mutable fields.
    pub fn upsert(&mut self, record: TokenRecord) -> Upsert {
        if let Some(existing) = self.records.iter_mut().find(|r| r.mint == record.mint) {
            existing.replace_from(record);
            return Upsert::Replaced;
        }

        self.records.push_front(record);

        let mut evicted = Vec::new();
        while self.records.len() > self.capacity {
            if let Some(oldest) = self.records.pop_back() {
                evicted.push(oldest);
            }
        }
        Upsert::Inserted { evicted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn launch(mint: &str, name: &str, at: i64) -> TokenRecord {
        TokenRecord::new(mint.into(), name.into(), name.to_uppercase(), ts(at))
    }

    #[test]
    fn test_repeat_launch_replaces_in_place() {
        let mut set = WorkingSet::new(100);
        assert!(matches!(set.upsert(launch("A", "foo", 1)), Upsert::Inserted { .. }));
        assert_eq!(set.upsert(launch("A", "bar", 2).with_volume(7.0)), Upsert::Replaced);

        assert_eq!(set.len(), 1);
        let record = set.get("A").unwrap();
        assert_eq!(record.name, "bar");
        assert_eq!(record.volume, 7.0);
        // First ingestion time is kept
        assert_eq!(record.observed_at, ts(1));
    }

    #[test]
    fn test_migration_applied_after_launch() {
        let mut set = WorkingSet::new(100);
        set.upsert(launch("A", "foo", 1));

        let mut updated = set.get("A").cloned().unwrap();
        updated.mark_migrated(ts(5));
        set.upsert(updated.clone());
        set.upsert(updated);

        let record = set.get("A").unwrap();
        assert!(record.migrated);
        assert_eq!(record.migrated_at, Some(ts(5)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_repeat_launch_keeps_migration() {
        let mut set = WorkingSet::new(100);
        let mut first = launch("A", "foo", 1);
        first.mark_migrated(ts(3));
        set.upsert(first);
        set.upsert(launch("A", "foo", 9));

        let record = set.get("A").unwrap();
        assert!(record.migrated);
        assert_eq!(record.migrated_at, Some(ts(3)));
    }

    #[test]
    fn test_bound_evicts_first_inserted() {
        let mut set = WorkingSet::new(100);
        for i in 0..100 {
            let outcome = set.upsert(launch(&format!("m{}", i), "t", i));
            assert_eq!(outcome, Upsert::Inserted { evicted: vec![] });
        }
        let outcome = set.upsert(launch("m100", "t", 100));
        match outcome {
            Upsert::Inserted { evicted } => {
                assert_eq!(evicted.len(), 1);
                assert_eq!(evicted[0].mint, "m0");
            }
            Upsert::Replaced => panic!("expected insert"),
        }

        assert_eq!(set.len(), 100);
        assert!(set.get("m0").is_none());
        assert_eq!(set.records()[0].mint, "m100");
        assert_eq!(set.records()[99].mint, "m1");
    }

    #[test]
    fn test_update_in_place_never_evicts() {
        let mut set = WorkingSet::new(2);
        set.upsert(launch("A", "a", 1));
        set.upsert(launch("B", "b", 2));
        assert_eq!(set.upsert(launch("A", "a2", 3)), Upsert::Replaced);
        assert_eq!(set.len(), 2);
        // Replacement does not move the record to the head
        assert_eq!(set.records()[0].mint, "B");
    }

    #[test]
    fn test_replace_all_dedups_and_caps() {
        let mut set = WorkingSet::new(2);
        set.upsert(launch("Z", "z", 0));
        set.replace_all(vec![
            launch("A", "a", 3),
            launch("A", "a-old", 2),
            launch("B", "b", 1),
            launch("C", "c", 0),
        ]);
        let mints: Vec<String> = set.records().into_iter().map(|r| r.mint).collect();
        assert_eq!(mints, ["A", "B"]);
        assert_eq!(set.get("A").unwrap().name, "a");
    }
}
