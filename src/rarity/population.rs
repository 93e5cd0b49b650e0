//! Historical population queries.
//!
//! A [`Partition`] is one store (closed seasons or the season in progress)
//! and may fail. [`Population`] unions the two partitions and never fails: a
//! partition that cannot be read is logged, contributes nothing, and marks
//! the answer as degraded. Counts can therefore only be undercounted, which
//! biases a degraded result toward looking rarer.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::db::models::{PerformanceRecord, Scope};

use super::bucket::BucketRule;

/// Bucket labels that must all agree for two stat lines to match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchKey(BTreeMap<&'static str, String>);

impl MatchKey {
    pub fn insert(&mut self, bucket: &'static str, label: impl Into<String>) {
        self.0.insert(bucket, label.into());
    }

    pub fn get(&self, bucket: &str) -> Option<&str> {
        self.0.get(bucket).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(b, l)| (*b, l.as_str()))
    }

    pub fn matches(&self, record: &PerformanceRecord) -> bool {
        self.iter()
            .all(|(bucket, label)| record.bucket_label(bucket) == Some(label))
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(b, l)| format!("{}={}", b, l)).collect();
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Closed seasons, immutable
    Archive,
    /// Season in progress, append-only
    Current,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Archive => f.write_str("archive"),
            PartitionKind::Current => f.write_str("current"),
        }
    }
}

/// Earliest and latest matching records by game date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Occurrences {
    pub first: Option<PerformanceRecord>,
    pub last: Option<PerformanceRecord>,
}

/// One readable store of bucketed performances. All queries are restricted
/// to a single scope.
pub trait Partition: Send + Sync {
    fn kind(&self) -> PartitionKind;

    fn count_matching(&self, scope: Scope, key: &MatchKey) -> Result<u64>;

    fn total_count(&self, scope: Scope) -> Result<u64>;

    fn first_and_last_matching(&self, scope: Scope, key: &MatchKey) -> Result<Occurrences>;

    /// Every record in scope, newest game first.
    fn list_performances(&self, scope: Scope) -> Result<Vec<PerformanceRecord>>;

    /// The newest `limit` records in scope that pass `filter`, newest game
    /// first.
    fn recent_performances(
        &self,
        scope: Scope,
        filter: &dyn Fn(&PerformanceRecord) -> bool,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>> {
        Ok(self
            .list_performances(scope)?
            .into_iter()
            .filter(|r| filter(r))
            .take(limit)
            .collect())
    }

    /// Record count per label of one bucket.
    fn bucket_distribution(&self, scope: Scope, bucket: &str) -> Result<Vec<(String, u64)>>;
}

/// A count plus whether any partition failed while producing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub value: u64,
    pub degraded: bool,
}

/// Archive ∪ current for one scope
#[derive(Clone)]
pub struct Population {
    scope: Scope,
    archive: Option<Arc<dyn Partition>>,
    current: Option<Arc<dyn Partition>>,
}

impl Population {
    pub fn new(
        scope: Scope,
        archive: Option<Arc<dyn Partition>>,
        current: Option<Arc<dyn Partition>>,
    ) -> Self {
        Population {
            scope,
            archive,
            current,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Run `query` on each partition present. Failures are logged and
    /// skipped; the flag is set when one happened or the archive is absent.
    fn gather<T>(
        &self,
        what: &str,
        query: impl Fn(&dyn Partition) -> Result<T>,
    ) -> (Vec<T>, bool) {
        let mut degraded = self.archive.is_none();
        let mut out = Vec::with_capacity(2);
        for partition in self.archive.iter().chain(self.current.iter()) {
            match query(partition.as_ref()) {
                Ok(v) => out.push(v),
                Err(e) => {
                    warn!(
                        "{} partition unavailable for {} ({}): {:#}",
                        partition.kind(),
                        self.scope,
                        what,
                        e
                    );
                    degraded = true;
                }
            }
        }
        (out, degraded)
    }

    /// Records in either partition whose labels agree with every entry of
    /// `key`. Partitions are disjoint, so the union is a plain sum.
    pub fn count_matching(&self, key: &MatchKey) -> Tally {
        let (counts, degraded) =
            self.gather("count_matching", |p| p.count_matching(self.scope, key));
        Tally {
            value: counts.into_iter().sum(),
            degraded,
        }
    }

    pub fn total_count(&self) -> Tally {
        let (counts, degraded) = self.gather("total_count", |p| p.total_count(self.scope));
        Tally {
            value: counts.into_iter().sum(),
            degraded,
        }
    }

    pub fn earliest_and_latest_matching(&self, key: &MatchKey) -> (Occurrences, bool) {
        let (found, degraded) = self.gather("first_and_last_matching", |p| {
            p.first_and_last_matching(self.scope, key)
        });
        let first = found
            .iter()
            .filter_map(|o| o.first.as_ref())
            .min_by_key(|r| (r.game_date, r.record_id.clone()))
            .cloned();
        let last = found
            .iter()
            .filter_map(|o| o.last.as_ref())
            .max_by_key(|r| (r.game_date, r.record_id.clone()))
            .cloned();
        (Occurrences { first, last }, degraded)
    }

    /// Every record of the season in progress, newest first. A season with
    /// no data collected yet is simply empty.
    pub fn current_season(&self) -> (Vec<PerformanceRecord>, bool) {
        let Some(current) = &self.current else {
            return (Vec::new(), false);
        };
        match current.list_performances(self.scope) {
            Ok(records) => (records, false),
            Err(e) => {
                warn!("Current season unreadable for {}: {:#}", self.scope, e);
                (Vec::new(), true)
            }
        }
    }

    /// Up to `per_partition` of the newest records passing `filter` from
    /// each partition, merged newest first and cut to `top`.
    pub fn recent(
        &self,
        filter: &dyn Fn(&PerformanceRecord) -> bool,
        per_partition: usize,
        top: usize,
    ) -> (Vec<PerformanceRecord>, bool) {
        let (parts, degraded) = self.gather("recent_performances", |p| {
            p.recent_performances(self.scope, filter, per_partition)
        });
        let mut records: Vec<PerformanceRecord> = parts.into_iter().flatten().collect();
        records.sort_by(|a, b| {
            b.game_date
                .cmp(&a.game_date)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        records.truncate(top);
        (records, degraded)
    }

    /// Label counts for one bucket across both partitions, in the rule's
    /// bucket order. Labels the rule does not know sort last.
    pub fn bucket_distribution(
        &self,
        bucket: &str,
        rule: &BucketRule,
    ) -> (Vec<(String, u64)>, bool) {
        let (parts, degraded) = self.gather("bucket_distribution", |p| {
            p.bucket_distribution(self.scope, bucket)
        });
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for (label, count) in parts.into_iter().flatten() {
            *merged.entry(label).or_default() += count;
        }
        let mut rows: Vec<(String, u64)> = merged.into_iter().collect();
        rows.sort_by_key(|(label, _)| rule.ordinal(label).unwrap_or(usize::MAX));
        (rows, degraded)
    }
}
