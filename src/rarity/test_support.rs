//! Fixtures shared by the rarity and pipeline tests

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::db::models::{PerformanceRecord, Position, Scope, Sport};

use super::population::{MatchKey, Occurrences, Partition, PartitionKind};
use super::sports::adapter;

/// Unbucketed record with the given raw stats
pub fn record(
    sport: Sport,
    position: Position,
    id: &str,
    date: &str,
    stats: &[(&str, f64)],
) -> PerformanceRecord {
    let game_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    PerformanceRecord {
        record_id: id.to_string(),
        sport,
        position,
        player_id: format!("p-{}", id),
        player_name: format!("Player {}", id),
        season: game_date.year(),
        game_date,
        week: None,
        team: Some("HOME".into()),
        opponent: Some("AWAY".into()),
        stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        buckets: BTreeMap::new(),
    }
}

/// Record labelled by its scope's adapter
pub fn bucketed(
    sport: Sport,
    position: Position,
    id: &str,
    date: &str,
    stats: &[(&str, f64)],
) -> PerformanceRecord {
    let r = record(sport, position, id, date, stats);
    adapter(r.scope()).unwrap().bucketize(r).unwrap()
}

/// In-memory partition filtering a plain vector
pub struct MemoryPartition {
    kind: PartitionKind,
    records: Vec<PerformanceRecord>,
}

impl MemoryPartition {
    pub fn archive(records: Vec<PerformanceRecord>) -> Self {
        MemoryPartition {
            kind: PartitionKind::Archive,
            records,
        }
    }

    pub fn current(records: Vec<PerformanceRecord>) -> Self {
        MemoryPartition {
            kind: PartitionKind::Current,
            records,
        }
    }

    fn in_scope(&self, scope: Scope) -> impl Iterator<Item = &PerformanceRecord> {
        self.records.iter().filter(move |r| r.scope() == scope)
    }
}

impl Partition for MemoryPartition {
    fn kind(&self) -> PartitionKind {
        self.kind
    }

    fn count_matching(&self, scope: Scope, key: &MatchKey) -> Result<u64> {
        Ok(self.in_scope(scope).filter(|r| key.matches(r)).count() as u64)
    }

    fn total_count(&self, scope: Scope) -> Result<u64> {
        Ok(self.in_scope(scope).count() as u64)
    }

    fn first_and_last_matching(&self, scope: Scope, key: &MatchKey) -> Result<Occurrences> {
        let matching: Vec<_> = self.in_scope(scope).filter(|r| key.matches(r)).collect();
        Ok(Occurrences {
            first: matching
                .iter()
                .min_by_key(|r| (r.game_date, r.record_id.clone()))
                .map(|r| (*r).clone()),
            last: matching
                .iter()
                .max_by_key(|r| (r.game_date, r.record_id.clone()))
                .map(|r| (*r).clone()),
        })
    }

    fn list_performances(&self, scope: Scope) -> Result<Vec<PerformanceRecord>> {
        let mut out: Vec<_> = self.in_scope(scope).cloned().collect();
        out.sort_by(|a, b| {
            b.game_date
                .cmp(&a.game_date)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        Ok(out)
    }

    fn bucket_distribution(&self, scope: Scope, bucket: &str) -> Result<Vec<(String, u64)>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for r in self.in_scope(scope) {
            if let Some(label) = r.bucket_label(bucket) {
                *counts.entry(label.to_string()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

/// Partition whose every query fails, like a store with a missing table
pub struct FailingPartition(pub PartitionKind);

impl Partition for FailingPartition {
    fn kind(&self) -> PartitionKind {
        self.0
    }

    fn count_matching(&self, _: Scope, _: &MatchKey) -> Result<u64> {
        bail!("no such table: performances")
    }

    fn total_count(&self, _: Scope) -> Result<u64> {
        bail!("no such table: performances")
    }

    fn first_and_last_matching(&self, _: Scope, _: &MatchKey) -> Result<Occurrences> {
        bail!("no such table: performances")
    }

    fn list_performances(&self, _: Scope) -> Result<Vec<PerformanceRecord>> {
        bail!("no such table: performances")
    }

    fn bucket_distribution(&self, _: Scope, _: &str) -> Result<Vec<(String, u64)>> {
        bail!("no such table: performances")
    }
}

/// Partition answering fixed counts, for populations too large to build
pub struct CannedPartition {
    kind: PartitionKind,
    matching: u64,
    /// `None` makes `total_count` fail
    total: Option<u64>,
}

impl CannedPartition {
    pub fn new(kind: PartitionKind, matching: u64, total: u64) -> Self {
        CannedPartition {
            kind,
            matching,
            total: Some(total),
        }
    }

    /// Matches are countable but the scope total is not
    pub fn without_total(kind: PartitionKind, matching: u64) -> Self {
        CannedPartition {
            kind,
            matching,
            total: None,
        }
    }
}

impl Partition for CannedPartition {
    fn kind(&self) -> PartitionKind {
        self.kind
    }

    fn count_matching(&self, _: Scope, _: &MatchKey) -> Result<u64> {
        Ok(self.matching)
    }

    fn total_count(&self, _: Scope) -> Result<u64> {
        match self.total {
            Some(n) => Ok(n),
            None => bail!("database is locked"),
        }
    }

    fn first_and_last_matching(&self, _: Scope, _: &MatchKey) -> Result<Occurrences> {
        Ok(Occurrences::default())
    }

    fn list_performances(&self, _: Scope) -> Result<Vec<PerformanceRecord>> {
        Ok(Vec::new())
    }

    fn bucket_distribution(&self, _: Scope, _: &str) -> Result<Vec<(String, u64)>> {
        Ok(Vec::new())
    }
}
