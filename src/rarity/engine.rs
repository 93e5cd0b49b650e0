//! Rarity scoring.
//!
//! The score for a stat line seen `count` times in a population of `total`:
//!
//!   score = 100 · (1 − count/total)^k      (100 when total = 0)
//!
//! with k = 2 by default, rounded to two decimals. The convex curve pushes
//! common lines toward 0 while lines seen a handful of times stay spread out
//! near 100.
//!
//! Classification ignores the score and uses fixed count thresholds shared by
//! every sport. Counting is inclusive: a record already stored in the
//! population counts itself, so a first-ever line evaluated from the current
//! season has count 1.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::db::models::PerformanceRecord;

use super::error::RarityError;
use super::population::Population;
use super::sports::SportAdapter;

pub const DEFAULT_SCORE_EXPONENT: f64 = 2.0;

/// Rarity tiers, rarest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    NeverBefore,
    ExtremelyRare,
    VeryRare,
    Rare,
    Common,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::NeverBefore,
        Classification::ExtremelyRare,
        Classification::VeryRare,
        Classification::Rare,
        Classification::Common,
    ];

    pub fn from_count(count: u64) -> Self {
        match count {
            0..=1 => Classification::NeverBefore,
            2..=5 => Classification::ExtremelyRare,
            6..=10 => Classification::VeryRare,
            11..=25 => Classification::Rare,
            _ => Classification::Common,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NeverBefore => "never_before",
            Classification::ExtremelyRare => "extremely_rare",
            Classification::VeryRare => "very_rare",
            Classification::Rare => "rare",
            Classification::Common => "common",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score in [0, 100] for `count` matches out of `total`.
pub fn rarity_score(count: u64, total: u64, exponent: f64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let share = (count as f64 / total as f64).min(1.0);
    round2(100.0 * (1.0 - share).powf(exponent))
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Narrative pointer to a matching historical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub record_id: String,
    pub player_name: String,
    pub season: i32,
    pub game_date: NaiveDate,
    pub team: Option<String>,
}

impl From<&PerformanceRecord> for Occurrence {
    fn from(r: &PerformanceRecord) -> Self {
        Occurrence {
            record_id: r.record_id.clone(),
            player_name: r.player_name.clone(),
            season: r.season,
            game_date: r.game_date,
            team: r.team.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityResult {
    pub occurrence_count: u64,
    pub rarity_score: f64,
    pub classification: Classification,
    pub total_games: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_occurrence: Option<Occurrence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_occurrence: Option<Occurrence>,
    /// A partition failed or was missing while this was computed
    pub incomplete_population: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RarityPolicy {
    pub score_exponent: f64,
    /// Look up first/last matching records for each result
    pub attach_occurrences: bool,
}

impl Default for RarityPolicy {
    fn default() -> Self {
        RarityPolicy {
            score_exponent: DEFAULT_SCORE_EXPONENT,
            attach_occurrences: true,
        }
    }
}

/// Rates records of one scope against its population
#[derive(Clone)]
pub struct RarityEngine {
    adapter: &'static SportAdapter,
    population: Population,
    policy: RarityPolicy,
}

impl RarityEngine {
    pub fn new(adapter: &'static SportAdapter, population: Population, policy: RarityPolicy) -> Self {
        RarityEngine {
            adapter,
            population,
            policy,
        }
    }

    pub fn adapter(&self) -> &'static SportAdapter {
        self.adapter
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn compute_rarity(&self, record: &PerformanceRecord) -> Result<RarityResult, RarityError> {
        if record.scope() != self.adapter.scope {
            return Err(RarityError::ScopeMismatch {
                expected: self.adapter.scope,
                found: record.scope(),
            });
        }

        let key = self.adapter.match_key(record)?;
        let count = self.population.count_matching(&key);
        let total = self.population.total_count();
        let mut incomplete = count.degraded || total.degraded;

        // The current partition may grow between the two queries. The score
        // uses the raw total so an empty or unreadable population scores 100.
        let total_games = total.value.max(count.value);
        let rarity_score = rarity_score(count.value, total.value, self.policy.score_exponent);
        let classification = Classification::from_count(count.value);

        let (first_occurrence, last_occurrence) = if self.policy.attach_occurrences {
            let (occ, degraded) = self.population.earliest_and_latest_matching(&key);
            incomplete |= degraded;
            (
                occ.first.as_ref().map(Occurrence::from),
                occ.last.as_ref().map(Occurrence::from),
            )
        } else {
            (None, None)
        };

        debug!(
            "{} {} [{}] -> {}/{} {} ({:.2})",
            self.adapter.scope,
            record.player_name,
            key,
            count.value,
            total_games,
            classification,
            rarity_score
        );

        Ok(RarityResult {
            occurrence_count: count.value,
            rarity_score,
            classification,
            total_games,
            first_occurrence,
            last_occurrence,
            incomplete_population: incomplete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Position, Scope, Sport};
    use crate::rarity::population::{Partition, PartitionKind};
    use crate::rarity::sports::adapter;
    use crate::rarity::test_support::{
        bucketed, CannedPartition, FailingPartition, MemoryPartition,
    };
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const RB: Scope = Scope::new(Sport::Nfl, Position::Rb);
    const NBA: Scope = Scope::new(Sport::Nba, Position::All);

    fn engine(
        scope: Scope,
        archive: Option<Arc<dyn Partition>>,
        current: Option<Arc<dyn Partition>>,
    ) -> RarityEngine {
        let adapter = adapter(scope).unwrap();
        RarityEngine::new(
            adapter,
            Population::new(scope, archive, current),
            RarityPolicy::default(),
        )
    }

    fn big_run() -> PerformanceRecord {
        bucketed(
            Sport::Nfl,
            Position::Rb,
            "2024-w5-rb-22",
            "2024-10-06",
            &[("rush_yards", 215.0), ("rush_td", 3.0), ("fumbles_lost", 0.0)],
        )
    }

    fn nba_line() -> PerformanceRecord {
        bucketed(
            Sport::Nba,
            Position::All,
            "0022400612:1629029",
            "2024-01-22",
            &[("points", 55.0), ("rebounds", 7.0), ("assists", 3.0)],
        )
    }

    #[test]
    fn classification_boundaries_are_exact() {
        assert_eq!(Classification::from_count(0), Classification::NeverBefore);
        assert_eq!(Classification::from_count(1), Classification::NeverBefore);
        assert_eq!(Classification::from_count(2), Classification::ExtremelyRare);
        assert_eq!(Classification::from_count(5), Classification::ExtremelyRare);
        assert_eq!(Classification::from_count(6), Classification::VeryRare);
        assert_eq!(Classification::from_count(10), Classification::VeryRare);
        assert_eq!(Classification::from_count(11), Classification::Rare);
        assert_eq!(Classification::from_count(25), Classification::Rare);
        assert_eq!(Classification::from_count(26), Classification::Common);
    }

    #[test]
    fn score_is_non_increasing_in_count() {
        let total = 10_000;
        let mut prev = f64::INFINITY;
        for count in (0..=total).step_by(7) {
            let s = rarity_score(count, total, DEFAULT_SCORE_EXPONENT);
            assert!(s <= prev, "count {} raised score {} -> {}", count, prev, s);
            assert!((0.0..=100.0).contains(&s));
            prev = s;
        }
        assert_relative_eq!(rarity_score(total, total, 2.0), 0.0);
    }

    #[test]
    fn zero_population_scores_100() {
        assert_relative_eq!(rarity_score(0, 0, 2.0), 100.0);
        let e = engine(RB, None, None);
        let r = e.compute_rarity(&big_run()).unwrap();
        assert_eq!(r.occurrence_count, 0);
        assert_eq!(r.total_games, 0);
        assert_relative_eq!(r.rarity_score, 100.0);
        assert_eq!(r.classification, Classification::NeverBefore);
    }

    #[test]
    fn nfl_five_matches_in_37523_games() {
        let e = engine(
            RB,
            Some(Arc::new(CannedPartition::new(PartitionKind::Archive, 4, 36_900))),
            Some(Arc::new(CannedPartition::new(PartitionKind::Current, 1, 623))),
        );
        let r = e.compute_rarity(&big_run()).unwrap();
        assert_eq!(r.occurrence_count, 5);
        assert_eq!(r.total_games, 37_523);
        assert_eq!(r.classification, Classification::ExtremelyRare);
        assert_relative_eq!(r.rarity_score, 99.97, epsilon = 1e-9);
        assert!(!r.incomplete_population);
    }

    #[test]
    fn nba_line_counts_itself_once_persisted() {
        // 0 other matches among 13,352 games; the evaluated line is stored in
        // the current season, so it is the single match
        let e = engine(
            NBA,
            Some(Arc::new(CannedPartition::new(PartitionKind::Archive, 0, 12_000))),
            Some(Arc::new(CannedPartition::new(PartitionKind::Current, 1, 1_352))),
        );
        let r = e.compute_rarity(&nba_line()).unwrap();
        assert_eq!(r.occurrence_count, 1);
        assert_eq!(r.classification, Classification::NeverBefore);
        assert_relative_eq!(r.rarity_score, 99.99, epsilon = 1e-9);

        // The same line evaluated before it is stored
        let e = engine(
            NBA,
            Some(Arc::new(CannedPartition::new(PartitionKind::Archive, 0, 12_000))),
            Some(Arc::new(CannedPartition::new(PartitionKind::Current, 0, 1_352))),
        );
        let r = e.compute_rarity(&nba_line()).unwrap();
        assert_eq!(r.occurrence_count, 0);
        assert_eq!(r.classification, Classification::NeverBefore);
        assert_relative_eq!(r.rarity_score, 100.0);
    }

    #[test]
    fn unreadable_archive_uses_current_matches() {
        let target = big_run();
        let current: Vec<_> = (0..3)
            .map(|i| {
                let mut r = target.clone();
                r.record_id = format!("c{}", i);
                r
            })
            .chain(std::iter::once(bucketed(
                Sport::Nfl,
                Position::Rb,
                "c-other",
                "2024-09-08",
                &[("rush_yards", 45.0)],
            )))
            .collect();
        let e = engine(
            RB,
            Some(Arc::new(FailingPartition(PartitionKind::Archive))),
            Some(Arc::new(MemoryPartition::current(current))),
        );
        let r = e.compute_rarity(&target).unwrap();
        assert_eq!(r.occurrence_count, 3);
        assert_eq!(r.total_games, 4);
        assert_eq!(r.classification, Classification::ExtremelyRare);
        assert!(r.incomplete_population);
    }

    #[test]
    fn unreadable_totals_score_as_unseen() {
        let e = engine(
            RB,
            Some(Arc::new(CannedPartition::without_total(PartitionKind::Archive, 2))),
            Some(Arc::new(CannedPartition::without_total(PartitionKind::Current, 1))),
        );
        let r = e.compute_rarity(&big_run()).unwrap();
        assert_eq!(r.occurrence_count, 3);
        assert_eq!(r.total_games, 3);
        assert_relative_eq!(r.rarity_score, 100.0);
        assert_eq!(r.classification, Classification::ExtremelyRare);
        assert!(r.incomplete_population);
    }

    #[test]
    fn repeated_evaluation_is_identical() {
        let archive = MemoryPartition::archive(vec![
            bucketed(
                Sport::Nfl,
                Position::Rb,
                "a1",
                "2012-12-09",
                &[("rush_yards", 210.0), ("rush_td", 3.0)],
            ),
            bucketed(Sport::Nfl, Position::Rb, "a2", "2015-10-04", &[("rush_yards", 90.0)]),
        ]);
        let e = engine(RB, Some(Arc::new(archive)), None);
        let first = e.compute_rarity(&big_run()).unwrap();
        let second = e.compute_rarity(&big_run()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.first_occurrence.as_ref().unwrap().record_id, "a1");
        assert_eq!(first.last_occurrence.as_ref().unwrap().record_id, "a1");
    }

    #[test]
    fn occurrences_skipped_when_disabled() {
        let archive = MemoryPartition::archive(vec![big_run()]);
        let e = RarityEngine::new(
            adapter(RB).unwrap(),
            Population::new(RB, Some(Arc::new(archive)), None),
            RarityPolicy {
                attach_occurrences: false,
                ..RarityPolicy::default()
            },
        );
        let r = e.compute_rarity(&big_run()).unwrap();
        assert_eq!(r.occurrence_count, 1);
        assert!(r.first_occurrence.is_none());
        assert!(r.last_occurrence.is_none());
    }

    #[test]
    fn exponent_is_tunable() {
        assert_relative_eq!(rarity_score(50, 100, 1.0), 50.0);
        assert_relative_eq!(rarity_score(50, 100, 2.0), 25.0);
        assert_relative_eq!(rarity_score(50, 100, 3.0), 12.5);
    }

    #[test]
    fn records_from_another_scope_are_rejected() {
        let e = engine(RB, None, None);
        let err = e.compute_rarity(&nba_line()).unwrap_err();
        assert!(matches!(err, RarityError::ScopeMismatch { .. }));
    }
}
