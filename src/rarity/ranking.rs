use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::db::models::PerformanceRecord;

use super::engine::{round2, Classification, RarityResult};

/// A record together with its rarity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedPerformance {
    pub record: PerformanceRecord,
    pub rarity: RarityResult,
}

impl RatedPerformance {
    pub fn score(&self) -> f64 {
        self.rarity.rarity_score
    }

    pub fn game_date(&self) -> NaiveDate {
        self.record.game_date
    }
}

/// Rarest first; equal scores put the more recent game first.
fn by_rarity(a: &RatedPerformance, b: &RatedPerformance) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| b.game_date().cmp(&a.game_date()))
}

/// Drop common lines, order rarest first, keep at most `limit`.
pub fn rank(mut rated: Vec<RatedPerformance>, limit: Option<usize>) -> Vec<RatedPerformance> {
    rated.retain(|r| r.rarity.classification != Classification::Common);
    // sort_by is stable, so full ties keep input order
    rated.sort_by(by_rarity);
    if let Some(limit) = limit {
        rated.truncate(limit);
    }
    rated
}

/// Aggregates over one evaluated batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub evaluated: usize,
    pub by_classification: BTreeMap<Classification, usize>,
    pub mean_rarity_score: Option<f64>,
    pub rarest: Option<RatedPerformance>,
    /// Set when any result in the batch, or the batch's own reads, saw a
    /// missing or failing partition
    pub incomplete_population: bool,
    /// Records dropped before scoring (unknown scope, bucket rule gap)
    pub skipped: usize,
}

pub fn summarize(rated: &[RatedPerformance], incomplete: bool) -> BatchSummary {
    let mut by_classification: BTreeMap<Classification, usize> =
        Classification::ALL.iter().map(|c| (*c, 0)).collect();
    for r in rated {
        *by_classification.entry(r.rarity.classification).or_default() += 1;
    }

    let mean_rarity_score = if rated.is_empty() {
        None
    } else {
        let sum: f64 = rated.iter().map(RatedPerformance::score).sum();
        Some(round2(sum / rated.len() as f64))
    };

    let rarest = rated.iter().min_by(|a, b| by_rarity(a, b)).cloned();

    BatchSummary {
        evaluated: rated.len(),
        by_classification,
        mean_rarity_score,
        rarest,
        incomplete_population: incomplete || rated.iter().any(|r| r.rarity.incomplete_population),
        skipped: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Position, Sport};
    use crate::rarity::engine::rarity_score;
    use crate::rarity::test_support::record;
    use approx::assert_relative_eq;

    fn rated(id: &str, date: &str, count: u64) -> RatedPerformance {
        let total = 1_000;
        RatedPerformance {
            record: record(Sport::Nba, Position::All, id, date, &[("points", 40.0)]),
            rarity: RarityResult {
                occurrence_count: count,
                rarity_score: rarity_score(count, total, 2.0),
                classification: Classification::from_count(count),
                total_games: total,
                first_occurrence: None,
                last_occurrence: None,
                incomplete_population: false,
            },
        }
    }

    fn ids(list: &[RatedPerformance]) -> Vec<&str> {
        list.iter().map(|r| r.record.record_id.as_str()).collect()
    }

    #[test]
    fn rank_drops_common_and_orders_rarest_first() {
        let batch = vec![
            rated("common", "2024-01-01", 400),
            rated("rare", "2024-01-02", 20),
            rated("never", "2024-01-03", 1),
            rated("very", "2024-01-04", 8),
        ];
        let ranked = rank(batch, None);
        assert_eq!(ids(&ranked), vec!["never", "very", "rare"]);
    }

    #[test]
    fn equal_scores_prefer_recent_games() {
        let batch = vec![
            rated("old", "2019-03-01", 3),
            rated("new", "2024-03-01", 3),
            rated("mid", "2021-03-01", 3),
        ];
        assert_eq!(ids(&rank(batch, None)), vec!["new", "mid", "old"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let batch = vec![
            rated("b", "2024-03-01", 3),
            rated("a", "2024-03-01", 3),
        ];
        assert_eq!(ids(&rank(batch, None)), vec!["b", "a"]);
    }

    #[test]
    fn rank_truncates_to_limit() {
        let batch = (1..=10)
            .map(|i| rated(&format!("r{}", i), "2024-01-01", i))
            .collect();
        let ranked = rank(batch, Some(3));
        assert_eq!(ids(&ranked), vec!["r1", "r2", "r3"]);
        assert!(rank(Vec::new(), Some(3)).is_empty());
    }

    #[test]
    fn summary_counts_every_tier() {
        let batch = vec![
            rated("a", "2024-01-01", 1),
            rated("b", "2024-01-02", 1),
            rated("c", "2024-01-03", 4),
            rated("d", "2024-01-04", 500),
        ];
        let s = summarize(&batch, false);
        assert_eq!(s.evaluated, 4);
        assert_eq!(s.by_classification[&Classification::NeverBefore], 2);
        assert_eq!(s.by_classification[&Classification::ExtremelyRare], 1);
        assert_eq!(s.by_classification[&Classification::VeryRare], 0);
        assert_eq!(s.by_classification[&Classification::Common], 1);
        assert_eq!(s.rarest.as_ref().unwrap().record.record_id, "b");
        assert!(!s.incomplete_population);

        let expected = batch.iter().map(|r| r.score()).sum::<f64>() / 4.0;
        assert_relative_eq!(s.mean_rarity_score.unwrap(), expected, epsilon = 0.005);
    }

    #[test]
    fn empty_batch_has_no_mean() {
        let s = summarize(&[], true);
        assert_eq!(s.evaluated, 0);
        assert!(s.mean_rarity_score.is_none());
        assert!(s.rarest.is_none());
        assert!(s.incomplete_population);
    }

    #[test]
    fn incomplete_results_mark_the_summary() {
        let mut r = rated("a", "2024-01-01", 2);
        r.rarity.incomplete_population = true;
        assert!(summarize(&[r], false).incomplete_population);
    }

    #[test]
    fn summary_serializes_classification_names() {
        let s = summarize(&[rated("a", "2024-01-01", 1)], false);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["by_classification"]["never_before"], 1);
        assert_eq!(json["rarest"]["rarity"]["classification"], "never_before");
    }
}
