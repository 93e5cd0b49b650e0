//! Per-scope batch: rate the candidate records and build the report.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::db::models::{PerformanceRecord, Position, Scope, Sport};
use crate::rarity::engine::{Classification, RarityEngine};
use crate::rarity::error::RarityError;
use crate::rarity::ranking::{rank, summarize, BatchSummary, RatedPerformance};
use crate::rarity::sports;

/// Recent candidates read from each partition
pub const RECENT_PER_PARTITION: usize = 50;
/// Recent candidates kept after merging the partitions
pub const RECENT_TOP: usize = 20;

/// Where a run takes the records it rates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Every record of the season in progress
    #[default]
    Current,
    /// The newest interesting games across archive and current
    Recent,
}

impl CandidateSource {
    /// NFL positions rate their recent interesting games; every other sport
    /// checks its current season.
    pub fn default_for(sport: Sport) -> Self {
        match sport {
            Sport::Nfl => CandidateSource::Recent,
            _ => CandidateSource::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    /// Length of the all-time list
    pub top_n: usize,
    /// Cap on the latest list; `None` keeps every rare line
    pub latest_limit: Option<usize>,
    pub source: CandidateSource,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            top_n: 50,
            latest_limit: None,
            source: CandidateSource::Current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Everything one scope's run produced
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub sport: Sport,
    pub position: Position,
    pub generated_at: DateTime<Utc>,
    pub source: CandidateSource,
    /// Non-common lines, newest game first
    pub latest: Vec<RatedPerformance>,
    /// Non-common lines, rarest first
    pub all_time: Vec<RatedPerformance>,
    pub top_n: usize,
    pub summary: BatchSummary,
    /// Records skipped by the interest predicate
    pub uninteresting: usize,
    /// Population label counts for each match-key bucket
    pub distributions: BTreeMap<String, Vec<LabelCount>>,
}

impl BatchReport {
    pub fn scope(&self) -> Scope {
        Scope::new(self.sport, self.position)
    }

    pub fn rare_count(&self) -> usize {
        self.latest.len()
    }
}

/// Result of rating an arbitrary batch of records
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub rated: Vec<RatedPerformance>,
    pub uninteresting: usize,
    pub skipped: usize,
}

pub struct ScopePipeline {
    engine: RarityEngine,
    options: PipelineOptions,
}

impl ScopePipeline {
    pub fn new(engine: RarityEngine, options: PipelineOptions) -> Self {
        ScopePipeline { engine, options }
    }

    pub fn scope(&self) -> Scope {
        self.engine.adapter().scope
    }

    /// Rate `records` in order. Records of another scope, and records a
    /// bucket rule cannot label, are skipped and counted.
    pub fn evaluate(&self, records: Vec<PerformanceRecord>) -> Evaluation {
        let adapter = self.engine.adapter();
        let mut out = Evaluation::default();

        for record in records {
            if record.scope() != adapter.scope {
                let reason = match sports::adapter(record.scope()) {
                    Err(e) => e,
                    Ok(_) => RarityError::ScopeMismatch {
                        expected: adapter.scope,
                        found: record.scope(),
                    },
                };
                warn!("Skipping {}: {}", record.record_id, reason);
                out.skipped += 1;
                continue;
            }

            let record = match adapter.bucketize(record) {
                Ok(r) => r,
                Err(e) => {
                    error!("Bucket table defect for {}: {}", adapter.scope, e);
                    out.skipped += 1;
                    continue;
                }
            };

            if !adapter.is_interesting(&record) {
                out.uninteresting += 1;
                continue;
            }

            match self.engine.compute_rarity(&record) {
                Ok(rarity) => {
                    if rarity.classification != Classification::Common {
                        info!(
                            "RARE {}: {} on {} - {} ({} occurrences, score {:.2})",
                            adapter.scope,
                            record.player_name,
                            record.game_date,
                            rarity.classification,
                            rarity.occurrence_count,
                            rarity.rarity_score
                        );
                    }
                    out.rated.push(RatedPerformance { record, rarity });
                }
                Err(e) if e.is_configuration_defect() => {
                    error!("Bucket table defect for {}: {}", adapter.scope, e);
                    out.skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", record.record_id, e);
                    out.skipped += 1;
                }
            }
        }
        out
    }

    /// Rate the candidate records and assemble the report.
    pub fn run(&self) -> BatchReport {
        let scope = self.scope();
        let population = self.engine.population();
        let adapter = self.engine.adapter();

        let (records, mut incomplete) = match self.options.source {
            CandidateSource::Current => population.current_season(),
            CandidateSource::Recent => {
                population.recent(&adapter.interest, RECENT_PER_PARTITION, RECENT_TOP)
            }
        };
        info!(
            "Checking {} {} records for {}",
            records.len(),
            match self.options.source {
                CandidateSource::Current => "current-season",
                CandidateSource::Recent => "recent",
            },
            scope
        );

        let eval = self.evaluate(records);

        let mut summary = summarize(&eval.rated, incomplete);
        summary.skipped = eval.skipped;

        let mut latest: Vec<RatedPerformance> = eval
            .rated
            .iter()
            .filter(|r| r.rarity.classification != Classification::Common)
            .cloned()
            .collect();
        if let Some(limit) = self.options.latest_limit {
            latest.truncate(limit);
        }
        let all_time = rank(eval.rated, Some(self.options.top_n));

        let mut distributions = BTreeMap::new();
        for &bucket in adapter.match_key {
            let Some(tracked) = adapter.tracked(bucket) else {
                continue;
            };
            let (rows, degraded) = population.bucket_distribution(bucket, &tracked.rule);
            incomplete |= degraded;
            distributions.insert(
                bucket.to_string(),
                rows.into_iter()
                    .map(|(label, count)| LabelCount { label, count })
                    .collect(),
            );
        }
        summary.incomplete_population |= incomplete;

        info!(
            "{}: {} evaluated, {} rare, {} skipped{}",
            scope,
            summary.evaluated,
            latest.len(),
            summary.skipped,
            if summary.incomplete_population {
                " (population incomplete)"
            } else {
                ""
            }
        );

        BatchReport {
            sport: scope.sport,
            position: scope.position,
            generated_at: Utc::now(),
            source: self.options.source,
            latest,
            all_time,
            top_n: self.options.top_n,
            summary,
            uninteresting: eval.uninteresting,
            distributions,
        }
    }
}
