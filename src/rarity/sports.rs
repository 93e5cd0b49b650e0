//! Per-sport rarity tables.
//!
//! Each entry is plain data: which stats get bucketed and with which rule,
//! which bucket labels must agree for two stat lines to count as the same,
//! and which records are worth rating at all. Adding a sport means adding an
//! entry to [`ADAPTERS`].

use crate::db::models::{PerformanceRecord, Position, Scope, Sport};

use super::bucket::{Bucket, BucketRule};
use super::error::RarityError;
use super::population::MatchKey;

/// A raw stat and the bucket it is reduced to
#[derive(Debug, Clone, Copy)]
pub struct TrackedStat {
    /// Key in `PerformanceRecord::stats`
    pub stat: &'static str,
    /// Key in `PerformanceRecord::buckets`
    pub bucket: &'static str,
    pub rule: BucketRule,
}

impl TrackedStat {
    pub fn label_for(&self, record: &PerformanceRecord) -> Result<&'static str, RarityError> {
        let value = record.stat(self.stat);
        self.rule
            .bucket(value)
            .ok_or_else(|| RarityError::BucketRuleGap {
                stat: self.stat.to_string(),
                value,
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SportAdapter {
    pub scope: Scope,
    pub stats: &'static [TrackedStat],
    /// Bucket names that make up the match key
    pub match_key: &'static [&'static str],
    /// Cheap pre-filter deciding which records a batch rates
    pub interest: fn(&PerformanceRecord) -> bool,
}

impl SportAdapter {
    pub fn tracked(&self, bucket: &str) -> Option<&TrackedStat> {
        self.stats.iter().find(|t| t.bucket == bucket)
    }

    /// Attach a label for every tracked stat. Pure function of the raw stats,
    /// so re-bucketing an already bucketed record changes nothing.
    pub fn bucketize(&self, mut record: PerformanceRecord) -> Result<PerformanceRecord, RarityError> {
        for tracked in self.stats {
            let label = tracked.label_for(&record)?;
            record
                .buckets
                .insert(tracked.bucket.to_string(), label.to_string());
        }
        Ok(record)
    }

    /// Build the match key from the record's labels, deriving any label the
    /// record is missing from its raw stats.
    pub fn match_key(&self, record: &PerformanceRecord) -> Result<MatchKey, RarityError> {
        let mut key = MatchKey::default();
        for &bucket in self.match_key {
            let label = match record.bucket_label(bucket) {
                Some(label) => label.to_string(),
                None => match self.tracked(bucket) {
                    Some(tracked) => tracked.label_for(record)?.to_string(),
                    None => {
                        return Err(RarityError::InvalidBucketRule {
                            stat: bucket.to_string(),
                            reason: format!("match key field is not tracked for {}", self.scope),
                        })
                    }
                },
            };
            key.insert(bucket, label);
        }
        Ok(key)
    }

    pub fn is_interesting(&self, record: &PerformanceRecord) -> bool {
        (self.interest)(record)
    }

    pub fn validate(&self) -> Result<(), RarityError> {
        for tracked in self.stats {
            tracked.rule.validate(tracked.stat)?;
        }
        for &bucket in self.match_key {
            if self.tracked(bucket).is_none() {
                return Err(RarityError::InvalidBucketRule {
                    stat: bucket.to_string(),
                    reason: format!("match key field is not tracked for {}", self.scope),
                });
            }
        }
        Ok(())
    }
}

/// Adapter registered for `scope`
pub fn adapter(scope: Scope) -> Result<&'static SportAdapter, RarityError> {
    ADAPTERS
        .iter()
        .find(|a| a.scope == scope)
        .ok_or(RarityError::UnregisteredScope(scope))
}

/// String-keyed lookup for records arriving from outside the crate.
pub fn lookup(sport: &str, position: &str) -> Result<&'static SportAdapter, RarityError> {
    let sport: Sport = sport.parse()?;
    let position: Position = position.parse()?;
    adapter(Scope::new(sport, position))
}

pub fn adapters_for(sport: Sport) -> impl Iterator<Item = &'static SportAdapter> {
    ADAPTERS.iter().filter(move |a| a.scope.sport == sport)
}

// ── Interest predicates ──────────────────────────────────────────────────────

fn rb_interest(r: &PerformanceRecord) -> bool {
    r.stat("rush_yards") >= 100.0 || r.stat("rush_td") >= 2.0 || r.stat("fumbles_lost") >= 2.0
}

fn qb_interest(r: &PerformanceRecord) -> bool {
    r.stat("pass_yards") >= 300.0 || r.stat("pass_td") >= 4.0 || r.stat("interceptions") >= 3.0
}

fn receiver_interest(r: &PerformanceRecord) -> bool {
    r.stat("receiving_yards") >= 100.0
        || r.stat("receiving_td") >= 2.0
        || r.stat("receptions") >= 10.0
}

fn every_record(_: &PerformanceRecord) -> bool {
    true
}

// ── Shared bucket shapes ─────────────────────────────────────────────────────

const ZERO_TO_THREE_PLUS: BucketRule = BucketRule {
    buckets: &[
        Bucket::exact("0", 0.0),
        Bucket::exact("1", 1.0),
        Bucket::exact("2", 2.0),
        Bucket::open("3+", 3.0),
    ],
};

const ZERO_TO_FOUR_PLUS: BucketRule = BucketRule {
    buckets: &[
        Bucket::exact("0", 0.0),
        Bucket::exact("1", 1.0),
        Bucket::exact("2", 2.0),
        Bucket::exact("3", 3.0),
        Bucket::open("4+", 4.0),
    ],
};

const ZERO_TO_TWO_PLUS: BucketRule = BucketRule {
    buckets: &[
        Bucket::exact("0", 0.0),
        Bucket::exact("1", 1.0),
        Bucket::open("2+", 2.0),
    ],
};

const SHOTS: BucketRule = BucketRule {
    buckets: &[
        Bucket::range("0-1", 0.0, 1.0),
        Bucket::range("2-3", 2.0, 3.0),
        Bucket::range("4-5", 4.0, 5.0),
        Bucket::open("6+", 6.0),
    ],
};

// ── NFL ──────────────────────────────────────────────────────────────────────

const RUSH_YARDS: BucketRule = BucketRule {
    buckets: &[
        Bucket::range("0-49", 0.0, 49.0),
        Bucket::range("50-99", 50.0, 99.0),
        Bucket::range("100-149", 100.0, 149.0),
        Bucket::range("150-199", 150.0, 199.0),
        Bucket::open("200+", 200.0),
    ],
};

const PASS_YARDS: BucketRule = BucketRule {
    buckets: &[
        Bucket::range("0-99", 0.0, 99.0),
        Bucket::range("100-199", 100.0, 199.0),
        Bucket::range("200-249", 200.0, 249.0),
        Bucket::range("250-299", 250.0, 299.0),
        Bucket::range("300-349", 300.0, 349.0),
        Bucket::range("350-399", 350.0, 399.0),
        Bucket::open("400+", 400.0),
    ],
};

const PASS_TD: BucketRule = BucketRule {
    buckets: &[
        Bucket::exact("0", 0.0),
        Bucket::exact("1", 1.0),
        Bucket::exact("2", 2.0),
        Bucket::exact("3", 3.0),
        Bucket::exact("4", 4.0),
        Bucket::open("5+", 5.0),
    ],
};

const RECEPTIONS: BucketRule = BucketRule {
    buckets: &[
        Bucket::range("0-2", 0.0, 2.0),
        Bucket::range("3-4", 3.0, 4.0),
        Bucket::range("5-6", 5.0, 6.0),
        Bucket::range("7-9", 7.0, 9.0),
        Bucket::range("10-11", 10.0, 11.0),
        Bucket::open("12+", 12.0),
    ],
};

const RECEIVING_YARDS: BucketRule = BucketRule {
    buckets: &[
        Bucket::range("0-29", 0.0, 29.0),
        Bucket::range("30-49", 30.0, 49.0),
        Bucket::range("50-74", 50.0, 74.0),
        Bucket::range("75-99", 75.0, 99.0),
        Bucket::range("100-124", 100.0, 124.0),
        Bucket::range("125-149", 125.0, 149.0),
        Bucket::open("150+", 150.0),
    ],
};

const RB_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "rush_yards",
        bucket: "rush_yards_bucket",
        rule: RUSH_YARDS,
    },
    TrackedStat {
        stat: "rush_td",
        bucket: "rush_td_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "fumbles_lost",
        bucket: "fumbles_bucket",
        rule: ZERO_TO_TWO_PLUS,
    },
];

const QB_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "pass_yards",
        bucket: "pass_yards_bucket",
        rule: PASS_YARDS,
    },
    TrackedStat {
        stat: "pass_td",
        bucket: "pass_td_bucket",
        rule: PASS_TD,
    },
    TrackedStat {
        stat: "interceptions",
        bucket: "interceptions_bucket",
        rule: ZERO_TO_THREE_PLUS,
    },
];

const RECEIVER_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "receptions",
        bucket: "receptions_bucket",
        rule: RECEPTIONS,
    },
    TrackedStat {
        stat: "receiving_yards",
        bucket: "receiving_yards_bucket",
        rule: RECEIVING_YARDS,
    },
    TrackedStat {
        stat: "receiving_td",
        bucket: "receiving_td_bucket",
        rule: ZERO_TO_THREE_PLUS,
    },
];

const RECEIVER_KEY: &[&str] = &[
    "receptions_bucket",
    "receiving_yards_bucket",
    "receiving_td_bucket",
];

// ── NBA ──────────────────────────────────────────────────────────────────────

const NBA_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "points",
        bucket: "points_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::range("0-9", 0.0, 9.0),
                Bucket::range("10-19", 10.0, 19.0),
                Bucket::range("20-29", 20.0, 29.0),
                Bucket::range("30-39", 30.0, 39.0),
                Bucket::range("40-49", 40.0, 49.0),
                Bucket::open("50+", 50.0),
            ],
        },
    },
    TrackedStat {
        stat: "rebounds",
        bucket: "rebounds_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::range("0-4", 0.0, 4.0),
                Bucket::range("5-9", 5.0, 9.0),
                Bucket::range("10-14", 10.0, 14.0),
                Bucket::range("15-19", 15.0, 19.0),
                Bucket::open("20+", 20.0),
            ],
        },
    },
    TrackedStat {
        stat: "assists",
        bucket: "assists_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::range("0-4", 0.0, 4.0),
                Bucket::range("5-9", 5.0, 9.0),
                Bucket::range("10-14", 10.0, 14.0),
                Bucket::open("15+", 15.0),
            ],
        },
    },
];

// ── MLB ──────────────────────────────────────────────────────────────────────

const MLB_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "hits",
        bucket: "hits_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "runs",
        bucket: "runs_bucket",
        rule: ZERO_TO_THREE_PLUS,
    },
    TrackedStat {
        stat: "rbis",
        bucket: "rbis_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "home_runs",
        bucket: "home_runs_bucket",
        rule: ZERO_TO_TWO_PLUS,
    },
];

// ── F1 ───────────────────────────────────────────────────────────────────────

const F1_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "finish_position",
        bucket: "position_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::exact("1", 1.0),
                Bucket::exact("2", 2.0),
                Bucket::exact("3", 3.0),
                Bucket::range("4-5", 4.0, 5.0),
                Bucket::range("6-10", 6.0, 10.0),
                Bucket::open("11+", 11.0),
            ],
        },
    },
    TrackedStat {
        stat: "overtakes",
        bucket: "overtakes_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::range("0-2", 0.0, 2.0),
                Bucket::range("3-5", 3.0, 5.0),
                Bucket::range("6-10", 6.0, 10.0),
                Bucket::open("11+", 11.0),
            ],
        },
    },
    TrackedStat {
        // seconds off the fastest lap of the race
        stat: "fastest_lap",
        bucket: "fastest_lap_bucket",
        rule: BucketRule {
            buckets: &[
                Bucket::range("0.0-0.5", 0.0, 0.5),
                Bucket::range("0.5-1.0", 0.5, 1.0),
                Bucket::range("1.0-2.0", 1.0, 2.0),
                Bucket::range("2.0-3.0", 2.0, 3.0),
                Bucket::open("3.0+", 3.0),
            ],
        },
    },
];

// ── Soccer ───────────────────────────────────────────────────────────────────

const SOCCER_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "goals",
        bucket: "goals_bucket",
        rule: ZERO_TO_THREE_PLUS,
    },
    TrackedStat {
        stat: "assists",
        bucket: "assists_bucket",
        rule: ZERO_TO_THREE_PLUS,
    },
    TrackedStat {
        stat: "shots",
        bucket: "shots_bucket",
        rule: SHOTS,
    },
];

// ── NHL ──────────────────────────────────────────────────────────────────────

const NHL_STATS: &[TrackedStat] = &[
    TrackedStat {
        stat: "goals",
        bucket: "goals_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "assists",
        bucket: "assists_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "points",
        bucket: "points_bucket",
        rule: ZERO_TO_FOUR_PLUS,
    },
    TrackedStat {
        stat: "shots",
        bucket: "shots_bucket",
        rule: SHOTS,
    },
];

/// The registry, keyed by (sport, position)
pub static ADAPTERS: &[SportAdapter] = &[
    SportAdapter {
        scope: Scope::new(Sport::Nfl, Position::Rb),
        stats: RB_STATS,
        match_key: &["rush_yards_bucket", "rush_td_bucket", "fumbles_bucket"],
        interest: rb_interest,
    },
    SportAdapter {
        scope: Scope::new(Sport::Nfl, Position::Qb),
        stats: QB_STATS,
        match_key: &["pass_yards_bucket", "pass_td_bucket", "interceptions_bucket"],
        interest: qb_interest,
    },
    SportAdapter {
        scope: Scope::new(Sport::Nfl, Position::Wr),
        stats: RECEIVER_STATS,
        match_key: RECEIVER_KEY,
        interest: receiver_interest,
    },
    SportAdapter {
        scope: Scope::new(Sport::Nfl, Position::Te),
        stats: RECEIVER_STATS,
        match_key: RECEIVER_KEY,
        interest: receiver_interest,
    },
    SportAdapter {
        scope: Scope::new(Sport::Nba, Position::All),
        stats: NBA_STATS,
        match_key: &["points_bucket", "rebounds_bucket", "assists_bucket"],
        interest: every_record,
    },
    SportAdapter {
        scope: Scope::new(Sport::Mlb, Position::All),
        stats: MLB_STATS,
        match_key: &["hits_bucket", "runs_bucket", "rbis_bucket", "home_runs_bucket"],
        interest: every_record,
    },
    SportAdapter {
        scope: Scope::new(Sport::F1, Position::All),
        stats: F1_STATS,
        match_key: &["position_bucket", "overtakes_bucket", "fastest_lap_bucket"],
        interest: every_record,
    },
    SportAdapter {
        scope: Scope::new(Sport::Soccer, Position::All),
        stats: SOCCER_STATS,
        match_key: &["goals_bucket", "assists_bucket", "shots_bucket"],
        interest: every_record,
    },
    SportAdapter {
        scope: Scope::new(Sport::Nhl, Position::All),
        stats: NHL_STATS,
        match_key: &["goals_bucket", "assists_bucket", "points_bucket", "shots_bucket"],
        interest: every_record,
    },
];
