use clap::Parser;
use std::path::PathBuf;

use crate::db::models::Sport;
use crate::pipeline::CandidateSource;

/// Rare single-game stat line detection
#[derive(Parser, Debug, Clone)]
#[command(name = "statline-rarity", version, about)]
pub struct Config {
    /// Root holding archive/<sport>_archive.db and current/<sport>_current.db
    #[arg(long, env = "RARITY_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory the JSON reports are written to
    #[arg(long, env = "RARITY_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Sports to process (comma separated)
    #[arg(
        long,
        env = "RARITY_SPORTS",
        value_enum,
        value_delimiter = ',',
        default_values = ["nfl", "nba", "mlb", "f1", "soccer", "nhl"]
    )]
    pub sports: Vec<Sport>,

    /// Length of the all-time list per scope
    #[arg(long, env = "RARITY_TOP_N", default_value = "50")]
    pub top_n: usize,

    /// Cap on the latest list per scope (unbounded when unset)
    #[arg(long, env = "RARITY_LATEST_LIMIT")]
    pub latest_limit: Option<usize>,

    /// Records to rate: the current season, or the newest interesting games
    /// of archive and current. NFL defaults to recent, other sports to current.
    #[arg(long, env = "RARITY_SOURCE", value_enum)]
    pub source: Option<CandidateSource>,

    /// Exponent of the rarity curve, 100 * (1 - count/total)^k
    #[arg(long, env = "RARITY_SCORE_EXPONENT", default_value = "2.0")]
    pub score_exponent: f64,

    /// Wall-clock budget for all scopes together, in seconds. Scopes still
    /// running at the deadline are abandoned and the process exits non-zero
    /// once the finished reports are published.
    #[arg(long, env = "RARITY_BATCH_TIMEOUT_SECS", default_value = "300")]
    pub batch_timeout_secs: u64,

    /// NDJSON file of collected records to append to the current partitions
    /// before rating
    #[arg(long, env = "RARITY_IMPORT")]
    pub import: Option<PathBuf>,

    /// Rate and log without writing report files
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Skip the first/last occurrence lookups
    #[arg(long, env = "RARITY_SKIP_OCCURRENCES", default_value = "false")]
    pub skip_occurrences: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sports.is_empty() {
            anyhow::bail!("at least one sport must be selected");
        }
        if self.top_n == 0 {
            anyhow::bail!("top_n must be at least 1");
        }
        if self.latest_limit == Some(0) {
            anyhow::bail!("latest_limit must be at least 1 when set");
        }
        if !self.score_exponent.is_finite() || self.score_exponent <= 0.0 {
            anyhow::bail!("score_exponent must be a positive finite number");
        }
        if self.batch_timeout_secs == 0 {
            anyhow::bail!("batch_timeout_secs must be positive");
        }
        if let Some(path) = &self.import {
            if !path.is_file() {
                anyhow::bail!("import file not found: {}", path.display());
            }
        }
        Ok(())
    }

    /// Selected sports without repeats, in the order given
    pub fn selected_sports(&self) -> Vec<Sport> {
        let mut out = Vec::with_capacity(self.sports.len());
        for s in &self.sports {
            if !out.contains(s) {
                out.push(*s);
            }
        }
        out
    }
}
