use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::rarity::RarityError;

/// Sports with a registered rarity table
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Nfl,
    Nba,
    Mlb,
    F1,
    /// Champions League player match lines
    #[serde(alias = "champions_league")]
    #[value(alias = "champions_league")]
    Soccer,
    Nhl,
}

impl Sport {
    pub const ALL: [Sport; 6] = [
        Sport::Nfl,
        Sport::Nba,
        Sport::Mlb,
        Sport::F1,
        Sport::Soccer,
        Sport::Nhl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::Nba => "nba",
            Sport::Mlb => "mlb",
            Sport::F1 => "f1",
            Sport::Soccer => "soccer",
            Sport::Nhl => "nhl",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = RarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nfl" | "american_football" => Ok(Sport::Nfl),
            "nba" | "basketball" => Ok(Sport::Nba),
            "mlb" | "baseball" => Ok(Sport::Mlb),
            "f1" | "formula1" => Ok(Sport::F1),
            "soccer" | "champions_league" | "football_eu" => Ok(Sport::Soccer),
            "nhl" | "ice_hockey" => Ok(Sport::Nhl),
            other => Err(RarityError::UnknownSport(other.to_string())),
        }
    }
}

/// Roster slot a table applies to. Only NFL splits by position; every other
/// sport uses `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    All,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Qb => "qb",
            Position::Rb => "rb",
            Position::Wr => "wr",
            Position::Te => "te",
            Position::All => "all",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = RarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qb" => Ok(Position::Qb),
            "rb" => Ok(Position::Rb),
            "wr" => Ok(Position::Wr),
            "te" => Ok(Position::Te),
            "all" | "" => Ok(Position::All),
            other => Err(RarityError::UnknownPosition(other.to_string())),
        }
    }
}

/// A (sport, position) pair: the key of the adapter table and the slice of a
/// partition that queries run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub sport: Sport,
    pub position: Position,
}

impl Scope {
    pub const fn new(sport: Sport, position: Position) -> Self {
        Scope { sport, position }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sport, self.position)
    }
}

/// One player's (or driver's) stat line for one game, race or match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Unique per partition, e.g. "<game_id>:<player_id>"
    pub record_id: String,
    pub sport: Sport,
    #[serde(default = "default_position")]
    pub position: Position,
    pub player_id: String,
    pub player_name: String,
    pub season: i32,
    pub game_date: NaiveDate,
    /// Week for NFL, round for F1 and soccer
    #[serde(default)]
    pub week: Option<i32>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub opponent: Option<String>,
    /// Raw numeric stats keyed by stat name ("rush_yards", "points", ...)
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    /// Range labels keyed by bucket name ("rush_yards_bucket" -> "200+")
    #[serde(default)]
    pub buckets: BTreeMap<String, String>,
}

fn default_position() -> Position {
    Position::All
}

impl PerformanceRecord {
    pub fn scope(&self) -> Scope {
        Scope::new(self.sport, self.position)
    }

    /// Raw stat value; a stat the collector did not supply counts as zero.
    pub fn stat(&self, name: &str) -> f64 {
        match self.stats.get(name) {
            Some(v) => *v,
            None => {
                debug!(
                    "Record {} has no '{}' stat, treating as 0",
                    self.record_id, name
                );
                0.0
            }
        }
    }

    pub fn bucket_label(&self, bucket: &str) -> Option<&str> {
        self.buckets.get(bucket).map(String::as_str)
    }
}
