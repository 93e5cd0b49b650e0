//! Loading already-collected records into the current partitions.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::db::models::{PerformanceRecord, Sport};
use crate::db::{partition_path, Database};
use crate::rarity::population::PartitionKind;
use crate::rarity::sports;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub read: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Parse NDJSON lines into bucketed records grouped by sport. Lines that do
/// not parse, or whose sport and position name no adapter, are logged and
/// counted.
pub fn parse_records(
    reader: impl BufRead,
) -> Result<(BTreeMap<Sport, Vec<PerformanceRecord>>, ImportStats)> {
    let mut stats = ImportStats::default();
    let mut by_sport: BTreeMap<Sport, Vec<PerformanceRecord>> = BTreeMap::new();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.read += 1;

        let mut raw: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Line {}: not JSON: {}", n + 1, e);
                stats.rejected += 1;
                continue;
            }
        };
        let field = |name: &str| raw.get(name).and_then(Value::as_str).unwrap_or_default();
        let adapter = match sports::lookup(field("sport"), field("position")) {
            Ok(a) => a,
            Err(e) => {
                warn!("Line {}: {}", n + 1, e);
                stats.rejected += 1;
                continue;
            }
        };
        // Store the canonical names, whatever alias the line used
        raw["sport"] = Value::from(adapter.scope.sport.as_str());
        raw["position"] = Value::from(adapter.scope.position.as_str());
        let record: PerformanceRecord = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("Line {}: not a performance record: {}", n + 1, e);
                stats.rejected += 1;
                continue;
            }
        };
        match adapter.bucketize(record) {
            Ok(r) => by_sport.entry(r.sport).or_default().push(r),
            Err(e) => {
                warn!("Line {}: {}", n + 1, e);
                stats.rejected += 1;
            }
        }
    }
    Ok((by_sport, stats))
}

/// Append the records of an NDJSON file to `<data_dir>/current/<sport>_current.db`.
pub fn import_file(path: &Path, data_dir: &Path) -> Result<ImportStats> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (by_sport, mut stats) = parse_records(BufReader::new(file))?;

    for (sport, records) in by_sport {
        let db_path = partition_path(data_dir, sport, PartitionKind::Current);
        let db = Database::open(&db_path)?;
        let stored = db.insert_performances(&records)?;
        stats.stored += stored;
        stats.duplicates += records.len() - stored;
        info!(
            "Imported {} {} records into {} ({} already present)",
            stored,
            sport,
            db_path.display(),
            records.len() - stored
        );
    }
    Ok(stats)
}
