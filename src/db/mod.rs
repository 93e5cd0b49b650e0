use anyhow::{anyhow, bail, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::rarity::population::{MatchKey, Occurrences, Partition, PartitionKind};

pub mod models;
use models::*;

/// Shared handle on one partition file (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open a database that must already exist. No migrations are run, so an
    /// archive built elsewhere is read exactly as found.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("database not found: {}", path.display());
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Store a batch and its bucket labels in one transaction, returning how
    /// many were new. A record whose id is already present is skipped; stored
    /// records are never updated.
    pub fn insert_performances(&self, records: &[PerformanceRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut perf = tx.prepare(
                "INSERT OR IGNORE INTO performances (
                    record_id, sport, position, player_id, player_name,
                    season, game_date, week, team, opponent, stats
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            )?;
            let mut bucket = tx.prepare(
                "INSERT INTO performance_buckets (record_id, bucket, label) VALUES (?1,?2,?3)",
            )?;
            for r in records {
                let stats = serde_json::to_string(&r.stats)?;
                let changed = perf.execute(params![
                    r.record_id,
                    r.sport.as_str(),
                    r.position.as_str(),
                    r.player_id,
                    r.player_name,
                    r.season,
                    r.game_date,
                    r.week,
                    r.team,
                    r.opponent,
                    stats,
                ])?;
                if changed == 0 {
                    debug!("Record {} already stored, skipping", r.record_id);
                    continue;
                }
                for (name, label) in &r.buckets {
                    bucket.execute(params![r.record_id, name, label])?;
                }
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    // ── Population queries ────────────────────────────────────────────────────

    pub fn count_matching(&self, scope: Scope, key: &MatchKey) -> Result<u64> {
        let (clause, values) = match_clause(scope, key);
        let sql = format!("SELECT COUNT(*) FROM performances p WHERE {}", clause);
        let conn = self.conn()?;
        let n: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn total_count(&self, scope: Scope) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM performances WHERE sport=?1 AND position=?2",
            params![scope.sport.as_str(), scope.position.as_str()],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    pub fn first_and_last_matching(&self, scope: Scope, key: &MatchKey) -> Result<Occurrences> {
        let (clause, values) = match_clause(scope, key);
        let conn = self.conn()?;
        let pick = |order: &str| -> Result<Option<PerformanceRecord>> {
            let sql = format!(
                "SELECT {} FROM performances p WHERE {} ORDER BY p.game_date {o}, p.record_id {o} LIMIT 1",
                PERFORMANCE_COLUMNS,
                clause,
                o = order
            );
            let found = conn
                .query_row(&sql, params_from_iter(values.iter()), map_performance)
                .optional()?;
            match found {
                Some(mut record) => {
                    record.buckets = load_buckets(&conn, &record.record_id)?;
                    Ok(Some(record))
                }
                None => Ok(None),
            }
        };
        let first = pick("ASC")?;
        let last = pick("DESC")?;
        Ok(Occurrences { first, last })
    }

    /// Every record in scope with its labels, newest game first
    pub fn list_performances(&self, scope: Scope) -> Result<Vec<PerformanceRecord>> {
        let conn = self.conn()?;
        let (sport, position) = (scope.sport.as_str(), scope.position.as_str());

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM performances p WHERE p.sport=?1 AND p.position=?2
             ORDER BY p.game_date DESC, p.record_id ASC",
            PERFORMANCE_COLUMNS
        ))?;
        let mut records = stmt
            .query_map(params![sport, position], map_performance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT b.record_id, b.bucket, b.label
             FROM performance_buckets b JOIN performances p ON p.record_id = b.record_id
             WHERE p.sport=?1 AND p.position=?2",
        )?;
        let mut labels: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        let rows = stmt.query_map(params![sport, position], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (record_id, bucket, label) = row?;
            labels.entry(record_id).or_default().insert(bucket, label);
        }

        for r in &mut records {
            if let Some(b) = labels.remove(&r.record_id) {
                r.buckets = b;
            }
        }
        Ok(records)
    }

    /// Newest records in scope passing `filter`, at most `limit`. Rows are
    /// read newest first and the scan stops once `limit` are kept.
    pub fn recent_performances(
        &self,
        scope: Scope,
        filter: &dyn Fn(&PerformanceRecord) -> bool,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM performances p WHERE p.sport=?1 AND p.position=?2
             ORDER BY p.game_date DESC, p.record_id ASC",
            PERFORMANCE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![scope.sport.as_str(), scope.position.as_str()])?;

        let mut records = Vec::new();
        while records.len() < limit {
            let Some(row) = rows.next()? else {
                break;
            };
            let record = map_performance(row)?;
            if filter(&record) {
                records.push(record);
            }
        }
        drop(rows);

        for r in &mut records {
            r.buckets = load_buckets(&conn, &r.record_id)?;
        }
        Ok(records)
    }

    pub fn bucket_distribution(&self, scope: Scope, bucket: &str) -> Result<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT b.label, COUNT(*)
             FROM performance_buckets b JOIN performances p ON p.record_id = b.record_id
             WHERE p.sport=?1 AND p.position=?2 AND b.bucket=?3
             GROUP BY b.label",
        )?;
        let rows = stmt
            .query_map(
                params![scope.sport.as_str(), scope.position.as_str(), bucket],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// `<data_dir>/archive/nfl_archive.db`, `<data_dir>/current/nfl_current.db`, ...
pub fn partition_path(data_dir: &Path, sport: Sport, kind: PartitionKind) -> PathBuf {
    data_dir
        .join(kind.to_string())
        .join(format!("{}_{}.db", sport, kind))
}

/// A partition file served through [`Partition`]
#[derive(Clone)]
pub struct SqlitePartition {
    kind: PartitionKind,
    db: Database,
}

impl SqlitePartition {
    pub fn new(kind: PartitionKind, db: Database) -> Self {
        SqlitePartition { kind, db }
    }

    /// Open the partition file for `sport` if it exists. A missing file is
    /// `Ok(None)`; a file that exists but cannot be opened is an error.
    pub fn open(data_dir: &Path, sport: Sport, kind: PartitionKind) -> Result<Option<Self>> {
        let path = partition_path(data_dir, sport, kind);
        if !path.exists() {
            debug!("No {} partition at {}", kind, path.display());
            return Ok(None);
        }
        let db = Database::open_existing(&path)?;
        info!("Opened {} partition {}", kind, path.display());
        Ok(Some(SqlitePartition::new(kind, db)))
    }
}

impl Partition for SqlitePartition {
    fn kind(&self) -> PartitionKind {
        self.kind
    }

    fn count_matching(&self, scope: Scope, key: &MatchKey) -> Result<u64> {
        self.db.count_matching(scope, key)
    }

    fn total_count(&self, scope: Scope) -> Result<u64> {
        self.db.total_count(scope)
    }

    fn first_and_last_matching(&self, scope: Scope, key: &MatchKey) -> Result<Occurrences> {
        self.db.first_and_last_matching(scope, key)
    }

    fn list_performances(&self, scope: Scope) -> Result<Vec<PerformanceRecord>> {
        self.db.list_performances(scope)
    }

    fn recent_performances(
        &self,
        scope: Scope,
        filter: &dyn Fn(&PerformanceRecord) -> bool,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>> {
        self.db.recent_performances(scope, filter, limit)
    }

    fn bucket_distribution(&self, scope: Scope, bucket: &str) -> Result<Vec<(String, u64)>> {
        self.db.bucket_distribution(scope, bucket)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const PERFORMANCE_COLUMNS: &str = "p.record_id, p.sport, p.position, p.player_id, p.player_name,
    p.season, p.game_date, p.week, p.team, p.opponent, p.stats";

/// WHERE clause over `performances p` selecting the scope and requiring one
/// bucket row per key entry. Labels are always bound, never spliced.
fn match_clause(scope: Scope, key: &MatchKey) -> (String, Vec<Value>) {
    let mut clause = String::from("p.sport = ?1 AND p.position = ?2");
    let mut values = vec![
        Value::Text(scope.sport.as_str().to_string()),
        Value::Text(scope.position.as_str().to_string()),
    ];
    for (bucket, label) in key.iter() {
        let n = values.len();
        clause.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM performance_buckets b
                WHERE b.record_id = p.record_id AND b.bucket = ?{} AND b.label = ?{})",
            n + 1,
            n + 2
        ));
        values.push(Value::Text(bucket.to_string()));
        values.push(Value::Text(label.to_string()));
    }
    (clause, values)
}

fn load_buckets(conn: &Connection, record_id: &str) -> Result<BTreeMap<String, String>> {
    let mut stmt =
        conn.prepare("SELECT bucket, label FROM performance_buckets WHERE record_id=?1")?;
    let labels = stmt
        .query_map(params![record_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
    Ok(labels)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn map_performance(row: &rusqlite::Row) -> rusqlite::Result<PerformanceRecord> {
    let sport: String = row.get(1)?;
    let position: String = row.get(2)?;
    let stats: String = row.get(10)?;
    Ok(PerformanceRecord {
        record_id: row.get(0)?,
        sport: sport.parse().map_err(|e| conversion_error(1, e))?,
        position: position.parse().map_err(|e| conversion_error(2, e))?,
        player_id: row.get(3)?,
        player_name: row.get(4)?,
        season: row.get(5)?,
        game_date: row.get(6)?,
        week: row.get(7)?,
        team: row.get(8)?,
        opponent: row.get(9)?,
        stats: serde_json::from_str(&stats).map_err(|e| conversion_error(10, e))?,
        buckets: BTreeMap::new(),
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS performances (
    record_id   TEXT    PRIMARY KEY,
    sport       TEXT    NOT NULL,
    position    TEXT    NOT NULL DEFAULT 'all',
    player_id   TEXT    NOT NULL,
    player_name TEXT    NOT NULL,
    season      INTEGER NOT NULL,
    game_date   TEXT    NOT NULL,
    week        INTEGER,
    team        TEXT,
    opponent    TEXT,
    stats       TEXT    NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS performance_buckets (
    record_id   TEXT    NOT NULL,
    bucket      TEXT    NOT NULL,
    label       TEXT    NOT NULL,
    PRIMARY KEY (record_id, bucket),
    FOREIGN KEY (record_id) REFERENCES performances(record_id)
);

CREATE INDEX IF NOT EXISTS idx_performances_scope ON performances(sport, position, game_date);
CREATE INDEX IF NOT EXISTS idx_buckets_label ON performance_buckets(bucket, label);
"#;
