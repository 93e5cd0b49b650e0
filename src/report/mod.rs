use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db::models::Position;
use crate::pipeline::BatchReport;

/// Destination for finished batch reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &BatchReport) -> Result<()>;

    /// Called once after every report of a run has been published.
    async fn finish(&self, _reports: &[BatchReport]) -> Result<()> {
        Ok(())
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Logs the rarest lines of each report
pub struct LogSink {
    /// How many all-time entries to print per scope
    pub show: usize,
}

#[async_trait]
impl ReportSink for LogSink {
    async fn publish(&self, report: &BatchReport) -> Result<()> {
        let s = &report.summary;
        info!(
            "[{}] {} rare of {} evaluated, mean score {}",
            report.scope(),
            report.rare_count(),
            s.evaluated,
            s.mean_rarity_score
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| "-".into())
        );
        for (i, r) in report.all_time.iter().take(self.show).enumerate() {
            info!(
                "  #{} {} {} {} ({} of {}, {:.2})",
                i + 1,
                r.record.game_date,
                r.record.player_name,
                r.rarity.classification,
                r.rarity.occurrence_count,
                r.rarity.total_games,
                r.rarity.rarity_score
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Writes `<dir>/<sport>/<stem>_{latest,all_time,summary}.json` per report
/// and an `index.json` listing them.
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirSink { dir: dir.into() }
    }

    /// "rb" for NFL positions, the sport name when the sport is not split
    fn stem(report: &BatchReport) -> String {
        match report.position {
            Position::All => report.sport.to_string(),
            p => p.to_string(),
        }
    }

    fn relative(report: &BatchReport, view: &str) -> String {
        format!("{}/{}_{}.json", report.sport, Self::stem(report), view)
    }

    async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ReportSink for JsonDirSink {
    async fn publish(&self, report: &BatchReport) -> Result<()> {
        let latest = json!({
            "generated_at": report.generated_at,
            "sport": report.sport,
            "position": report.position,
            "source": report.source,
            "total_performances": report.latest.len(),
            "rare_performances": report.latest,
        });
        let all_time = json!({
            "generated_at": report.generated_at,
            "sport": report.sport,
            "position": report.position,
            "top_n": report.top_n,
            "total_rare_performances": report.all_time.len(),
            "top_rare_performances": report.all_time,
        });
        let summary = json!({
            "generated_at": report.generated_at,
            "sport": report.sport,
            "position": report.position,
            "summary": report.summary,
            "uninteresting": report.uninteresting,
            "distributions": report.distributions,
        });

        for (view, body) in [("latest", latest), ("all_time", all_time), ("summary", summary)] {
            let path = self.dir.join(Self::relative(report, view));
            Self::write_json(&path, &body).await?;
        }
        info!("Wrote {} report files under {}", report.scope(), self.dir.display());
        Ok(())
    }

    async fn finish(&self, reports: &[BatchReport]) -> Result<()> {
        let mut sports = serde_json::Map::new();
        for r in reports {
            let entry = sports
                .entry(r.sport.to_string())
                .or_insert_with(|| json!({}));
            entry[Self::stem(r)] = json!({
                "latest": Self::relative(r, "latest"),
                "all_time": Self::relative(r, "all_time"),
                "summary": Self::relative(r, "summary"),
                "rare_performances": r.rare_count(),
                "incomplete_population": r.summary.incomplete_population,
            });
        }
        let index = json!({
            "last_updated": Utc::now(),
            "total_rare_performances": reports.iter().map(BatchReport::rare_count).sum::<usize>(),
            "sports": sports,
        });
        Self::write_json(&self.dir.join("index.json"), &index).await
    }

    fn name(&self) -> &str {
        "json"
    }
}
