use anyhow::Result;
use clap::Parser;
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

mod config;
mod db;
mod ingest;
mod pipeline;
mod rarity;
mod report;

use config::Config;
use db::models::{Scope, Sport};
use db::SqlitePartition;
use pipeline::{BatchReport, CandidateSource, PipelineOptions, ScopePipeline};
use rarity::sports::{adapters_for, ADAPTERS};
use rarity::{Partition, PartitionKind, Population, RarityEngine, RarityPolicy};
use report::{JsonDirSink, LogSink, ReportSink};

/// Open one partition file; a missing or unopenable file yields `None` and
/// the population reports itself incomplete where that matters.
fn open_partition(
    data_dir: &Path,
    sport: Sport,
    kind: PartitionKind,
) -> Option<Arc<dyn Partition>> {
    match SqlitePartition::open(data_dir, sport, kind) {
        Ok(Some(p)) => Some(Arc::new(p)),
        Ok(None) => None,
        Err(e) => {
            warn!("Cannot open {} {} partition: {:#}", sport, kind, e);
            None
        }
    }
}

/// Archive and current partitions of `sport`, shared by all its positions
fn open_partitions(
    data_dir: &Path,
    sport: Sport,
) -> (Option<Arc<dyn Partition>>, Option<Arc<dyn Partition>>) {
    let archive = open_partition(data_dir, sport, PartitionKind::Archive);
    if archive.is_none() {
        warn!("No archive partition for {}; historical counts will be incomplete", sport);
    }
    let current = open_partition(data_dir, sport, PartitionKind::Current);
    (archive, current)
}

/// Run each job on the blocking pool until `deadline`. Returns the finished
/// reports and the number of jobs abandoned at the deadline.
async fn run_pipelines<F>(jobs: Vec<(Scope, F)>, deadline: Instant) -> (Vec<BatchReport>, usize)
where
    F: FnOnce() -> BatchReport + Send + 'static,
{
    let tasks = jobs.into_iter().map(|(scope, job)| async move {
        let handle = tokio::task::spawn_blocking(job);
        (scope, tokio::time::timeout_at(deadline, handle).await)
    });

    let mut reports = Vec::new();
    let mut abandoned = 0;
    for (scope, outcome) in join_all(tasks).await {
        match outcome {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => error!("{} pipeline failed: {}", scope, e),
            Err(_) => {
                error!("{} pipeline did not finish before the deadline", scope);
                abandoned += 1;
            }
        }
    }
    (reports, abandoned)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    if config.dry_run {
        info!("DRY RUN mode: reports are logged, no files written");
    }

    for adapter in ADAPTERS {
        adapter.validate()?;
    }

    if let Some(path) = config.import.clone() {
        let data_dir = config.data_dir.clone();
        let stats =
            tokio::task::spawn_blocking(move || ingest::import_file(&path, &data_dir)).await??;
        info!(
            "Import: {} read, {} stored, {} duplicates, {} rejected",
            stats.read, stats.stored, stats.duplicates, stats.rejected
        );
    }

    let policy = RarityPolicy {
        score_exponent: config.score_exponent,
        attach_occurrences: !config.skip_occurrences,
    };

    // One pipeline per registered scope; positions of a sport share its files
    let deadline = Instant::now() + Duration::from_secs(config.batch_timeout_secs);
    let mut jobs = Vec::new();
    for sport in config.selected_sports() {
        let (archive, current) = open_partitions(&config.data_dir, sport);
        let options = PipelineOptions {
            top_n: config.top_n,
            latest_limit: config.latest_limit,
            source: config
                .source
                .unwrap_or_else(|| CandidateSource::default_for(sport)),
        };
        for adapter in adapters_for(sport) {
            let population = Population::new(adapter.scope, archive.clone(), current.clone());
            let engine = RarityEngine::new(adapter, population, policy);
            let pipeline = ScopePipeline::new(engine, options);
            jobs.push((adapter.scope, move || pipeline.run()));
        }
    }
    info!("Running {} scope pipeline(s)", jobs.len());

    let (reports, abandoned) = run_pipelines(jobs, deadline).await;

    let mut sinks: Vec<Arc<dyn ReportSink>> = vec![Arc::new(LogSink { show: 5 })];
    if !config.dry_run {
        sinks.push(Arc::new(JsonDirSink::new(&config.results_dir)));
    }
    for sink in &sinks {
        for report in &reports {
            if let Err(e) = sink.publish(report).await {
                error!("{} sink failed for {}: {:#}", sink.name(), report.scope(), e);
            }
        }
        if let Err(e) = sink.finish(&reports).await {
            error!("{} sink failed to finish: {:#}", sink.name(), e);
        }
    }

    let rare: usize = reports.iter().map(BatchReport::rare_count).sum();
    let incomplete = reports
        .iter()
        .filter(|r| r.summary.incomplete_population)
        .count();
    info!(
        "Done: {} scope(s), {} rare performance(s), {} with incomplete population",
        reports.len(),
        rare,
        incomplete
    );

    if abandoned > 0 {
        // Abandoned blocking tasks cannot be cancelled and would hold the
        // runtime open on return
        error!(
            "{} scope pipeline(s) exceeded the {}s budget; exiting",
            abandoned, config.batch_timeout_secs
        );
        std::process::exit(1);
    }
    Ok(())
}
