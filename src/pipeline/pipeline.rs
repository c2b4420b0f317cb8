// src/pipeline/pipeline.rs

//! Run orchestration: fetch → normalize → score → dedup → notify.
//!
//! Every stage persists its output under `runs/<run_id>/` so a later run
//! can replay from `normalized.json` or `scored.json`. The report is written
//! whether the run succeeds or fails.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;

use super::merge::{merge_by_fingerprint, rank};
use super::normalize::{EnrichmentPolicy, Normalizer};
use super::notify::{Notifier, render_batch};
use super::scoring::ScoringEngine;
use crate::config::load_all;
use crate::error::{AppError, Result};
use crate::models::{
    Config, NormalizedPosting, RawRecord, RuleSet, RunReport, RunStatus, ScoredPosting,
    SourceOutcome,
};
use crate::services::{
    ChatEnricher, ConfiguredSource, Deliverer, LogDeliverer, build_deliverer, build_sources,
};
use crate::storage::{
    Artifact, ArtifactStorage, DedupStore, FileDedupStore, LocalStorage, RunLock, run_id_for,
};
use crate::utils::console;
use crate::utils::http::{client_builder, create_async_client};

/// Stage a run starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Score,
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Score => "score",
            Self::Notify => "notify",
        }
    }

    /// Artifact a replay from this stage reads.
    pub fn input_artifact(&self) -> Option<Artifact> {
        match self {
            Self::Fetch => None,
            Self::Score => Some(Artifact::Normalized),
            Self::Notify => Some(Artifact::Scored),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fetch" => Ok(Self::Fetch),
            "score" => Ok(Self::Score),
            "notify" => Ok(Self::Notify),
            other => Err(AppError::config(format!(
                "unknown stage '{other}' (expected fetch, score or notify)"
            ))),
        }
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stage: Stage,
    /// Run to replay from; defaults to the latest run with the input artifact
    pub from_run: Option<String>,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn full(dry_run: bool) -> Self {
        Self {
            stage: Stage::Fetch,
            from_run: None,
            dry_run,
        }
    }

    pub fn replay(stage: Stage, from_run: Option<String>, dry_run: bool) -> Self {
        Self {
            stage,
            from_run,
            dry_run,
        }
    }
}

/// Sequences the stages of one run over injected collaborators.
pub struct Orchestrator<'a> {
    config: &'a Config,
    rules: &'a RuleSet,
    artifacts: &'a dyn ArtifactStorage,
    store: &'a dyn DedupStore,
    deliverer: &'a dyn Deliverer,
    enrichment: Option<EnrichmentPolicy>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        rules: &'a RuleSet,
        artifacts: &'a dyn ArtifactStorage,
        store: &'a dyn DedupStore,
        deliverer: &'a dyn Deliverer,
    ) -> Self {
        Self {
            config,
            rules,
            artifacts,
            store,
            deliverer,
            enrichment: None,
        }
    }

    pub fn with_enrichment(mut self, policy: EnrichmentPolicy) -> Self {
        self.enrichment = Some(policy);
        self
    }

    /// Execute a run and persist its report.
    ///
    /// `now` is the run clock: it names the run and stamps every score and
    /// dedup mutation.
    pub async fn execute(
        &self,
        sources: &[ConfiguredSource],
        options: &RunOptions,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        let run_id = run_id_for(now);
        let mut report = RunReport::new(&run_id, now, options.dry_run);
        report.entry_stage = options.stage.as_str().to_string();
        report.ruleset_version = self.rules.ruleset_version();

        let result = match options.stage {
            Stage::Fetch => self.run_from_fetch(sources, &mut report, now).await,
            stage => self.run_replay(stage, options, &mut report, now).await,
        };

        report.finished_at = Some(Utc::now());
        report.status = match &result {
            Ok(()) => RunStatus::Succeeded,
            Err(e) => RunStatus::Failed(e.to_string()),
        };

        if let Err(e) = self.artifacts.write_report(&run_id, &report).await {
            log::error!("Failed to write report for {}: {}", run_id, e);
            result?;
            return Err(e);
        }

        result.map(|()| report)
    }

    async fn run_from_fetch(
        &self,
        sources: &[ConfiguredSource],
        report: &mut RunReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        console::step(1, 4, "Fetch - Querying job boards");
        let records = self.fetch(sources, report).await;
        self.artifacts.write_raw(&report.run_id, &records).await?;
        if report.sources_ok() == 0 {
            return Err(AppError::AllSourcesFailed {
                count: report.sources.len(),
            });
        }

        console::step(2, 4, "Normalize - Mapping payloads");
        let postings = self.normalize(&records, report).await?;
        self.artifacts
            .write_normalized(&report.run_id, &postings)
            .await?;

        self.score_and_notify(postings, report, now, 3).await
    }

    async fn run_replay(
        &self,
        stage: Stage,
        options: &RunOptions,
        report: &mut RunReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(artifact) = stage.input_artifact() else {
            return Err(AppError::config("fetch is not a replay stage"));
        };
        let source_run = match &options.from_run {
            Some(id) => id.clone(),
            None => self
                .artifacts
                .latest_run_with(artifact)
                .await?
                .ok_or_else(|| AppError::config(format!("no previous run has {artifact}")))?,
        };
        report.replay_of = Some(source_run.clone());
        log::info!("Replaying from {} of run {}", artifact, source_run);

        let missing = || AppError::config(format!("run {source_run} has no {artifact}"));
        match stage {
            Stage::Score => {
                let postings = self
                    .artifacts
                    .read_normalized(&source_run)
                    .await?
                    .ok_or_else(missing)?;
                report.normalized = postings.len();
                self.artifacts
                    .write_normalized(&report.run_id, &postings)
                    .await?;
                self.score_and_notify(postings, report, now, 1).await
            }
            _ => {
                let scored = self
                    .artifacts
                    .read_scored(&source_run)
                    .await?
                    .ok_or_else(missing)?;
                report.scored = scored.len();
                report.eligible = scored.iter().filter(|s| s.result.eligible).count();
                console::step(1, 1, "Notify - Dedup and delivery");
                self.dedup_and_notify(scored, report, now).await
            }
        }
    }

    /// Fetch every source concurrently, each under its own timeout.
    async fn fetch(&self, sources: &[ConfiguredSource], report: &mut RunReport) -> Vec<RawRecord> {
        let terms = self.rules.all_search_terms();
        let limit = Duration::from_secs(self.config.schedule.source_timeout_secs);

        let fetches = sources.iter().map(|configured| {
            let terms = &terms;
            async move {
                let source = &configured.source;
                let result = tokio::time::timeout(
                    limit,
                    source.fetch_terms(terms, configured.max_results),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(AppError::source_unavailable(
                        source.id(),
                        format!("timed out after {}s", limit.as_secs()),
                    ))
                });
                (source.id().to_string(), result)
            }
        });

        let mut records = Vec::new();
        for (source_id, result) in future::join_all(fetches).await {
            match result {
                Ok(batch) => {
                    console::sub_item(&format!("{source_id}: {} postings", batch.len()));
                    report.sources.push(SourceOutcome {
                        source_id,
                        ok: true,
                        records: batch.len(),
                        error: None,
                    });
                    records.extend(batch);
                }
                Err(e) => {
                    log::warn!("Source {} failed: {}", source_id, e);
                    report.sources.push(SourceOutcome {
                        source_id,
                        ok: false,
                        records: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        report.fetched = records.len();
        records
    }

    async fn normalize(
        &self,
        records: &[RawRecord],
        report: &mut RunReport,
    ) -> Result<Vec<NormalizedPosting>> {
        let normalizer = Normalizer::new(self.rules)?;
        let outcome = normalizer
            .normalize_all(records, self.enrichment.as_ref())
            .await;

        report.normalized = outcome.postings.len();
        report.malformed = outcome.malformed.len();
        report.enrichment_degraded = outcome.degraded;
        report.errors.extend(outcome.malformed);
        if outcome.enriched > 0 || outcome.degraded > 0 {
            console::sub_item(&format!(
                "enrichment: {} enriched, {} degraded",
                outcome.enriched, outcome.degraded
            ));
        }
        Ok(outcome.postings)
    }

    async fn score_and_notify(
        &self,
        postings: Vec<NormalizedPosting>,
        report: &mut RunReport,
        now: DateTime<Utc>,
        first_step: usize,
    ) -> Result<()> {
        let total = first_step + 1;
        console::step(first_step, total, "Score - Evaluating postings");

        let engine = ScoringEngine::new(self.rules)?;
        let scored: Vec<ScoredPosting> = postings
            .into_iter()
            .map(|posting| {
                let result = engine.evaluate(&posting, now);
                ScoredPosting { posting, result }
            })
            .collect();
        report.scored = scored.len();

        let (mut merged, stats) = merge_by_fingerprint(scored);
        if stats.merged_away() > 0 {
            console::sub_item(&format!("{} duplicate postings merged", stats.merged_away()));
        }
        rank(&mut merged);

        for item in &merged {
            if item.result.eligible {
                report.eligible += 1;
            } else if let Some(reason) = item
                .result
                .reasons
                .iter()
                .find(|r| r.is_hard())
                .or_else(|| item.result.reasons.first())
            {
                report.record_rejection(reason.code());
            }
        }
        console::sub_item(&format!(
            "{} eligible, {} rejected",
            report.eligible,
            report.total_rejected()
        ));

        self.artifacts.write_scored(&report.run_id, &merged).await?;

        console::step(total, total, "Notify - Dedup and delivery");
        self.dedup_and_notify(merged, report, now).await
    }

    /// Record sightings, drop already-notified postings, cap and deliver.
    async fn dedup_and_notify(
        &self,
        ranked: Vec<ScoredPosting>,
        report: &mut RunReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut pending = Vec::new();
        for item in ranked {
            let fp = &item.result.fingerprint;
            if fp.is_empty() {
                continue;
            }
            self.store.record_seen(fp, now).await?;
            if !item.result.eligible {
                continue;
            }
            if self.store.is_eligible_for_notification(fp, now).await? {
                pending.push(item);
            } else {
                report.deduplicated_out += 1;
            }
        }

        let cap = self.config.notifier.max_postings_per_run;
        if pending.len() > cap {
            report.truncated = pending.len() - cap;
            pending.truncate(cap);
        }
        console::sub_item(&format!(
            "{} new, {} already notified, {} over the cap",
            pending.len(),
            report.deduplicated_out,
            report.truncated
        ));

        if report.dry_run {
            let messages = render_batch(&pending, now, self.config.notifier.description_chars);
            log::info!(
                "Dry run: {} message(s) rendered, nothing delivered",
                messages.len()
            );
            for item in &pending {
                console::sub_item(&format!(
                    "[{}] {} | {}",
                    item.result.score, item.posting.title, item.posting.url
                ));
            }
            return Ok(());
        }

        let notifier = Notifier::new(self.deliverer, self.store, &self.config.notifier);
        let outcome = notifier.notify(&pending, now).await?;
        report.notified = outcome.notified;
        report.failed_delivery = outcome.failed;
        report.errors.extend(outcome.errors);
        Ok(())
    }
}

/// Build the enrichment policy, or `None` when disabled or unusable.
fn enrichment_policy(config: &Config) -> Option<EnrichmentPolicy> {
    if !config.enrichment.enabled {
        return None;
    }
    match ChatEnricher::from_config(&config.enrichment, client_builder(&config.http)) {
        Ok(enricher) => Some(EnrichmentPolicy {
            enricher: Arc::new(enricher),
            timeout: Duration::from_secs(config.enrichment.timeout_secs),
            max_concurrent: config.enrichment.max_concurrent,
        }),
        Err(e) => {
            log::warn!("Enrichment disabled: {}", e);
            None
        }
    }
}

/// Run the pipeline against a storage directory.
///
/// Loads both configuration files, holds `run.lock` for the duration of
/// the run and wires the configured collaborators.
pub async fn run_pipeline(storage_dir: &Path, options: &RunOptions) -> Result<RunReport> {
    let (config, rules) = load_all(storage_dir)?;
    let now = Utc::now();
    let run_id = run_id_for(now);

    console::header(&format!("jobwatch run {run_id} ({})", options.stage));

    let lock = RunLock::acquire(
        storage_dir,
        &run_id,
        now,
        config.schedule.stale_lock_after(),
    )?;
    log::debug!("Acquired run lock (pid {})", lock.info().pid);

    let storage = LocalStorage::new(storage_dir);
    let store = match FileDedupStore::open(storage.clone(), config.dedup.cooldown()).await {
        Ok(store) => store,
        Err(e) => {
            let mut report = RunReport::new(&run_id, now, options.dry_run);
            report.entry_stage = options.stage.as_str().to_string();
            report.finished_at = Some(Utc::now());
            report.status = RunStatus::Failed(e.to_string());
            if let Err(write_err) = storage.write_report(&run_id, &report).await {
                log::error!("Failed to write report for {}: {}", run_id, write_err);
            }
            return Err(e);
        }
    };

    let client = create_async_client(&config.http)?;
    let sources = if options.stage == Stage::Fetch {
        build_sources(&config, &client)
    } else {
        Vec::new()
    };
    let deliverer: Box<dyn Deliverer> = if options.dry_run {
        Box::new(LogDeliverer)
    } else {
        build_deliverer(&config.notifier, &client)?
    };

    let mut orchestrator =
        Orchestrator::new(&config, &rules, &storage, &store, deliverer.as_ref());
    if options.stage != Stage::Notify
        && let Some(policy) = enrichment_policy(&config)
    {
        orchestrator = orchestrator.with_enrichment(policy);
    }

    let result = orchestrator.execute(&sources, options, now).await;
    lock.release();
    result
}
