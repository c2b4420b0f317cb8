// src/models/report.rs

//! Per-run outcome report persisted as `runs/<run_id>/report.json`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fetch outcome for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub ok: bool,
    pub records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Succeeded,
    Failed(String),
}

/// Counters and structured stage failures for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Stage the run started from (`fetch`, `score` or `notify`)
    pub entry_stage: String,
    /// Run whose artifacts a replay started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_of: Option<String>,
    #[serde(default)]
    pub ruleset_version: String,

    pub sources: Vec<SourceOutcome>,
    pub fetched: usize,
    pub normalized: usize,
    pub malformed: usize,
    pub enrichment_degraded: usize,
    pub scored: usize,
    pub eligible: usize,
    /// Rejections keyed by reason code
    pub rejected: BTreeMap<String, usize>,
    pub deduplicated_out: usize,
    /// Eligible postings cut by the per-run cap
    pub truncated: usize,
    pub notified: usize,
    pub failed_delivery: usize,

    /// Human-readable stage errors (malformed records, delivery failures)
    pub errors: Vec<String>,
    pub status: RunStatus,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            dry_run,
            entry_stage: "fetch".to_string(),
            ..Default::default()
        }
    }

    pub fn sources_ok(&self) -> usize {
        self.sources.iter().filter(|s| s.ok).count()
    }

    pub fn sources_failed(&self) -> usize {
        self.sources.iter().filter(|s| !s.ok).count()
    }

    pub fn record_rejection(&mut self, code: &str) {
        *self.rejected.entry(code.to_string()).or_default() += 1;
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Key/value rows for the CLI summary block.
    pub fn summary_items(&self) -> Vec<(&'static str, String)> {
        let rejected = if self.rejected.is_empty() {
            "0".to_string()
        } else {
            let parts: Vec<String> = self
                .rejected
                .iter()
                .map(|(code, n)| format!("{code}={n}"))
                .collect();
            format!("{} ({})", self.total_rejected(), parts.join(", "))
        };

        let status = match &self.status {
            RunStatus::Running => "running".to_string(),
            RunStatus::Succeeded => "succeeded".to_string(),
            RunStatus::Failed(message) => format!("failed: {message}"),
        };

        vec![
            ("Run", self.run_id.clone()),
            (
                "Stage",
                match &self.replay_of {
                    Some(source) => format!("{} (replay of {source})", self.entry_stage),
                    None => self.entry_stage.clone(),
                },
            ),
            ("Dry run", self.dry_run.to_string()),
            (
                "Sources",
                format!("{} ok / {} failed", self.sources_ok(), self.sources_failed()),
            ),
            ("Fetched", self.fetched.to_string()),
            ("Normalized", self.normalized.to_string()),
            ("Malformed", self.malformed.to_string()),
            ("Degraded", self.enrichment_degraded.to_string()),
            ("Scored", self.scored.to_string()),
            ("Eligible", self.eligible.to_string()),
            ("Rejected", rejected),
            ("Deduplicated", self.deduplicated_out.to_string()),
            ("Truncated", self.truncated.to_string()),
            ("Notified", self.notified.to_string()),
            ("Failed delivery", self.failed_delivery.to_string()),
            ("Status", status),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_counts() {
        let mut report = RunReport::new("r1", Utc::now(), false);
        report.record_rejection("remote_veto");
        report.record_rejection("remote_veto");
        report.record_rejection("below_threshold");
        assert_eq!(report.rejected["remote_veto"], 2);
        assert_eq!(report.total_rejected(), 3);

        let items = report.summary_items();
        let rejected = items.iter().find(|(k, _)| *k == "Rejected").unwrap();
        assert_eq!(rejected.1, "3 (below_threshold=1, remote_veto=2)");
    }

    #[test]
    fn test_source_counts() {
        let mut report = RunReport::new("r1", Utc::now(), true);
        report.sources.push(SourceOutcome {
            source_id: "gupy".into(),
            ok: true,
            records: 4,
            error: None,
        });
        report.sources.push(SourceOutcome {
            source_id: "lever:acme".into(),
            ok: false,
            records: 0,
            error: Some("timeout".into()),
        });
        assert_eq!(report.sources_ok(), 1);
        assert_eq!(report.sources_failed(), 1);
    }
}
