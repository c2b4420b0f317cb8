//! Storage abstractions for run artifacts and dedup state.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Operational configuration
//! ├── ruleset.toml          # Versioned scoring rules
//! ├── run.lock              # Present while a run is active
//! ├── state/
//! │   └── dedup.json        # Fingerprint -> DedupRecord
//! └── runs/
//!     └── 20261016T120000123Z/
//!         ├── raw.json
//!         ├── normalized.json
//!         ├── scored.json
//!         └── report.json
//! ```

pub mod dedup;
pub mod local;
pub mod lock;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{DedupRecord, NormalizedPosting, RawRecord, RunReport, ScoredPosting};

// Re-export for convenience
pub use dedup::{FileDedupStore, MemoryDedupStore};
pub use local::LocalStorage;
pub use lock::RunLock;

/// Per-run artifact files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Raw,
    Normalized,
    Scored,
    Report,
}

impl Artifact {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Raw => "raw.json",
            Self::Normalized => "normalized.json",
            Self::Scored => "scored.json",
            Self::Report => "report.json",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Trait for run artifact backends.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn write_raw(&self, run_id: &str, records: &[RawRecord]) -> Result<()>;

    async fn write_normalized(&self, run_id: &str, postings: &[NormalizedPosting]) -> Result<()>;

    /// Scored postings, ranked.
    async fn write_scored(&self, run_id: &str, scored: &[ScoredPosting]) -> Result<()>;

    async fn write_report(&self, run_id: &str, report: &RunReport) -> Result<()>;

    async fn read_normalized(&self, run_id: &str) -> Result<Option<Vec<NormalizedPosting>>>;

    async fn read_scored(&self, run_id: &str) -> Result<Option<Vec<ScoredPosting>>>;

    async fn read_report(&self, run_id: &str) -> Result<Option<RunReport>>;

    /// Most recent run that has the given artifact.
    async fn latest_run_with(&self, artifact: Artifact) -> Result<Option<String>>;
}

/// Cross-run dedup state.
///
/// The only component allowed to mutate [`DedupRecord`]s. Implementations
/// persist every mutation before returning; any persistence failure is
/// `StateStoreUnavailable`.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<DedupRecord>>;

    /// Create the record on first sighting, otherwise bump `last_seen_at`.
    async fn record_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<DedupRecord>;

    /// Record a confirmed delivery.
    ///
    /// Idempotent inside the cooldown window: returns `false` and changes
    /// nothing when the fingerprint is not currently notifiable.
    async fn mark_notified(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<bool>;

    /// Never notified, or the configured cooldown has elapsed.
    async fn is_eligible_for_notification(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Run identifier for a start time; sorts chronologically.
pub fn run_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_ids_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 9, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap();
        assert_eq!(run_id_for(a), "20260109T230000000Z");
        assert!(run_id_for(a) < run_id_for(b));
    }
}
