//! Pipeline stages and the run orchestrator.
//!
//! - `normalize`: payload mapping, deterministic detection, enrichment
//! - `scoring`: relevance and eligibility
//! - `merge`: same-fingerprint merging and ranking
//! - `notify`: rendering and delivery
//! - `pipeline`: stage sequencing, artifacts and replay

pub mod merge;
pub mod normalize;
pub mod notify;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod scoring;
pub mod stack;

pub use normalize::{EnrichmentPolicy, NormalizeOutcome, Normalizer};
pub use notify::{Notifier, NotifyOutcome, render_batch, render_detail, render_summary};
pub use pipeline::{Orchestrator, RunOptions, Stage, run_pipeline};
pub use scoring::{ScoringEngine, evaluate};
