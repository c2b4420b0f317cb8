// src/models/mod.rs

//! Domain models for the jobwatch pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod dedup;
mod posting;
mod report;
mod ruleset;
mod score;

// Re-export all public types
pub use config::{
    Channel, Config, DedupConfig, EnrichmentConfig, HttpConfig, LoggingConfig, NotifierConfig,
    ScheduleConfig, SourceConfig, TelegramConfig,
};
pub use dedup::DedupRecord;
pub use posting::{
    Category, Country, EnrichmentStatus, NormalizedPosting, PartialPosting, REMOTE_WORKPLACE,
    RawRecord, Seniority, SourceKind,
};
pub use report::{RunReport, RunStatus, SourceOutcome};
pub use ruleset::{LocationRules, RemoteRules, RoleRule, RuleSet, compile_folded};
pub use score::{RejectReason, RemoteStatus, ScoreBreakdown, ScoreResult, ScoredPosting};
