// src/models/score.rs

//! Scoring verdicts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NormalizedPosting;

/// Remote classification derived from posting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Explicit,
    #[default]
    Unknown,
    Negative,
}

/// Points contributed by each scoring component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub remote: u32,
    pub title: u32,
    pub stack: u32,
    pub seniority: i32,
}

/// Why a posting is not eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// A required field is missing.
    Malformed(String),
    /// A negative remote pattern matched.
    RemoteVeto(String),
    /// Location is outside Brazil with no anywhere/Brazil mention.
    ForeignLocation(String),
    /// No positive remote signal while strict remote is on.
    RemoteUnconfirmed,
    BelowThreshold { score: u32, threshold: u32 },
}

impl RejectReason {
    /// Stable code for aggregation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::RemoteVeto(_) => "remote_veto",
            Self::ForeignLocation(_) => "foreign_location",
            Self::RemoteUnconfirmed => "remote_unconfirmed",
            Self::BelowThreshold { .. } => "below_threshold",
        }
    }

    /// Evidence that the opening itself is unacceptable, as opposed to a
    /// copy that lacks data.
    pub fn is_negative_evidence(&self) -> bool {
        matches!(self, Self::RemoteVeto(_) | Self::ForeignLocation(_))
    }

    /// Whether this reason forces ineligibility regardless of score.
    pub fn is_hard(&self) -> bool {
        !matches!(self, Self::BelowThreshold { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(field) => write!(f, "malformed: missing {field}"),
            Self::RemoteVeto(pattern) => write!(f, "remote_veto: {pattern}"),
            Self::ForeignLocation(location) => write!(f, "foreign_location: {location}"),
            Self::RemoteUnconfirmed => f.write_str("remote_unconfirmed"),
            Self::BelowThreshold { score, threshold } => {
                write!(f, "below_threshold: {score} < {threshold}")
            }
        }
    }
}

/// Verdict for one posting under one ruleset version. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub fingerprint: String,
    /// 0..=100
    pub score: u32,
    pub eligible: bool,
    /// A hard reject fired
    pub vetoed: bool,
    pub remote: RemoteStatus,
    pub reasons: Vec<RejectReason>,
    /// Positive evidence in evaluation order (e.g. `role:data engineer`)
    pub signals: Vec<String>,
    pub breakdown: ScoreBreakdown,
    pub evaluated_at: DateTime<Utc>,
    pub ruleset_version: String,
}

/// A posting paired with its verdict, as persisted in `scored.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPosting {
    pub posting: NormalizedPosting,
    pub result: ScoreResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_display() {
        assert_eq!(
            RejectReason::RemoteVeto("\\bhibrido\\b".into()).to_string(),
            "remote_veto: \\bhibrido\\b"
        );
        assert_eq!(
            RejectReason::BelowThreshold {
                score: 30,
                threshold: 50
            }
            .to_string(),
            "below_threshold: 30 < 50"
        );
        assert_eq!(
            RejectReason::Malformed("url".into()).to_string(),
            "malformed: missing url"
        );
    }

    #[test]
    fn test_reason_hardness() {
        assert!(RejectReason::RemoteUnconfirmed.is_hard());
        assert!(RejectReason::ForeignLocation("Lisboa".into()).is_hard());
        assert!(
            !RejectReason::BelowThreshold {
                score: 1,
                threshold: 2
            }
            .is_hard()
        );
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_value(RejectReason::RemoteUnconfirmed).unwrap();
        assert_eq!(json["code"], "remote_unconfirmed");
        let json = serde_json::to_value(RejectReason::RemoteVeto("x".into())).unwrap();
        assert_eq!(json["code"], "remote_veto");
        assert_eq!(json["detail"], "x");
    }
}
