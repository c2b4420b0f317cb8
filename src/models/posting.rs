// src/models/posting.rs

//! Raw and normalized job posting models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which payload shape a raw record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Gupy,
    Greenhouse,
    Lever,
    /// Payload already uses the canonical posting field names.
    Generic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gupy => "gupy",
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// A posting exactly as a source returned it.
///
/// Never transformed after creation; the normalizer reads `native_payload`
/// according to `source_kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Configured source identifier (e.g., "gupy", "greenhouse:nubank")
    pub source_id: String,
    pub source_kind: SourceKind,
    /// Search term that produced this record
    #[serde(default)]
    pub query: String,
    pub fetched_at: DateTime<Utc>,
    pub native_payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(
        source_id: impl Into<String>,
        source_kind: SourceKind,
        query: impl Into<String>,
        fetched_at: DateTime<Utc>,
        native_payload: serde_json::Value,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_kind,
            query: query.into(),
            fetched_at,
            native_payload,
        }
    }
}

/// Coarse country classification of a posting's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Country {
    #[serde(rename = "BR")]
    Br,
    Other,
    #[default]
    Unknown,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Lead,
    Staff,
    #[default]
    Unknown,
}

impl Seniority {
    pub const ALL: [Seniority; 7] = [
        Self::Intern,
        Self::Junior,
        Self::Mid,
        Self::Senior,
        Self::Lead,
        Self::Staff,
        Self::Unknown,
    ];

    /// Key used in ruleset tables and enrichment output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intern => "INTERN",
            Self::Junior => "JUNIOR",
            Self::Mid => "MID",
            Self::Senior => "SENIOR",
            Self::Lead => "LEAD",
            Self::Staff => "STAFF",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a key, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == upper)
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    DataEngineer,
    DataAnalyst,
    DataScientist,
    Automation,
    AiMl,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::DataEngineer,
        Self::DataAnalyst,
        Self::DataScientist,
        Self::Automation,
        Self::AiMl,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataEngineer => "DATA_ENGINEER",
            Self::DataAnalyst => "DATA_ANALYST",
            Self::DataScientist => "DATA_SCIENTIST",
            Self::Automation => "AUTOMATION",
            Self::AiMl => "AI_ML",
            Self::Other => "OTHER",
        }
    }

    /// Parse a key, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_uppercase();
        Self::ALL.into_iter().find(|c| c.as_str() == upper)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a posting's fields were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Deterministic extraction only; enrichment was not needed or disabled.
    #[default]
    Deterministic,
    /// At least one gap was filled by the enricher.
    Enriched,
    /// The enricher failed or timed out; deterministic fallback was used.
    Degraded,
}

/// `remote_text` value written when a board flags the posting as remote
/// in a structured field.
pub const REMOTE_WORKPLACE: &str = "remote";

/// Canonical posting shape shared by all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPosting {
    pub title: String,
    pub company: String,
    /// Plain text, HTML stripped
    pub description: String,
    pub url: String,
    pub location_text: String,
    pub location_country: Country,
    /// Verbatim remote-related phrase, possibly empty
    pub remote_text: String,
    pub tech_stack: BTreeSet<String>,
    pub seniority: Seniority,
    pub category: Category,
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub enrichment: EnrichmentStatus,
}

impl NormalizedPosting {
    /// Create an empty posting for the given source and URL.
    pub fn new(source_id: impl Into<String>, url: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            title: String::new(),
            company: String::new(),
            description: String::new(),
            url: url.into(),
            location_text: String::new(),
            location_country: Country::Unknown,
            remote_text: String::new(),
            tech_stack: BTreeSet::new(),
            seniority: Seniority::Unknown,
            category: Category::Other,
            source_id: source_id.into(),
            fetched_at,
            enrichment: EnrichmentStatus::Deterministic,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, text: impl Into<String>, country: Country) -> Self {
        self.location_text = text.into();
        self.location_country = country;
        self
    }

    pub fn with_remote_text(mut self, remote_text: impl Into<String>) -> Self {
        self.remote_text = remote_text.into();
        self
    }

    /// The board's own workplace field says remote.
    pub fn workplace_is_remote(&self) -> bool {
        self.remote_text.trim().eq_ignore_ascii_case(REMOTE_WORKPLACE)
    }

    pub fn with_seniority(mut self, seniority: Seniority) -> Self {
        self.seniority = seniority;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_stack<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_stack.extend(tokens.into_iter().map(Into::into));
        self
    }
}

/// Fields an enricher may propose. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialPosting {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub remote_text: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Country::Br).unwrap(), "\"BR\"");
        assert_eq!(serde_json::to_string(&Country::Other).unwrap(), "\"OTHER\"");
        assert_eq!(
            serde_json::to_string(&Category::AiMl).unwrap(),
            "\"AI_ML\""
        );
        assert_eq!(
            serde_json::to_string(&Category::DataEngineer).unwrap(),
            "\"DATA_ENGINEER\""
        );
        assert_eq!(
            serde_json::to_string(&Seniority::Senior).unwrap(),
            "\"SENIOR\""
        );
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(Seniority::parse("senior"), Some(Seniority::Senior));
        assert_eq!(Seniority::parse(" LEAD "), Some(Seniority::Lead));
        assert_eq!(Seniority::parse("pleno"), None);
        assert_eq!(Category::parse("ai_ml"), Some(Category::AiMl));
        assert_eq!(Category::parse("marketing"), None);
    }

    #[test]
    fn test_builder() {
        let posting = NormalizedPosting::new("gupy", "https://acme.gupy.io/job/1", Utc::now())
            .with_title("Data Engineer")
            .with_stack(["python", "sql"]);
        assert_eq!(posting.title, "Data Engineer");
        assert_eq!(posting.tech_stack.len(), 2);
        assert_eq!(posting.seniority, Seniority::Unknown);
        assert_eq!(posting.enrichment, EnrichmentStatus::Deterministic);
    }
}
