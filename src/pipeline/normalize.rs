// src/pipeline/normalize.rs

//! Field normalization.
//!
//! Maps each source's payload onto [`NormalizedPosting`], detects seniority,
//! category, country, remote phrase and tech stack deterministically, and
//! optionally asks an [`Enricher`] to fill the gaps that remain.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;

use super::stack::StackDetector;
use crate::error::{AppError, Result};
use crate::models::{
    Category, Country, EnrichmentStatus, NormalizedPosting, PartialPosting, REMOTE_WORKPLACE,
    RawRecord, RuleSet, Seniority, SourceKind, compile_folded,
};
use crate::services::Enricher;
use crate::utils::text::{fold, html_to_text, normalize_whitespace, truncate};

/// Longest remote phrase kept verbatim.
const REMOTE_TEXT_CHARS: usize = 240;

/// Title patterns per seniority, most senior first.
const SENIORITY_PATTERNS: &[(Seniority, &str)] = &[
    (Seniority::Staff, r"\b(staff|principal)\b"),
    (Seniority::Lead, r"\b(lead|lider|tech\s*lead|head|coordenador|gerente|manager)\b"),
    (Seniority::Senior, r"\b(sr\.?|senior|iii|especialista|specialist)\b"),
    (Seniority::Mid, r"\b(pleno|mid[\s-]*level|ii)\b"),
    (Seniority::Junior, r"\b(jr\.?|junior|entry[\s-]*level|trainee)\b"),
    (Seniority::Intern, r"\b(estagio|estagiari[oa]|intern(ship)?)\b"),
];

/// Title patterns per category, checked in order.
const CATEGORY_PATTERNS: &[(Category, &str)] = &[
    (
        Category::DataEngineer,
        r"\b(data\s*engineer(ing)?|engenheir[oa]\s*de\s*dados|analytics\s*engineer|etl\s*developer|data\s*architect|arquitet[oa]\s*de\s*dados)\b",
    ),
    (
        Category::AiMl,
        r"\b(machine\s*learning|ml\s*engineer|ai\s*engineer|engenheir[oa]\s*de\s*(ia|ml)|mlops|llm|genai|deep\s*learning)\b",
    ),
    (
        Category::DataScientist,
        r"\b(data\s*scien(tist|ce)|cientista\s*de\s*dados)\b",
    ),
    (
        Category::DataAnalyst,
        r"\b(data\s*analyst|analista\s*de\s*dados|business\s*intelligence|bi\s*(analyst|developer)|analytics\s*analyst)\b",
    ),
    (
        Category::Automation,
        r"\b(automation|automacao|rpa|hyperautomation|process\s*automation)\b",
    ),
];

/// Result of normalizing a batch.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub postings: Vec<NormalizedPosting>,
    /// One message per record that could not be normalized
    pub malformed: Vec<String>,
    pub degraded: usize,
    pub enriched: usize,
}

/// Enrichment settings for one batch.
#[derive(Clone)]
pub struct EnrichmentPolicy {
    pub enricher: Arc<dyn Enricher>,
    pub timeout: Duration,
    pub max_concurrent: usize,
}

/// Fields pulled from a payload before any detection.
#[derive(Debug, Default)]
struct PayloadFields {
    title: String,
    company: String,
    description: String,
    url: String,
    location_text: String,
    /// Explicit workplace signal from structured fields
    workplace: String,
    tags: Vec<String>,
}

/// Compiled detection tables.
#[derive(Debug, Clone)]
pub struct Normalizer {
    remote: Vec<Regex>,
    brazil: Vec<Regex>,
    foreign: Vec<Regex>,
    seniority: Vec<(Seniority, Regex)>,
    categories: Vec<(Category, Regex)>,
    stack: StackDetector,
}

impl Normalizer {
    /// Compile detection tables from the ruleset.
    pub fn new(rules: &RuleSet) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns.iter().map(|p| compile_folded(p)).collect()
        };

        let mut remote = compile(&rules.remote.negative_patterns)?;
        remote.extend(compile(&rules.remote.positive_patterns)?);

        let seniority = SENIORITY_PATTERNS
            .iter()
            .map(|(s, p)| Ok((*s, compile_folded(p)?)))
            .collect::<Result<Vec<_>>>()?;
        let categories = CATEGORY_PATTERNS
            .iter()
            .map(|(c, p)| Ok((*c, compile_folded(p)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            remote,
            brazil: compile(&rules.location.brazil_patterns)?,
            foreign: compile(&rules.location.foreign_patterns)?,
            seniority,
            categories,
            stack: StackDetector::new(rules.stack.keys().cloned()),
        })
    }

    /// Deterministic normalization of one record.
    ///
    /// Fails with `MalformedRecord` when the payload is not an object or has
    /// no URL.
    pub fn normalize(&self, record: &RawRecord) -> Result<NormalizedPosting> {
        let payload = &record.native_payload;
        if !payload.is_object() {
            return Err(AppError::malformed(&record.source_id, "payload is not an object"));
        }

        let fields = match record.source_kind {
            SourceKind::Gupy => gupy_fields(payload),
            SourceKind::Greenhouse => greenhouse_fields(payload, &record.source_id),
            SourceKind::Lever => lever_fields(payload, &record.source_id),
            SourceKind::Generic => generic_fields(payload),
        };

        if fields.url.trim().is_empty() {
            let title = if fields.title.is_empty() { "<untitled>" } else { &fields.title };
            return Err(AppError::malformed(
                &record.source_id,
                format!("missing url for '{title}'"),
            ));
        }

        let description = html_to_text(&fields.description);
        let remote_text = if fields.workplace.is_empty() {
            self.remote_phrase(&description).unwrap_or_default()
        } else {
            fields.workplace.clone()
        };
        let country = self.detect_country(&fields.location_text);

        let mut stack = self
            .stack
            .detect(&format!("{} {}", fields.title, description));
        stack.extend(
            fields
                .tags
                .iter()
                .flat_map(|tag| self.stack.detect(tag)),
        );

        Ok(
            NormalizedPosting::new(&record.source_id, fields.url.trim(), record.fetched_at)
                .with_title(normalize_whitespace(&fields.title))
                .with_company(normalize_whitespace(&fields.company))
                .with_description(description)
                .with_location(normalize_whitespace(&fields.location_text), country)
                .with_remote_text(remote_text)
                .with_seniority(self.detect_seniority(&fields.title))
                .with_category(self.detect_category(&fields.title))
                .with_stack(stack),
        )
    }

    /// First sentence of `text` that mentions remote or on-site work.
    pub fn remote_phrase(&self, text: &str) -> Option<String> {
        text.split(['.', '!', '?', ';', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .find(|sentence| {
                let folded = fold(sentence);
                self.remote.iter().any(|r| r.is_match(&folded))
            })
            .map(|sentence| truncate(sentence, REMOTE_TEXT_CHARS))
    }

    /// Brazil wins over foreign mentions; no location is unknown.
    pub fn detect_country(&self, location_text: &str) -> Country {
        let folded = fold(location_text);
        if folded.trim().is_empty() {
            Country::Unknown
        } else if self.brazil.iter().any(|r| r.is_match(&folded)) {
            Country::Br
        } else if self.foreign.iter().any(|r| r.is_match(&folded)) {
            Country::Other
        } else {
            Country::Unknown
        }
    }

    pub fn detect_seniority(&self, title: &str) -> Seniority {
        let folded = fold(title);
        self.seniority
            .iter()
            .find(|(_, r)| r.is_match(&folded))
            .map(|(s, _)| *s)
            .unwrap_or(Seniority::Unknown)
    }

    pub fn detect_category(&self, title: &str) -> Category {
        let folded = fold(title);
        self.categories
            .iter()
            .find(|(_, r)| r.is_match(&folded))
            .map(|(c, _)| *c)
            .unwrap_or(Category::Other)
    }

    /// Normalize a batch, enriching gaps when a policy is given.
    ///
    /// Malformed records are collected, never dropped silently. Enrichment
    /// failures and timeouts degrade the posting but keep it.
    pub async fn normalize_all(
        &self,
        records: &[RawRecord],
        policy: Option<&EnrichmentPolicy>,
    ) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();
        let mut postings = Vec::with_capacity(records.len());

        for record in records {
            match self.normalize(record) {
                Ok(posting) => postings.push(posting),
                Err(e) => {
                    log::warn!("{}", e);
                    outcome.malformed.push(e.to_string());
                }
            }
        }

        let Some(policy) = policy else {
            outcome.postings = postings;
            return outcome;
        };

        let concurrency = policy.max_concurrent.max(1);
        let mut enriched: Vec<(usize, NormalizedPosting)> = stream::iter(postings.into_iter().enumerate())
            .map(|(index, posting)| async move { (index, self.enrich(posting, policy).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        enriched.sort_by_key(|(index, _)| *index);

        for (_, posting) in enriched {
            match posting.enrichment {
                EnrichmentStatus::Degraded => outcome.degraded += 1,
                EnrichmentStatus::Enriched => outcome.enriched += 1,
                EnrichmentStatus::Deterministic => {}
            }
            outcome.postings.push(posting);
        }
        outcome
    }

    async fn enrich(&self, mut posting: NormalizedPosting, policy: &EnrichmentPolicy) -> NormalizedPosting {
        if !has_gaps(&posting) {
            return posting;
        }

        let raw_text = format!("{}\n\n{}", posting.title, posting.description);
        let result = tokio::time::timeout(policy.timeout, policy.enricher.extract(&raw_text)).await;

        match result {
            Ok(Ok(partial)) => {
                if self.fill_gaps(&mut posting, partial) {
                    posting.enrichment = EnrichmentStatus::Enriched;
                }
            }
            Ok(Err(e)) => {
                log::warn!("Enrichment failed for {}: {}", posting.url, e);
                posting.enrichment = EnrichmentStatus::Degraded;
            }
            Err(_) => {
                log::warn!(
                    "Enrichment timed out after {:?} for {}",
                    policy.timeout,
                    posting.url
                );
                posting.enrichment = EnrichmentStatus::Degraded;
            }
        }
        posting
    }

    /// Apply enricher output to empty fields only. Returns whether anything
    /// changed.
    fn fill_gaps(&self, posting: &mut NormalizedPosting, partial: PartialPosting) -> bool {
        let mut changed = false;
        let non_empty = |value: Option<String>| value.map(|v| normalize_whitespace(&v)).filter(|v| !v.is_empty());

        if posting.title.is_empty()
            && let Some(title) = non_empty(partial.title)
        {
            if posting.seniority == Seniority::Unknown {
                posting.seniority = self.detect_seniority(&title);
            }
            if posting.category == Category::Other {
                posting.category = self.detect_category(&title);
            }
            posting.title = title;
            changed = true;
        }
        if posting.company.is_empty()
            && let Some(company) = non_empty(partial.company)
        {
            posting.company = company;
            changed = true;
        }
        if posting.remote_text.is_empty()
            && let Some(remote_text) = non_empty(partial.remote_text)
        {
            posting.remote_text = truncate(&remote_text, REMOTE_TEXT_CHARS);
            changed = true;
        }
        if posting.seniority == Seniority::Unknown
            && let Some(seniority) = partial.seniority.as_deref().and_then(Seniority::parse)
            && seniority != Seniority::Unknown
        {
            posting.seniority = seniority;
            changed = true;
        }
        if posting.category == Category::Other
            && let Some(category) = partial.category.as_deref().and_then(Category::parse)
            && category != Category::Other
        {
            posting.category = category;
            changed = true;
        }
        changed
    }
}

/// Whether any field the enricher may fill is still empty.
fn has_gaps(posting: &NormalizedPosting) -> bool {
    posting.title.is_empty()
        || posting.company.is_empty()
        || posting.remote_text.is_empty()
        || posting.seniority == Seniority::Unknown
        || posting.category == Category::Other
}

// ---------------------------------------------------------------------------
// Payload mappers
// ---------------------------------------------------------------------------

fn str_at<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn first_str(payload: &Value, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| str_at(payload, k).trim())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Company slug from a source id such as `greenhouse:nubank`.
fn company_from_id(source_id: &str) -> String {
    source_id
        .split_once(':')
        .map(|(_, slug)| slug.to_string())
        .unwrap_or_default()
}

fn workplace_label(value: &str) -> String {
    match value.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
        "" | "unspecified" => String::new(),
        "remote" => REMOTE_WORKPLACE.to_string(),
        "hybrid" => "hybrid".to_string(),
        "on site" | "onsite" => "on-site".to_string(),
        other => other.to_string(),
    }
}

fn gupy_fields(payload: &Value) -> PayloadFields {
    let mut url = first_str(payload, &["jobUrl", "url"]);
    if url.is_empty() {
        let id = match payload.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            _ => String::new(),
        };
        if !id.is_empty() {
            let career_page = str_at(payload, "careerPageUrl").trim().trim_end_matches('/');
            url = if career_page.is_empty() {
                format!("https://portal.gupy.io/job/{id}")
            } else {
                format!("{career_page}/job/{id}")
            };
        }
    }

    let mut workplace = workplace_label(str_at(payload, "workplaceType"));
    let remote_flag = match payload.get("isRemoteWork") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if workplace.is_empty() && remote_flag {
        workplace = REMOTE_WORKPLACE.to_string();
    }

    PayloadFields {
        title: first_str(payload, &["name", "title"]),
        company: first_str(payload, &["careerPageName", "companyName", "company"]),
        description: first_str(payload, &["description"]),
        url,
        location_text: join_non_empty(&[
            str_at(payload, "city"),
            str_at(payload, "state"),
            str_at(payload, "country"),
        ]),
        workplace,
        tags: Vec::new(),
    }
}

fn greenhouse_fields(payload: &Value, source_id: &str) -> PayloadFields {
    let mut company = first_str(payload, &["company_name"]);
    if company.is_empty() {
        company = company_from_id(source_id);
    }
    PayloadFields {
        title: first_str(payload, &["title"]),
        company,
        description: first_str(payload, &["content"]),
        url: first_str(payload, &["absolute_url"]),
        location_text: payload
            .pointer("/location/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        workplace: String::new(),
        tags: Vec::new(),
    }
}

fn lever_fields(payload: &Value, source_id: &str) -> PayloadFields {
    let categories = payload.get("categories").cloned().unwrap_or(Value::Null);
    let mut location_text = str_at(&categories, "location").to_string();
    if location_text.is_empty() {
        location_text = payload
            .pointer("/categories/allLocations")
            .and_then(Value::as_array)
            .map(|all| {
                all.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
    }

    let tags = payload
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PayloadFields {
        title: first_str(payload, &["text"]),
        company: company_from_id(source_id),
        description: first_str(payload, &["descriptionPlain", "description"]),
        url: first_str(payload, &["hostedUrl", "applyUrl"]),
        location_text,
        workplace: workplace_label(str_at(payload, "workplaceType")),
        tags,
    }
}

fn generic_fields(payload: &Value) -> PayloadFields {
    let tags = payload
        .get("tech_stack")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PayloadFields {
        title: first_str(payload, &["title"]),
        company: first_str(payload, &["company"]),
        description: first_str(payload, &["description"]),
        url: first_str(payload, &["url"]),
        location_text: first_str(payload, &["location_text", "location"]),
        workplace: first_str(payload, &["remote_text"]),
        tags,
    }
}
