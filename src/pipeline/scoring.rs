//! Relevance and eligibility scoring.
//!
//! A [`RuleSet`] is compiled once into a [`ScoringEngine`]; evaluation is
//! then pure: same posting, same rules and same clock give the same
//! [`ScoreResult`].
//!
//! Evaluation order, stopping at the first hard reject:
//!
//! 1. malformed input (missing url or title)
//! 2. remote veto over description and remote text
//! 3. location gate for postings placed outside Brazil
//! 4. remote positive signal, from a pattern or the board's workplace
//!    flag (strict mode rejects when absent)
//! 5. title, stack and seniority points
//! 6. threshold

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use regex::Regex;

use super::stack::{Phrase, StackDetector, tokenize};
use crate::error::Result;
use crate::models::{
    Category, Country, NormalizedPosting, REMOTE_WORKPLACE, RejectReason, RemoteStatus, RoleRule,
    RuleSet, ScoreBreakdown, ScoreResult, Seniority, compile_folded,
};
use crate::utils::text::fold;
use crate::utils::url::fingerprint;

/// A compiled pattern that remembers how it was written.
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn compile_all(sources: &[String]) -> Result<Vec<Self>> {
        sources
            .iter()
            .map(|source| {
                Ok(Self {
                    source: source.clone(),
                    regex: compile_folded(source)?,
                })
            })
            .collect()
    }

    fn first_match<'a>(patterns: &'a [Self], folded: &str) -> Option<&'a Self> {
        patterns.iter().find(|p| p.regex.is_match(folded))
    }
}

#[derive(Debug, Clone)]
struct Role {
    phrase: Phrase,
    category: Category,
    points: u32,
    category_points: u32,
}

impl From<&RoleRule> for Role {
    fn from(rule: &RoleRule) -> Self {
        Self {
            phrase: Phrase::new(rule.phrase.as_str()),
            category: rule.category,
            points: rule.points,
            category_points: rule.category_points,
        }
    }
}

/// Compiled, immutable form of a ruleset.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    version: String,
    threshold: u32,
    strict_remote: bool,
    remote_bonus: u32,
    title_cap: u32,
    stack_cap: u32,
    positive: Vec<Pattern>,
    negative: Vec<Pattern>,
    brazil: Vec<Pattern>,
    anywhere: Vec<Pattern>,
    roles: Vec<Role>,
    stack: StackDetector,
    /// Folded token -> points
    weights: HashMap<String, u32>,
    seniority: HashMap<Seniority, i32>,
}

impl ScoringEngine {
    /// Compile every pattern and table in the ruleset.
    pub fn new(rules: &RuleSet) -> Result<Self> {
        let weights: HashMap<String, u32> = rules
            .stack
            .iter()
            .map(|(term, points)| (fold(term), *points))
            .collect();

        let seniority = Seniority::ALL
            .into_iter()
            .map(|s| (s, rules.seniority_adjustment(s)))
            .collect();

        Ok(Self {
            version: rules.ruleset_version(),
            threshold: rules.min_score_threshold,
            strict_remote: rules.strict_remote,
            remote_bonus: rules.remote_bonus,
            title_cap: rules.title_cap,
            stack_cap: rules.stack_cap,
            positive: Pattern::compile_all(&rules.remote.positive_patterns)?,
            negative: Pattern::compile_all(&rules.remote.negative_patterns)?,
            brazil: Pattern::compile_all(&rules.location.brazil_patterns)?,
            anywhere: Pattern::compile_all(&rules.location.anywhere_patterns)?,
            roles: rules.roles.iter().map(Role::from).collect(),
            stack: StackDetector::new(rules.stack.keys().cloned()),
            weights,
            seniority,
        })
    }

    /// `ruleset_version` stamped on every result.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Score one posting.
    pub fn evaluate(&self, posting: &NormalizedPosting, evaluated_at: DateTime<Utc>) -> ScoreResult {
        let fp = fingerprint(&posting.url);
        let mut verdict = Verdict::new(fp.clone().unwrap_or_default());

        if fp.is_none() {
            return self.finish(verdict.reject(RejectReason::Malformed("url".into())), evaluated_at);
        }
        if posting.title.trim().is_empty() {
            return self.finish(
                verdict.reject(RejectReason::Malformed("title".into())),
                evaluated_at,
            );
        }

        // Remote veto
        let remote_blob = fold(&format!("{} {}", posting.description, posting.remote_text));
        if let Some(pattern) = Pattern::first_match(&self.negative, &remote_blob) {
            verdict.remote = RemoteStatus::Negative;
            return self.finish(
                verdict.reject(RejectReason::RemoteVeto(pattern.source.clone())),
                evaluated_at,
            );
        }

        // Location gate
        if posting.location_country == Country::Other {
            let free_text = fold(&format!(
                "{} {} {}",
                posting.description, posting.location_text, posting.remote_text
            ));
            let placed_ok = Pattern::first_match(&self.brazil, &free_text)
                .or_else(|| Pattern::first_match(&self.anywhere, &free_text));
            match placed_ok {
                Some(pattern) => verdict.signals.push(format!("location:{}", pattern.source)),
                None => {
                    return self.finish(
                        verdict.reject(RejectReason::ForeignLocation(posting.location_text.clone())),
                        evaluated_at,
                    );
                }
            }
        }

        // Remote positive signal
        match Pattern::first_match(&self.positive, &remote_blob) {
            Some(pattern) => {
                verdict.remote = RemoteStatus::Explicit;
                verdict.breakdown.remote = self.remote_bonus;
                verdict.signals.push(format!("remote:{}", pattern.source));
            }
            None if posting.workplace_is_remote() => {
                verdict.remote = RemoteStatus::Explicit;
                verdict.breakdown.remote = self.remote_bonus;
                verdict.signals.push(format!("remote:workplace={REMOTE_WORKPLACE}"));
            }
            None if self.strict_remote => {
                return self.finish(verdict.reject(RejectReason::RemoteUnconfirmed), evaluated_at);
            }
            None => {}
        }

        // Relevance
        let title_tokens = tokenize(&posting.title);
        verdict.breakdown.title = self.title_points(posting, &title_tokens, &mut verdict.signals);
        verdict.breakdown.stack = self.stack_points(posting, &mut verdict.signals);
        verdict.breakdown.seniority = self.seniority.get(&posting.seniority).copied().unwrap_or(0);
        if verdict.breakdown.seniority != 0 {
            verdict.signals.push(format!("seniority:{}", posting.seniority));
        }

        let base = verdict
            .breakdown
            .remote
            .saturating_add(verdict.breakdown.title)
            .saturating_add(verdict.breakdown.stack)
            .min(100);
        let total = (base as i32 + verdict.breakdown.seniority).clamp(0, 100);
        verdict.score = total as u32;

        // Threshold
        if verdict.score < self.threshold {
            verdict.reasons.push(RejectReason::BelowThreshold {
                score: verdict.score,
                threshold: self.threshold,
            });
        } else {
            verdict.eligible = true;
        }

        self.finish(verdict, evaluated_at)
    }

    /// Best single role match, capped.
    fn title_points(
        &self,
        posting: &NormalizedPosting,
        title_tokens: &[String],
        signals: &mut Vec<String>,
    ) -> u32 {
        let mut best: Option<(u32, String)> = None;
        for role in &self.roles {
            let candidate = if role.phrase.occurs_in(title_tokens) {
                Some((role.points, format!("role:{}", role.phrase.label)))
            } else if role.category != Category::Other && role.category == posting.category {
                Some((role.category_points, format!("category:{}", role.category)))
            } else {
                None
            };
            if let Some((points, signal)) = candidate {
                if best.as_ref().is_none_or(|(b, _)| points > *b) {
                    best = Some((points, signal));
                }
            }
        }

        match best {
            Some((points, signal)) => {
                signals.push(signal);
                points.min(self.title_cap)
            }
            None => 0,
        }
    }

    /// Weighted union of declared and detected stack tokens, capped.
    fn stack_points(&self, posting: &NormalizedPosting, signals: &mut Vec<String>) -> u32 {
        let mut tokens: BTreeSet<String> = posting.tech_stack.iter().map(|t| fold(t)).collect();
        tokens.extend(
            self.stack
                .detect(&format!("{} {}", posting.title, posting.description)),
        );

        let mut total: u32 = 0;
        for token in &tokens {
            if let Some(points) = self.weights.get(token) {
                total = total.saturating_add(*points);
                signals.push(format!("stack:{token}"));
            }
        }
        total.min(self.stack_cap)
    }

    fn finish(&self, verdict: Verdict, evaluated_at: DateTime<Utc>) -> ScoreResult {
        ScoreResult {
            fingerprint: verdict.fingerprint,
            score: verdict.score,
            eligible: verdict.eligible,
            vetoed: verdict.vetoed,
            remote: verdict.remote,
            reasons: verdict.reasons,
            signals: verdict.signals,
            breakdown: verdict.breakdown,
            evaluated_at,
            ruleset_version: self.version.clone(),
        }
    }
}

/// Evaluate a posting against a ruleset in one call.
///
/// Compiles the ruleset each time; batch callers should hold a
/// [`ScoringEngine`] instead.
pub fn evaluate(
    posting: &NormalizedPosting,
    rules: &RuleSet,
    evaluated_at: DateTime<Utc>,
) -> Result<ScoreResult> {
    Ok(ScoringEngine::new(rules)?.evaluate(posting, evaluated_at))
}

/// Mutable evaluation state.
struct Verdict {
    fingerprint: String,
    score: u32,
    eligible: bool,
    vetoed: bool,
    remote: RemoteStatus,
    reasons: Vec<RejectReason>,
    signals: Vec<String>,
    breakdown: ScoreBreakdown,
}

impl Verdict {
    fn new(fingerprint: String) -> Self {
        Self {
            fingerprint,
            score: 0,
            eligible: false,
            vetoed: false,
            remote: RemoteStatus::Unknown,
            reasons: Vec::new(),
            signals: Vec::new(),
            breakdown: ScoreBreakdown::default(),
        }
    }

    /// Hard reject: score 0, no partial points.
    fn reject(mut self, reason: RejectReason) -> Self {
        self.score = 0;
        self.eligible = false;
        self.vetoed = true;
        self.breakdown = ScoreBreakdown::default();
        self.reasons.push(reason);
        self
    }
}
