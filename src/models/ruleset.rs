// src/models/ruleset.rs

//! Versioned scoring rules loaded from `ruleset.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Category, Seniority};
use crate::error::{AppError, Result};
use crate::utils::text::fold_pattern;

/// Patterns, weights and thresholds for the scoring engine.
///
/// Everything that decides eligibility lives here so a rule change bumps
/// [`RuleSet::ruleset_version`] and shows up in every `ScoreResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Human-assigned version label
    #[serde(default = "defaults::version")]
    pub version: String,

    /// Minimum score for eligibility (0-100)
    #[serde(default = "defaults::min_score_threshold")]
    pub min_score_threshold: u32,

    /// Reject postings without an explicit remote signal
    #[serde(default)]
    pub strict_remote: bool,

    /// Points for an explicit remote signal
    #[serde(default = "defaults::remote_bonus")]
    pub remote_bonus: u32,

    /// Cap for the title/category component
    #[serde(default = "defaults::title_cap")]
    pub title_cap: u32,

    /// Cap for the tech stack component
    #[serde(default = "defaults::stack_cap")]
    pub stack_cap: u32,

    #[serde(default)]
    pub remote: RemoteRules,

    #[serde(default)]
    pub location: LocationRules,

    #[serde(default = "defaults::roles")]
    pub roles: Vec<RoleRule>,

    /// Tech token -> points
    #[serde(default = "defaults::stack")]
    pub stack: BTreeMap<String, u32>,

    /// Seniority key (e.g. "SENIOR") -> additive adjustment
    #[serde(default = "defaults::seniority")]
    pub seniority: BTreeMap<String, i32>,

    /// Category key -> search terms sent to sources
    #[serde(default = "defaults::search_terms")]
    pub search_terms: BTreeMap<String, Vec<String>>,
}

impl RuleSet {
    /// Load rules from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load rules or return defaults if the file is missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Ruleset load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate ranges, tables and that every pattern compiles.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(AppError::validation("ruleset.version is empty"));
        }
        if self.min_score_threshold > 100 {
            return Err(AppError::validation(
                "ruleset.min_score_threshold must be <= 100",
            ));
        }
        if self.title_cap > 100 || self.stack_cap > 100 {
            return Err(AppError::validation("ruleset caps must be <= 100"));
        }
        if self.remote_bonus > 100 {
            return Err(AppError::validation("ruleset.remote_bonus must be <= 100"));
        }
        if let Some(role) = self
            .roles
            .iter()
            .find(|r| r.points > 100 || r.category_points > 100)
        {
            return Err(AppError::validation(format!(
                "Role '{}' points must be <= 100",
                role.phrase
            )));
        }
        if let Some((term, points)) = self.stack.iter().find(|(_, p)| **p > 100) {
            return Err(AppError::validation(format!(
                "Stack weight for '{term}' is {points}, must be <= 100"
            )));
        }
        if let Some((key, delta)) = self.seniority.iter().find(|(_, d)| !(-100..=100).contains(*d)) {
            return Err(AppError::validation(format!(
                "Seniority adjustment for '{key}' is {delta}, must be within -100..=100"
            )));
        }
        if self.remote.negative_patterns.is_empty() {
            return Err(AppError::validation("No negative remote patterns defined"));
        }
        if self.roles.is_empty() {
            return Err(AppError::validation("No target roles defined"));
        }
        if let Some(role) = self.roles.iter().find(|r| r.phrase.trim().is_empty()) {
            return Err(AppError::validation(format!(
                "Role for category {} has an empty phrase",
                role.category
            )));
        }
        for key in self.seniority.keys() {
            if Seniority::parse(key).is_none() {
                return Err(AppError::validation(format!(
                    "Unknown seniority key '{key}'"
                )));
            }
        }
        for key in self.search_terms.keys() {
            if Category::parse(key).is_none() {
                return Err(AppError::validation(format!(
                    "Unknown search term category '{key}'"
                )));
            }
        }

        for pattern in self.all_patterns() {
            compile_folded(pattern)?;
        }
        Ok(())
    }

    /// `version` plus the first 8 hex chars of the content hash.
    ///
    /// Two rulesets with the same label but different content get
    /// different versions.
    pub fn ruleset_version(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = hex::encode(Sha256::digest(&bytes));
        format!("{}+{}", self.version, &digest[..8])
    }

    /// Adjustment for a seniority level (0 when absent).
    pub fn seniority_adjustment(&self, seniority: Seniority) -> i32 {
        self.seniority
            .iter()
            .find(|(key, _)| Seniority::parse(key) == Some(seniority))
            .map(|(_, delta)| *delta)
            .unwrap_or(0)
    }

    /// All search terms, deduplicated, in category order.
    pub fn all_search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for term in self.search_terms.values().flatten() {
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
                terms.push(term.clone());
            }
        }
        terms
    }

    fn all_patterns(&self) -> impl Iterator<Item = &String> {
        self.remote
            .positive_patterns
            .iter()
            .chain(&self.remote.negative_patterns)
            .chain(&self.location.brazil_patterns)
            .chain(&self.location.anywhere_patterns)
            .chain(&self.location.foreign_patterns)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            version: defaults::version(),
            min_score_threshold: defaults::min_score_threshold(),
            strict_remote: false,
            remote_bonus: defaults::remote_bonus(),
            title_cap: defaults::title_cap(),
            stack_cap: defaults::stack_cap(),
            remote: RemoteRules::default(),
            location: LocationRules::default(),
            roles: defaults::roles(),
            stack: defaults::stack(),
            seniority: defaults::seniority(),
            search_terms: defaults::search_terms(),
        }
    }
}

/// Fold a pattern and compile it.
pub fn compile_folded(pattern: &str) -> Result<Regex> {
    Regex::new(&fold_pattern(pattern)).map_err(|e| AppError::pattern(pattern, e))
}

/// Remote work signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRules {
    /// Explicit remote phrases
    #[serde(default = "defaults::remote_positive")]
    pub positive_patterns: Vec<String>,

    /// Hybrid/on-site phrases; any match is an absolute veto
    #[serde(default = "defaults::remote_negative")]
    pub negative_patterns: Vec<String>,
}

impl Default for RemoteRules {
    fn default() -> Self {
        Self {
            positive_patterns: defaults::remote_positive(),
            negative_patterns: defaults::remote_negative(),
        }
    }
}

/// Location signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRules {
    /// Mentions that place a posting in Brazil
    #[serde(default = "defaults::brazil_patterns")]
    pub brazil_patterns: Vec<String>,

    /// Mentions of location-free remote work
    #[serde(default = "defaults::anywhere_patterns")]
    pub anywhere_patterns: Vec<String>,

    /// Mentions that place a posting outside Brazil
    #[serde(default = "defaults::foreign_patterns")]
    pub foreign_patterns: Vec<String>,
}

impl Default for LocationRules {
    fn default() -> Self {
        Self {
            brazil_patterns: defaults::brazil_patterns(),
            anywhere_patterns: defaults::anywhere_patterns(),
            foreign_patterns: defaults::foreign_patterns(),
        }
    }
}

/// A target role phrase and what it is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Phrase matched against the folded title
    pub phrase: String,

    pub category: Category,

    /// Points when the phrase occurs in the title
    #[serde(default = "defaults::role_points")]
    pub points: u32,

    /// Points when only the posting's category matches
    #[serde(default = "defaults::role_category_points")]
    pub category_points: u32,
}

impl RoleRule {
    pub fn new(phrase: &str, category: Category) -> Self {
        Self {
            phrase: phrase.to_string(),
            category,
            points: defaults::role_points(),
            category_points: defaults::role_category_points(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    use super::RoleRule;
    use crate::models::Category;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    pub fn version() -> String {
        "2026.10".into()
    }
    pub fn min_score_threshold() -> u32 {
        50
    }
    pub fn remote_bonus() -> u32 {
        20
    }
    pub fn title_cap() -> u32 {
        40
    }
    pub fn stack_cap() -> u32 {
        50
    }
    pub fn role_points() -> u32 {
        40
    }
    pub fn role_category_points() -> u32 {
        25
    }

    // Remote patterns
    pub fn remote_positive() -> Vec<String> {
        strings(&[
            r"\b100%?\s*remot[oe]\b",
            r"\bfully\s*remote\b",
            r"\bfull[\s-]*remote\b",
            r"\bremote[\s-]*first\b",
            r"\bremote\s*only\b",
            r"\btrabalho\s*remoto\b",
            r"\bremoto\s*integral\b",
            r"\bhome[\s-]*office\b",
            r"\bwork\s*from\s*(home|anywhere)\b",
            r"\bwfh\b",
            r"\banywhere\s*in\s*(brazil|brasil)\b",
            r"\bremoto\b",
        ])
    }
    pub fn remote_negative() -> Vec<String> {
        strings(&[
            r"\bh[íi]brido\b",
            r"\bhybrid\b",
            r"\bpresencial\b",
            r"\bon[\s-]?site\b",
            r"\boffice[\s-]*based\b",
            r"\b\d+\s*(dias?|days?)\s*(no\s*|in\s*the\s*)?(escrit[óo]rio|office)\b",
            r"\b\d+\s*(dias?|days?)\s*(por\s*|per\s*|a\s*)?(semana|week|m[êe]s|month)\b",
            r"\bvisitas?\s*(ao\s*)?(escrit[óo]rio|office)\b",
            r"\bnear\s*(the\s*)?office\b",
            r"\bresidir\s*em\b",
            r"\bmust\s*live\s*in\b",
            r"\bmust\s*be\s*(located|based)\b",
            r"\brequires\s*relocation\b",
            r"\bwork\s*from\s*(the\s*)?office\b",
        ])
    }

    // Location patterns
    pub fn brazil_patterns() -> Vec<String> {
        strings(&[
            r"\bbrasil\b",
            r"\bbrazil\b",
            r"\bbrasileir[oa]s?\b",
            r"\bbrazilian\b",
            r"\b(são|sao)\s*paulo\b",
            r"\brio\s*(de\s*)?janeiro\b",
            r"\bbelo\s*horizonte\b",
            r"\bcuritiba\b",
            r"\bporto\s*alegre\b",
            r"\b(floripa|florian[óo]polis)\b",
            r"\bbras[íi]lia\b",
            r"\brecife\b",
            r"\bsalvador\b",
            r"\bfortaleza\b",
            r"\bcampinas\b",
        ])
    }
    pub fn anywhere_patterns() -> Vec<String> {
        strings(&[
            r"\banywhere\b",
            r"\bwork\s*from\s*anywhere\b",
            r"\bqualquer\s*lugar\b",
            r"\bglobal(ly)?\s*remote\b",
        ])
    }
    pub fn foreign_patterns() -> Vec<String> {
        strings(&[
            r"\busa\b",
            r"\bunited\s*states\b",
            r"\bestados\s*unidos\b",
            r"\beua\b",
            r"\bunited\s*kingdom\b",
            r"\breino\s*unido\b",
            r"\buk\b",
            r"\beurop[ea]\b",
            r"\bportugal\b",
            r"\blisboa\b",
            r"\blisbon\b",
            r"\b(spain|espanha|espana)\b",
            r"\bmadrid\b",
            r"\bbarcelona\b",
            r"\b(germany|alemanha|deutschland)\b",
            r"\b(france|fran[çc]a)\b",
            r"\b(italy|it[áa]lia)\b",
            r"\b(netherlands|holanda)\b",
            r"\b(ireland|irlanda)\b",
            r"\bcanad[áa]\b",
            r"\bm[ée]xico\b",
            r"\bargentina\b",
            r"\bchile\b",
            r"\bcol[ôo]mbia\b",
            r"\b[íi]ndia\b",
            r"\b(singapore|singapura)\b",
            r"\b(tokyo|t[óo]quio)\b",
        ])
    }

    pub fn roles() -> Vec<RoleRule> {
        let table: &[(&str, Category)] = &[
            ("data engineer", Category::DataEngineer),
            ("engenheiro de dados", Category::DataEngineer),
            ("engenheira de dados", Category::DataEngineer),
            ("analytics engineer", Category::DataEngineer),
            ("engenheiro de analytics", Category::DataEngineer),
            ("data architect", Category::DataEngineer),
            ("arquiteto de dados", Category::DataEngineer),
            ("data platform", Category::DataEngineer),
            ("automation engineer", Category::Automation),
            ("engenheiro de automação", Category::Automation),
            ("rpa developer", Category::Automation),
            ("desenvolvedor rpa", Category::Automation),
            ("ai engineer", Category::AiMl),
            ("engenheiro de ia", Category::AiMl),
            ("machine learning engineer", Category::AiMl),
            ("engenheiro de machine learning", Category::AiMl),
            ("ml engineer", Category::AiMl),
            ("data analyst", Category::DataAnalyst),
            ("analista de dados", Category::DataAnalyst),
            ("business intelligence", Category::DataAnalyst),
            ("bi analyst", Category::DataAnalyst),
            ("data scientist", Category::DataScientist),
            ("cientista de dados", Category::DataScientist),
        ];
        table
            .iter()
            .map(|(phrase, category)| RoleRule::new(phrase, *category))
            .collect()
    }

    pub fn stack() -> BTreeMap<String, u32> {
        let table: &[(&str, u32)] = &[
            ("python", 10),
            ("sql", 8),
            ("spark", 12),
            ("airflow", 15),
            ("dbt", 10),
            ("kafka", 10),
            ("databricks", 12),
            ("aws", 8),
            ("gcp", 8),
            ("azure", 8),
            ("tensorflow", 12),
            ("pytorch", 12),
            ("scikit-learn", 10),
            ("hugging face", 10),
            ("llm", 10),
            ("machine learning", 10),
            ("rpa", 12),
            ("automation", 8),
            ("orchestration", 8),
            ("docker", 5),
            ("kubernetes", 5),
            ("git", 3),
            ("ci/cd", 8),
        ];
        table.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    pub fn seniority() -> BTreeMap<String, i32> {
        let table: &[(&str, i32)] = &[
            ("INTERN", -20),
            ("JUNIOR", -10),
            ("MID", 0),
            ("SENIOR", 10),
            ("LEAD", 15),
            ("STAFF", 15),
        ];
        table.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    pub fn search_terms() -> BTreeMap<String, Vec<String>> {
        let table: &[(&str, &[&str])] = &[
            ("DATA_ENGINEER", &["Data Engineer", "Engenheiro de Dados"]),
            ("AUTOMATION", &["Automation Engineer", "Engenheiro de Automação"]),
            ("AI_ML", &["AI Engineer", "Machine Learning Engineer"]),
            ("DATA_ANALYST", &["Data Analyst", "Analista de Dados"]),
            ("DATA_SCIENTIST", &["Data Scientist", "Cientista de Dados"]),
        ];
        table
            .iter()
            .map(|(k, terms)| (k.to_string(), strings(terms)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_ruleset_ok() {
        assert!(RuleSet::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut rules = RuleSet::default();
        rules.remote.negative_patterns.push("(unclosed".into());
        let err = rules.validate().unwrap_err();
        assert!(matches!(err, AppError::Pattern { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_weights() {
        let huge_bonus = RuleSet {
            remote_bonus: u32::MAX,
            ..RuleSet::default()
        };
        assert!(huge_bonus.validate().is_err());

        let mut huge_stack = RuleSet::default();
        huge_stack.stack.insert("python".into(), u32::MAX);
        assert!(huge_stack.validate().is_err());

        let mut huge_role = RuleSet::default();
        huge_role.roles[0].points = 1_000;
        assert!(huge_role.validate().is_err());

        let mut huge_penalty = RuleSet::default();
        huge_penalty.seniority.insert("INTERN".into(), i32::MIN);
        assert!(huge_penalty.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_over_100() {
        let rules = RuleSet {
            min_score_threshold: 101,
            ..RuleSet::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_seniority_key() {
        let mut rules = RuleSet::default();
        rules.seniority.insert("PLENO".into(), 5);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn ruleset_version_tracks_content() {
        let base = RuleSet::default();
        let mut changed = base.clone();
        changed.min_score_threshold = 60;

        let v1 = base.ruleset_version();
        assert!(v1.starts_with("2026.10+"));
        assert_eq!(v1.len(), "2026.10+".len() + 8);
        assert_eq!(v1, RuleSet::default().ruleset_version());
        assert_ne!(v1, changed.ruleset_version());
    }

    #[test]
    fn seniority_adjustment_lookup() {
        let rules = RuleSet::default();
        assert_eq!(rules.seniority_adjustment(Seniority::Senior), 10);
        assert_eq!(rules.seniority_adjustment(Seniority::Intern), -20);
        assert_eq!(rules.seniority_adjustment(Seniority::Unknown), 0);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let rules: RuleSet = toml::from_str(
            r#"
            version = "custom"
            min_score_threshold = 70
            strict_remote = true

            [stack]
            rust = 20
            "#,
        )
        .unwrap();
        assert_eq!(rules.min_score_threshold, 70);
        assert!(rules.strict_remote);
        assert_eq!(rules.stack.get("rust"), Some(&20));
        assert!(!rules.stack.contains_key("python"));
        assert!(!rules.remote.negative_patterns.is_empty());
        assert!(!rules.roles.is_empty());
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn all_search_terms_deduplicates() {
        let mut rules = RuleSet::default();
        rules
            .search_terms
            .insert("OTHER".into(), vec!["data engineer".into()]);
        let terms = rules.all_search_terms();
        assert_eq!(
            terms.iter().filter(|t| t.eq_ignore_ascii_case("data engineer")).count(),
            1
        );
    }
}
