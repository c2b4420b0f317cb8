//! Operational configuration loaded from `config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::SourceKind;
use crate::error::{AppError, Result};

/// Upper bound for any hour-based setting (one year).
pub const MAX_HOURS: u64 = 24 * 366;

/// Root application configuration.
///
/// Scoring rules live in `ruleset.toml`; this file only covers how a run
/// talks to the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings shared by all collaborators
    #[serde(default)]
    pub http: HttpConfig,

    /// Job board sources queried each run
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceConfig>,

    /// Optional LLM field extraction
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Delivery channel and batching
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Cross-run dedup behavior
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Run cadence and per-stage time limits
    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }
        for source in &self.sources {
            source.validate()?;
        }
        let mut ids: Vec<String> = self.sources.iter().map(SourceConfig::id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(AppError::validation(format!(
                "Duplicate source id '{}'",
                pair[0]
            )));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(AppError::validation("enrichment.timeout_secs must be > 0"));
        }
        if self.enrichment.max_concurrent == 0 {
            return Err(AppError::validation("enrichment.max_concurrent must be > 0"));
        }
        if self.notifier.max_postings_per_run == 0 {
            return Err(AppError::validation(
                "notifier.max_postings_per_run must be > 0",
            ));
        }
        if self.notifier.max_attempts == 0 {
            return Err(AppError::validation("notifier.max_attempts must be > 0"));
        }
        if let Some(hours) = self.dedup.renotify_after_hours
            && !(1..=MAX_HOURS).contains(&hours)
        {
            return Err(AppError::validation(format!(
                "dedup.renotify_after_hours must be between 1 and {MAX_HOURS} when set"
            )));
        }
        if !(1..=MAX_HOURS).contains(&self.schedule.frequency_hours) {
            return Err(AppError::validation(format!(
                "schedule.frequency_hours must be between 1 and {MAX_HOURS}"
            )));
        }
        if self.schedule.source_timeout_secs == 0 {
            return Err(AppError::validation(
                "schedule.source_timeout_secs must be > 0",
            ));
        }
        Ok(())
    }

    /// Enabled sources only.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            sources: defaults::sources(),
            enrichment: EnrichmentConfig::default(),
            notifier: NotifierConfig::default(),
            dedup: DedupConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// One configured job board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Gupy public portal search
    Gupy {
        #[serde(default = "defaults::enabled")]
        enabled: bool,
        #[serde(default = "defaults::max_results")]
        max_results: usize,
    },
    /// A Greenhouse job board
    Greenhouse {
        board: String,
        #[serde(default = "defaults::enabled")]
        enabled: bool,
        #[serde(default = "defaults::max_results")]
        max_results: usize,
    },
    /// A Lever postings site
    Lever {
        company: String,
        #[serde(default = "defaults::enabled")]
        enabled: bool,
        #[serde(default = "defaults::max_results")]
        max_results: usize,
    },
    /// A local JSON array of payloads
    File {
        path: PathBuf,
        /// Shape of each payload in the file
        #[serde(default = "defaults::file_format")]
        format: SourceKind,
        #[serde(default = "defaults::enabled")]
        enabled: bool,
    },
}

impl SourceConfig {
    /// Stable identifier used in records, reports and logs.
    pub fn id(&self) -> String {
        match self {
            Self::Gupy { .. } => "gupy".to_string(),
            Self::Greenhouse { board, .. } => format!("greenhouse:{board}"),
            Self::Lever { company, .. } => format!("lever:{company}"),
            Self::File { path, .. } => format!("file:{}", path.display()),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Gupy { enabled, .. }
            | Self::Greenhouse { enabled, .. }
            | Self::Lever { enabled, .. }
            | Self::File { enabled, .. } => *enabled,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Greenhouse { board, .. } if board.trim().is_empty() => {
                Err(AppError::validation("greenhouse source has an empty board"))
            }
            Self::Lever { company, .. } if company.trim().is_empty() => {
                Err(AppError::validation("lever source has an empty company"))
            }
            Self::Gupy { max_results: 0, .. }
            | Self::Greenhouse { max_results: 0, .. }
            | Self::Lever { max_results: 0, .. } => Err(AppError::validation(format!(
                "source '{}' max_results must be > 0",
                self.id()
            ))),
            _ => Ok(()),
        }
    }
}

/// LLM enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "defaults::enrichment_endpoint")]
    pub endpoint: String,

    #[serde(default = "defaults::enrichment_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "defaults::enrichment_api_key_env")]
    pub api_key_env: String,

    /// Upper bound for a single extraction call
    #[serde(default = "defaults::enrichment_timeout")]
    pub timeout_secs: u64,

    /// Characters of posting text sent per call
    #[serde(default = "defaults::enrichment_max_chars")]
    pub max_chars: usize,

    /// Concurrent extraction calls
    #[serde(default = "defaults::enrichment_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::enrichment_endpoint(),
            model: defaults::enrichment_model(),
            api_key_env: defaults::enrichment_api_key_env(),
            timeout_secs: defaults::enrichment_timeout(),
            max_chars: defaults::enrichment_max_chars(),
            max_concurrent: defaults::enrichment_max_concurrent(),
        }
    }
}

/// Delivery channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Write messages to the log
    #[default]
    Log,
    Telegram,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub channel: Channel,

    /// Upper bound of postings delivered per run
    #[serde(default = "defaults::max_postings_per_run")]
    pub max_postings_per_run: usize,

    /// Attempts per message, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Initial retry delay, doubled per attempt
    #[serde(default = "defaults::backoff_ms")]
    pub backoff_ms: u64,

    /// Characters of description included in detail messages
    #[serde(default = "defaults::description_chars")]
    pub description_chars: usize,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel: Channel::default(),
            max_postings_per_run: defaults::max_postings_per_run(),
            max_attempts: defaults::max_attempts(),
            backoff_ms: defaults::backoff_ms(),
            description_chars: defaults::description_chars(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// Telegram Bot API settings. Secrets come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    #[serde(default = "defaults::telegram_token_env")]
    pub bot_token_env: String,

    #[serde(default = "defaults::telegram_chat_env")]
    pub chat_id_env: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::telegram_api_base(),
            bot_token_env: defaults::telegram_token_env(),
            chat_id_env: defaults::telegram_chat_env(),
        }
    }
}

/// Dedup settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Re-notification cooldown; absent means never re-notify
    #[serde(default)]
    pub renotify_after_hours: Option<u64>,
}

impl DedupConfig {
    pub fn cooldown(&self) -> Option<chrono::Duration> {
        self.renotify_after_hours
            .map(|h| chrono::Duration::hours(h.min(MAX_HOURS) as i64))
    }
}

/// Run cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Expected hours between runs; a lock older than twice this is stale
    #[serde(default = "defaults::frequency_hours")]
    pub frequency_hours: u64,

    /// Per-source fetch budget
    #[serde(default = "defaults::source_timeout")]
    pub source_timeout_secs: u64,
}

impl ScheduleConfig {
    /// Age after which a held run lock is reported as stale.
    pub fn stale_lock_after(&self) -> chrono::Duration {
        chrono::Duration::hours(2 * self.frequency_hours.min(MAX_HOURS) as i64)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            frequency_hours: defaults::frequency_hours(),
            source_timeout_secs: defaults::source_timeout(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use super::{SourceConfig, SourceKind};

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; jobwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Source defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn max_results() -> usize {
        50
    }
    pub fn file_format() -> SourceKind {
        SourceKind::Generic
    }
    pub fn sources() -> Vec<SourceConfig> {
        vec![SourceConfig::Gupy {
            enabled: true,
            max_results: max_results(),
        }]
    }

    // Enrichment defaults
    pub fn enrichment_endpoint() -> String {
        "https://api.openai.com/v1".into()
    }
    pub fn enrichment_model() -> String {
        "gpt-4o-mini".into()
    }
    pub fn enrichment_api_key_env() -> String {
        "OPENAI_API_KEY".into()
    }
    pub fn enrichment_timeout() -> u64 {
        20
    }
    pub fn enrichment_max_chars() -> usize {
        6000
    }
    pub fn enrichment_max_concurrent() -> usize {
        4
    }

    // Notifier defaults
    pub fn max_postings_per_run() -> usize {
        20
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_ms() -> u64 {
        500
    }
    pub fn description_chars() -> usize {
        400
    }
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn telegram_token_env() -> String {
        "TELEGRAM_BOT_TOKEN".into()
    }
    pub fn telegram_chat_env() -> String {
        "TELEGRAM_CHAT_ID".into()
    }

    // Schedule defaults
    pub fn frequency_hours() -> u64 {
        3
    }
    pub fn source_timeout() -> u64 {
        60
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.notifier.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_sources() {
        let mut config = Config::default();
        config.sources = vec![
            SourceConfig::Lever {
                company: "acme".into(),
                enabled: true,
                max_results: 10,
            },
            SourceConfig::Lever {
                company: "acme".into(),
                enabled: false,
                max_results: 10,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_sources_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [[sources]]
            kind = "gupy"
            max_results = 30

            [[sources]]
            kind = "greenhouse"
            board = "nubank"

            [[sources]]
            kind = "file"
            path = "fixtures/jobs.json"
            enabled = false

            [dedup]
            renotify_after_hours = 72

            [notifier]
            channel = "telegram"
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].id(), "greenhouse:nubank");
        assert_eq!(config.enabled_sources().count(), 2);
        assert_eq!(config.notifier.channel, Channel::Telegram);
        assert_eq!(config.dedup.cooldown(), Some(chrono::Duration::hours(72)));
        assert_eq!(config.schedule.frequency_hours, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_huge_hour_settings() {
        let mut config = Config::default();
        config.schedule.frequency_hours = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.schedule.stale_lock_after(),
            chrono::Duration::hours(2 * MAX_HOURS as i64)
        );

        let mut config = Config::default();
        config.dedup.renotify_after_hours = Some(u64::MAX);
        assert!(config.validate().is_err());
        assert_eq!(
            config.dedup.cooldown(),
            Some(chrono::Duration::hours(MAX_HOURS as i64))
        );
    }

    #[test]
    fn default_cooldown_is_never() {
        assert_eq!(Config::default().dedup.cooldown(), None);
    }
}
