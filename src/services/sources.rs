// src/services/sources.rs

//! Job board clients.
//!
//! Each source returns payloads verbatim wrapped in [`RawRecord`]s; mapping
//! to the canonical shape happens in the normalizer.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{AppError, Result};
use crate::models::{Config, RawRecord, SourceConfig, SourceKind};
use crate::utils::http::ensure_success;
use crate::utils::text::fold;

/// A job board that can be searched by term.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Identifier stamped on every record.
    fn id(&self) -> &str;

    /// Fetch up to `max_results` postings for one search term.
    ///
    /// Any failure means zero records from this call.
    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>>;

    /// Fetch for every term, dropping payloads already returned by an
    /// earlier term.
    ///
    /// Fails only when every term failed.
    async fn fetch_terms(&self, queries: &[String], max_results: usize) -> Result<Vec<RawRecord>> {
        let fallback = [String::new()];
        let queries = if queries.is_empty() { &fallback[..] } else { queries };

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;

        for query in queries {
            match self.fetch(query, max_results).await {
                Ok(batch) => {
                    any_ok = true;
                    for record in batch {
                        if seen.insert(record.native_payload.to_string()) {
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("[{}] query '{}' failed: {}", self.id(), query, e);
                    last_error = Some(e);
                }
            }
        }

        match (any_ok, last_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(records),
        }
    }
}

/// A source plus its per-call result cap.
#[derive(Clone)]
pub struct ConfiguredSource {
    pub source: Arc<dyn JobSource>,
    pub max_results: usize,
}

/// Build every enabled source from configuration.
pub fn build_sources(config: &Config, client: &Client) -> Vec<ConfiguredSource> {
    config
        .enabled_sources()
        .map(|source_config| match source_config {
            SourceConfig::Gupy { max_results, .. } => ConfiguredSource {
                source: Arc::new(GupySource::new(client.clone())),
                max_results: *max_results,
            },
            SourceConfig::Greenhouse {
                board, max_results, ..
            } => ConfiguredSource {
                source: Arc::new(GreenhouseSource::new(client.clone(), board)),
                max_results: *max_results,
            },
            SourceConfig::Lever {
                company,
                max_results,
                ..
            } => ConfiguredSource {
                source: Arc::new(LeverSource::new(client.clone(), company)),
                max_results: *max_results,
            },
            SourceConfig::File { path, format, .. } => ConfiguredSource {
                source: Arc::new(FileSource::new(path.clone(), *format)),
                max_results: usize::MAX,
            },
        })
        .collect()
}

/// Keep payloads whose folded title contains the folded query.
fn title_matches(payload: &Value, title_field: &str, folded_query: &str) -> bool {
    if folded_query.is_empty() {
        return true;
    }
    payload
        .get(title_field)
        .and_then(Value::as_str)
        .is_some_and(|title| fold(title).contains(folded_query))
}

// ---------------------------------------------------------------------------
// Gupy
// ---------------------------------------------------------------------------

const GUPY_API: &str = "https://portal.api.gupy.io/api/v1/jobs";
const GUPY_PAGE_SIZE: usize = 100;

/// Gupy public portal search.
pub struct GupySource {
    client: Client,
    api_url: String,
}

impl GupySource {
    pub fn new(client: Client) -> Self {
        Self::with_api_url(client, GUPY_API)
    }

    pub fn with_api_url(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    async fn fetch_page(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("jobName", query.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::source_unavailable(self.id(), e))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| AppError::source_unavailable(self.id(), e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::source_unavailable(self.id(), e))?;
        match body.get("data").and_then(Value::as_array) {
            Some(jobs) => Ok(jobs.clone()),
            None => Err(AppError::source_unavailable(
                self.id(),
                "response has no 'data' array",
            )),
        }
    }
}

#[async_trait]
impl JobSource for GupySource {
    fn id(&self) -> &str {
        "gupy"
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        log::info!("[gupy] Searching '{}'", query);
        let mut payloads: Vec<Value> = Vec::new();

        while payloads.len() < max_results {
            let limit = GUPY_PAGE_SIZE.min(max_results - payloads.len());
            let page = self.fetch_page(query, limit, payloads.len()).await?;
            let page_len = page.len();
            payloads.extend(page);
            if page_len < limit {
                break;
            }
        }
        payloads.truncate(max_results);

        let fetched_at = Utc::now();
        log::info!("[gupy] '{}': {} postings", query, payloads.len());
        Ok(payloads
            .into_iter()
            .map(|p| RawRecord::new(self.id(), SourceKind::Gupy, query, fetched_at, p))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Greenhouse
// ---------------------------------------------------------------------------

const GREENHOUSE_API: &str = "https://boards-api.greenhouse.io/v1/boards";

/// One company's Greenhouse board.
///
/// The board is downloaded once per instance and filtered per term.
pub struct GreenhouseSource {
    client: Client,
    id: String,
    url: String,
    jobs: OnceCell<Vec<Value>>,
}

impl GreenhouseSource {
    pub fn new(client: Client, board: &str) -> Self {
        let url = format!("{GREENHOUSE_API}/{board}/jobs?content=true");
        Self::with_url(client, board, url)
    }

    pub fn with_url(client: Client, board: &str, url: impl Into<String>) -> Self {
        Self {
            client,
            id: format!("greenhouse:{board}"),
            url: url.into(),
            jobs: OnceCell::new(),
        }
    }

    async fn load_board(&self) -> Result<Vec<Value>> {
        log::info!("[{}] Loading board", self.id);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;

        body.get("jobs")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| AppError::source_unavailable(&self.id, "response has no 'jobs' array"))
    }
}

#[async_trait]
impl JobSource for GreenhouseSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        let jobs = self.jobs.get_or_try_init(|| self.load_board()).await?;
        let folded_query = fold(query.trim());
        let fetched_at = Utc::now();

        Ok(jobs
            .iter()
            .filter(|job| title_matches(job, "title", &folded_query))
            .take(max_results)
            .map(|job| {
                RawRecord::new(&self.id, SourceKind::Greenhouse, query, fetched_at, job.clone())
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Lever
// ---------------------------------------------------------------------------

const LEVER_API: &str = "https://api.lever.co/v0/postings";

/// One company's Lever postings.
pub struct LeverSource {
    client: Client,
    id: String,
    url: String,
    postings: OnceCell<Vec<Value>>,
}

impl LeverSource {
    pub fn new(client: Client, company: &str) -> Self {
        let url = format!("{LEVER_API}/{company}?mode=json");
        Self::with_url(client, company, url)
    }

    pub fn with_url(client: Client, company: &str, url: impl Into<String>) -> Self {
        Self {
            client,
            id: format!("lever:{company}"),
            url: url.into(),
            postings: OnceCell::new(),
        }
    }

    async fn load_postings(&self) -> Result<Vec<Value>> {
        log::info!("[{}] Loading postings", self.id);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;

        match body {
            Value::Array(postings) => Ok(postings),
            _ => Err(AppError::source_unavailable(
                &self.id,
                "expected a JSON array of postings",
            )),
        }
    }
}

#[async_trait]
impl JobSource for LeverSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        let postings = self
            .postings
            .get_or_try_init(|| self.load_postings())
            .await?;
        let folded_query = fold(query.trim());
        let fetched_at = Utc::now();

        Ok(postings
            .iter()
            .filter(|p| title_matches(p, "text", &folded_query))
            .take(max_results)
            .map(|p| RawRecord::new(&self.id, SourceKind::Lever, query, fetched_at, p.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// A local JSON array of payloads, for offline runs and fixtures.
///
/// The query is ignored; every payload is returned.
pub struct FileSource {
    id: String,
    path: PathBuf,
    format: SourceKind,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: SourceKind) -> Self {
        let path = path.into();
        Self {
            id: format!("file:{}", path.display()),
            path,
            format,
        }
    }
}

#[async_trait]
impl JobSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;
        let payloads: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::source_unavailable(&self.id, e))?;

        let fetched_at = Utc::now();
        Ok(payloads
            .into_iter()
            .take(max_results)
            .map(|p| RawRecord::new(&self.id, self.format, query, fetched_at, p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_title_filter_folds() {
        let payload = json!({"title": "Engenheiro de Automação Sênior"});
        assert!(title_matches(&payload, "title", &fold("engenheiro de automacao")));
        assert!(title_matches(&payload, "title", ""));
        assert!(!title_matches(&payload, "title", "data engineer"));
        assert!(!title_matches(&json!({}), "title", "x"));
    }

    #[test]
    fn test_source_ids() {
        let client = Client::new();
        assert_eq!(GupySource::new(client.clone()).id(), "gupy");
        assert_eq!(
            GreenhouseSource::new(client.clone(), "nubank").id(),
            "greenhouse:nubank"
        );
        assert_eq!(LeverSource::new(client, "acme").id(), "lever:acme");
    }

    #[tokio::test]
    async fn test_file_source_dedups_across_terms() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!([
                {"title": "Data Engineer", "url": "https://a.example/1"},
                {"title": "Data Analyst", "url": "https://a.example/2"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let source = FileSource::new(&path, SourceKind::Generic);
        let terms = vec!["Data Engineer".to_string(), "Data Analyst".to_string()];
        let records = source.fetch_terms(&terms, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_kind == SourceKind::Generic));
        assert_eq!(records[0].query, "Data Engineer");
    }

    #[tokio::test]
    async fn test_file_source_missing_is_unavailable() {
        let source = FileSource::new("/nonexistent/jobs.json", SourceKind::Generic);
        let err = source.fetch("x", 10).await.unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_build_sources_skips_disabled() {
        let mut config = Config::default();
        config.sources.push(SourceConfig::Lever {
            company: "acme".into(),
            enabled: false,
            max_results: 5,
        });
        let sources = build_sources(&config, &Client::new());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source.id(), "gupy");
    }
}
