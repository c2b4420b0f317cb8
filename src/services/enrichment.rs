// src/services/enrichment.rs

//! LLM field extraction.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{EnrichmentConfig, PartialPosting};
use crate::utils::text::truncate;

/// Proposes posting fields from free text.
///
/// Callers bound every call with a timeout and treat any error as
/// degradation, never as a record failure.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<PartialPosting>;
}

const SYSTEM_PROMPT: &str = "You extract structured fields from job postings. \
Answer with a single JSON object with the keys: \
title (string), company (string), \
remote_text (the exact sentence describing remote or on-site work, empty if none), \
seniority (one of INTERN, JUNIOR, MID, SENIOR, LEAD, STAFF, UNKNOWN), \
category (one of DATA_ENGINEER, DATA_ANALYST, DATA_SCIENTIST, AUTOMATION, AI_ML, OTHER). \
Use null for anything the text does not state.";

/// OpenAI-compatible `/chat/completions` enricher.
pub struct ChatEnricher {
    client: Client,
    endpoint: String,
    model: String,
    max_chars: usize,
}

impl ChatEnricher {
    /// Build from configuration, reading the API key from the environment.
    pub fn from_config(config: &EnrichmentConfig, base: reqwest::ClientBuilder) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AppError::config(format!(
                "enrichment enabled but ${} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(&api_key, &config.endpoint, &config.model, config.max_chars, base)
    }

    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        max_chars: usize,
        base: reqwest::ClientBuilder,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::config("missing enrichment API key"));
        }
        if model.trim().is_empty() {
            return Err(AppError::config("missing enrichment model name"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| AppError::config("invalid enrichment API key"))?,
        );
        let client = base.default_headers(headers).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            max_chars,
        })
    }
}

#[async_trait]
impl Enricher for ChatEnricher {
    async fn extract(&self, raw_text: &str) -> Result<PartialPosting> {
        let excerpt = truncate(raw_text, self.max_chars);
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &excerpt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EnrichmentDegraded(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EnrichmentDegraded(format!(
                "HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::EnrichmentDegraded(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::EnrichmentDegraded("empty completion".into()))?;

        parse_partial(&content)
    }
}

/// Parse a completion body into fields, tolerating code fences.
pub fn parse_partial(content: &str) -> Result<PartialPosting> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(trimmed)
        .map_err(|e| AppError::EnrichmentDegraded(format!("unparseable completion: {e}")))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_plain_and_fenced() {
        let plain = parse_partial(r#"{"title": "Data Engineer", "seniority": "SENIOR"}"#).unwrap();
        assert_eq!(plain.title.as_deref(), Some("Data Engineer"));
        assert_eq!(plain.seniority.as_deref(), Some("SENIOR"));
        assert_eq!(plain.company, None);

        let fenced = parse_partial("```json\n{\"category\": \"AI_ML\", \"company\": null}\n```").unwrap();
        assert_eq!(fenced.category.as_deref(), Some("AI_ML"));
        assert_eq!(fenced.company, None);
    }

    #[test]
    fn test_parse_partial_garbage_is_degraded() {
        let err = parse_partial("sorry, I cannot help").unwrap_err();
        assert!(matches!(err, AppError::EnrichmentDegraded(_)));
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let result = ChatEnricher::new(" ", "https://api.example", "m", 100, Client::builder());
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
