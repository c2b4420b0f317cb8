// src/pipeline/notify.rs

//! Rendering and delivery of the notification batch.
//!
//! A batch is one summary message followed by one detail message per
//! posting. A fingerprint is marked notified only after its detail message
//! is confirmed.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{NotifierConfig, ScoredPosting};
use crate::services::{Deliverer, DeliveryConfirmation, RenderedMessage};
use crate::storage::DedupStore;
use crate::utils::text::truncate;

const MAX_BACKOFF_EXPONENT: u32 = 5;
const SKILLS_SHOWN: usize = 5;

/// Characters with meaning in Telegram's legacy Markdown.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn score_badge(score: u32) -> &'static str {
    match score {
        80.. => " 🔥",
        60..=79 => " ⭐",
        _ => "",
    }
}

fn or_placeholder(value: &str) -> String {
    if value.trim().is_empty() {
        "Não informado".to_string()
    } else {
        escape_markdown(value.trim())
    }
}

/// Summary grouped by company, in rank order.
pub fn render_summary(postings: &[ScoredPosting], now: DateTime<Utc>) -> String {
    let mut lines = vec![format!(
        "📊 *Resumo de Vagas - {}*",
        now.format("%d/%m %H:%M")
    )];
    lines.push(String::new());

    if postings.is_empty() {
        lines.push("📭 Nenhuma vaga nova encontrada.".to_string());
        return lines.join("\n");
    }

    let noun = if postings.len() == 1 { "vaga" } else { "vagas" };
    lines.push(format!(
        "✨ Encontradas *{} {}* relevantes:",
        postings.len(),
        noun
    ));
    lines.push(String::new());

    // Companies keep the position of their best-ranked posting.
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&ScoredPosting>> = BTreeMap::new();
    for item in postings {
        let company = item.posting.company.trim();
        if !groups.contains_key(company) {
            order.push(company);
        }
        groups.entry(company).or_default().push(item);
    }

    for (i, company) in order.iter().enumerate() {
        lines.push(format!("*{}. {}*", i + 1, or_placeholder(company)));
        for item in groups.get(company).into_iter().flatten() {
            lines.push(format!(
                "  • {}{}",
                escape_markdown(&item.posting.title),
                score_badge(item.result.score)
            ));
            lines.push(format!("    Score: {}/100", item.result.score));
        }
        lines.push(String::new());
    }

    lines.push("_Clique nos links abaixo para ver detalhes de cada vaga_".to_string());
    lines.join("\n")
}

/// One posting in full.
pub fn render_detail(item: &ScoredPosting, description_chars: usize) -> String {
    let posting = &item.posting;
    let mut lines = vec![
        format!("*🔥 {}*", escape_markdown(&posting.title)),
        String::new(),
        format!("🏢 {}", or_placeholder(&posting.company)),
        format!("📍 {}", or_placeholder(&posting.location_text)),
        format!("🏠 {}", or_placeholder(&posting.remote_text)),
    ];

    if !posting.tech_stack.is_empty() {
        let shown: Vec<&str> = posting
            .tech_stack
            .iter()
            .take(SKILLS_SHOWN)
            .map(String::as_str)
            .collect();
        let mut skills = escape_markdown(&shown.join(", "));
        let rest = posting.tech_stack.len().saturating_sub(SKILLS_SHOWN);
        if rest > 0 {
            skills.push_str(&format!(" +{rest}"));
        }
        lines.push(format!("🛠️ {skills}"));
    }

    lines.push(format!("📈 Relevância: {}/100", item.result.score));

    if description_chars > 0 && !posting.description.trim().is_empty() {
        lines.push(String::new());
        lines.push(escape_markdown(&truncate(
            posting.description.trim(),
            description_chars,
        )));
    }

    lines.push(String::new());
    lines.push(format!("[🔗 Ver vaga completa]({})", posting.url));
    lines.join("\n")
}

/// Summary first, then one detail per posting.
pub fn render_batch(
    postings: &[ScoredPosting],
    now: DateTime<Utc>,
    description_chars: usize,
) -> Vec<RenderedMessage> {
    let mut messages = vec![RenderedMessage::summary(render_summary(postings, now))];
    messages.extend(postings.iter().map(|item| {
        RenderedMessage::detail(
            &item.result.fingerprint,
            render_detail(item, description_chars),
        )
    }));
    messages
}

/// Outcome of delivering one batch.
#[derive(Debug, Clone, Default)]
pub struct NotifyOutcome {
    pub summary_delivered: bool,
    pub notified: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Delivers batches and writes confirmations back to the dedup store.
pub struct Notifier<'a> {
    deliverer: &'a dyn Deliverer,
    store: &'a dyn DedupStore,
    max_attempts: u32,
    backoff: Duration,
    description_chars: usize,
}

impl<'a> Notifier<'a> {
    pub fn new(deliverer: &'a dyn Deliverer, store: &'a dyn DedupStore, config: &NotifierConfig) -> Self {
        Self {
            deliverer,
            store,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            description_chars: config.description_chars,
        }
    }

    /// Deliver a ranked, deduplicated batch.
    ///
    /// Delivery failures are collected in the outcome. Only a store failure
    /// is returned as an error.
    pub async fn notify(&self, postings: &[ScoredPosting], now: DateTime<Utc>) -> Result<NotifyOutcome> {
        let mut outcome = NotifyOutcome::default();
        if postings.is_empty() {
            log::info!("Nothing to notify");
            return Ok(outcome);
        }

        let messages = render_batch(postings, now, self.description_chars);
        for message in &messages {
            let delivered = self.deliver_with_retry(message).await;

            let Some(fingerprint) = message.fingerprint.as_deref() else {
                match delivered {
                    Ok(_) => outcome.summary_delivered = true,
                    Err(e) => {
                        log::warn!("Summary not delivered: {}", e);
                        outcome.errors.push(format!("summary: {e}"));
                    }
                }
                continue;
            };

            match delivered {
                Ok(confirmation) => {
                    self.store.mark_notified(fingerprint, now).await?;
                    outcome.notified += 1;
                    log::debug!(
                        "Delivered {} via {} (message {:?})",
                        fingerprint,
                        self.deliverer.name(),
                        confirmation.message_id
                    );
                }
                Err(e) => {
                    log::warn!("Detail for {} not delivered: {}", fingerprint, e);
                    outcome.failed += 1;
                    outcome.errors.push(format!("{fingerprint}: {e}"));
                }
            }
        }

        log::info!(
            "Notified {} posting(s), {} failed",
            outcome.notified,
            outcome.failed
        );
        Ok(outcome)
    }

    async fn deliver_with_retry(&self, message: &RenderedMessage) -> Result<DeliveryConfirmation> {
        let mut last_error = String::new();

        for attempt in 0..self.max_attempts {
            match self.deliverer.deliver(message).await {
                Ok(confirmation) => return Ok(confirmation),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < self.max_attempts {
                        let delay = self.backoff * 2u32.pow(attempt.min(MAX_BACKOFF_EXPONENT));
                        log::debug!(
                            "Delivery attempt {} failed ({}); retrying in {:?}",
                            attempt + 1,
                            last_error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AppError::delivery(self.max_attempts, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedPosting, RuleSet};
    use crate::pipeline::scoring::ScoringEngine;
    use crate::storage::MemoryDedupStore;
    use crate::testing::MockDeliverer;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    fn item(url: &str, title: &str, company: &str) -> ScoredPosting {
        let engine = ScoringEngine::new(&RuleSet::default()).unwrap();
        let posting = NormalizedPosting::new("gupy", url, now())
            .with_title(title)
            .with_company(company)
            .with_description("100% remoto. Python, Airflow, Spark.")
            .with_remote_text("100% remoto")
            .with_stack(["python", "airflow", "spark", "sql", "dbt", "kafka", "aws"]);
        let result = engine.evaluate(&posting, now());
        ScoredPosting { posting, result }
    }

    fn config(max_attempts: u32) -> NotifierConfig {
        NotifierConfig {
            max_attempts,
            backoff_ms: 1,
            ..NotifierConfig::default()
        }
    }

    #[test]
    fn test_summary_groups_by_company() {
        let items = vec![
            item("https://a.example/1", "Senior Data Engineer", "Acme"),
            item("https://b.example/1", "Data Engineer", "Beta"),
            item("https://a.example/2", "Analytics Engineer", "Acme"),
        ];
        let text = render_summary(&items, now());

        assert!(text.starts_with("📊 *Resumo de Vagas - 16/10 09:30*"));
        assert!(text.contains("*3 vagas*"));
        let acme = text.find("*1. Acme*").unwrap();
        let beta = text.find("*2. Beta*").unwrap();
        let analytics = text.find("Analytics Engineer").unwrap();
        assert!(acme < analytics && analytics < beta);
        assert!(text.contains("Score: 100/100"));
        assert!(text.contains("🔥"));
    }

    #[test]
    fn test_empty_summary() {
        assert!(render_summary(&[], now()).contains("Nenhuma vaga nova"));
    }

    #[test]
    fn test_detail_rendering() {
        let text = render_detail(&item("https://a.example/1", "Data_Engineer", ""), 20);
        assert!(text.starts_with("*🔥 Data\\_Engineer*"));
        assert!(text.contains("🏢 Não informado"));
        assert!(text.contains("+2"));
        assert!(text.ends_with("[🔗 Ver vaga completa](https://a.example/1)"));
    }

    #[tokio::test]
    async fn test_marks_only_confirmed_details() {
        let items = vec![
            item("https://a.example/1", "Data Engineer", "Acme"),
            item("https://a.example/2", "Data Engineer II", "Acme"),
        ];
        // Summary succeeds, first detail exhausts its attempts, second succeeds.
        let deliverer = MockDeliverer::new().fail_calls([2, 3]);
        let store = MemoryDedupStore::new(None);
        let notifier = Notifier::new(&deliverer, &store, &config(2));

        let outcome = notifier.notify(&items, now()).await.unwrap();
        assert!(outcome.summary_delivered);
        assert_eq!(outcome.notified, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(deliverer.call_count(), 4);

        let first = &items[0].result.fingerprint;
        let second = &items[1].result.fingerprint;
        assert!(store.is_eligible_for_notification(first, now()).await.unwrap());
        assert!(!store.is_eligible_for_notification(second, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_summary_failure_still_sends_details() {
        let items = vec![item("https://a.example/1", "Data Engineer", "Acme")];
        let deliverer = MockDeliverer::new().fail_calls([1]);
        let store = MemoryDedupStore::new(None);
        let notifier = Notifier::new(&deliverer, &store, &config(1));

        let outcome = notifier.notify(&items, now()).await.unwrap();
        assert!(!outcome.summary_delivered);
        assert_eq!(outcome.notified, 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let items = vec![item("https://a.example/1", "Data Engineer", "Acme")];
        let deliverer = MockDeliverer::new().fail_calls([2]);
        let store = MemoryDedupStore::new(None);
        let notifier = Notifier::new(&deliverer, &store, &config(3));

        let outcome = notifier.notify(&items, now()).await.unwrap();
        assert_eq!(outcome.notified, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(deliverer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let deliverer = MockDeliverer::new();
        let store = MemoryDedupStore::new(None);
        let notifier = Notifier::new(&deliverer, &store, &config(3));

        let outcome = notifier.notify(&[], now()).await.unwrap();
        assert_eq!(outcome.notified, 0);
        assert_eq!(deliverer.call_count(), 0);
    }
}
