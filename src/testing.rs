//! Mock collaborators for tests.
//!
//! Each mock records its calls so tests can assert on what the pipeline
//! asked for without any network access.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DedupRecord, PartialPosting, RawRecord, SourceKind};
use crate::services::{Deliverer, DeliveryConfirmation, Enricher, JobSource, RenderedMessage};
use crate::storage::{DedupStore, MemoryDedupStore};

/// A job source with canned payloads per query.
pub struct MockSource {
    id: String,
    kind: SourceKind,
    /// Payloads returned for any query without its own entry
    default_payloads: Vec<Value>,
    by_query: HashMap<String, Vec<Value>>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Generic,
            default_payloads: Vec::new(),
            by_query: HashMap::new(),
            failure: None,
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Return these payloads for every query.
    pub fn with_payloads(mut self, payloads: Vec<Value>) -> Self {
        self.default_payloads = payloads;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>, payloads: Vec<Value>) -> Self {
        self.by_query.insert(query.into(), payloads);
        self
    }

    /// Fail every fetch with `SourceUnavailable`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl JobSource for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        self.calls.write().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(AppError::source_unavailable(&self.id, message));
        }

        let payloads = self.by_query.get(query).unwrap_or(&self.default_payloads);
        let fetched_at = Utc::now();
        Ok(payloads
            .iter()
            .take(max_results)
            .map(|p| RawRecord::new(&self.id, self.kind, query, fetched_at, p.clone()))
            .collect())
    }
}

#[derive(Debug, Clone)]
enum EnricherBehavior {
    Return(PartialPosting),
    Fail(String),
    Hang,
}

/// An enricher that answers, fails or never answers.
pub struct MockEnricher {
    behavior: EnricherBehavior,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEnricher {
    fn with_behavior(behavior: EnricherBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn returning(partial: PartialPosting) -> Self {
        Self::with_behavior(EnricherBehavior::Return(partial))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(EnricherBehavior::Fail(message.into()))
    }

    /// Never completes; exercises the caller's timeout.
    pub fn hanging() -> Self {
        Self::with_behavior(EnricherBehavior::Hang)
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    async fn extract(&self, raw_text: &str) -> Result<PartialPosting> {
        self.calls.write().unwrap().push(raw_text.to_string());
        match &self.behavior {
            EnricherBehavior::Return(partial) => Ok(partial.clone()),
            EnricherBehavior::Fail(message) => Err(AppError::EnrichmentDegraded(message.clone())),
            EnricherBehavior::Hang => {
                futures::future::pending::<()>().await;
                Err(AppError::EnrichmentDegraded("unreachable".into()))
            }
        }
    }
}

/// A deliverer that records messages and fails chosen calls.
#[derive(Default)]
pub struct MockDeliverer {
    /// 1-based call numbers that fail
    fail_on: BTreeSet<usize>,
    fail_all: bool,
    delivered: Arc<RwLock<Vec<RenderedMessage>>>,
    calls: Arc<RwLock<usize>>,
}

impl MockDeliverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given 1-based call numbers.
    pub fn fail_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on.extend(calls);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Successfully delivered messages, in order.
    pub fn delivered(&self) -> Vec<RenderedMessage> {
        self.delivered.read().unwrap().clone()
    }

    /// Fingerprints of delivered detail messages.
    pub fn delivered_fingerprints(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|m| m.fingerprint)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.read().unwrap()
    }
}

#[async_trait]
impl Deliverer for MockDeliverer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<DeliveryConfirmation> {
        let call = {
            let mut calls = self.calls.write().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_all || self.fail_on.contains(&call) {
            return Err(AppError::delivery(1, format!("mock failure on call {call}")));
        }

        self.delivered.write().unwrap().push(message.clone());
        Ok(DeliveryConfirmation {
            message_id: Some(call.to_string()),
            delivered_at: Utc::now(),
        })
    }
}

/// Dedup store operation a [`FailingDedupStore`] breaks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    RecordSeen,
    MarkNotified,
}

/// An in-memory dedup store whose chosen operation fails with
/// `StateStoreUnavailable`.
pub struct FailingDedupStore {
    inner: MemoryDedupStore,
    fail_on: StoreOp,
    calls: Arc<RwLock<Vec<StoreOp>>>,
}

impl FailingDedupStore {
    pub fn new(fail_on: StoreOp) -> Self {
        Self {
            inner: MemoryDedupStore::new(None),
            fail_on,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Mutating operations attempted, in order.
    pub fn calls(&self) -> Vec<StoreOp> {
        self.calls.read().unwrap().clone()
    }

    fn attempt(&self, op: StoreOp) -> Result<()> {
        self.calls.write().unwrap().push(op);
        if op == self.fail_on {
            return Err(AppError::store(format!("disk full during {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for FailingDedupStore {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<DedupRecord>> {
        self.inner.lookup(fingerprint).await
    }

    async fn record_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<DedupRecord> {
        self.attempt(StoreOp::RecordSeen)?;
        self.inner.record_seen(fingerprint, seen_at).await
    }

    async fn mark_notified(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<bool> {
        self.attempt(StoreOp::MarkNotified)?;
        self.inner.mark_notified(fingerprint, notified_at).await
    }

    async fn is_eligible_for_notification(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.is_eligible_for_notification(fingerprint, now).await
    }
}
