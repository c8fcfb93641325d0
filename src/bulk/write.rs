//! # Bulk Write Orchestrator
//!
//! Applies up to [`MAX_BULK_PAIRS`] independent writes concurrently. Each
//! entry is validated, then written with its own bounded retry on
//! rate-limit rejections. A backoff wait suspends only its own entry.
//!
//! Entries share nothing while running; each produces its own
//! [`EntryOutcome`] and the outcomes are merged, in input order, once every
//! entry has reached a terminal state.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::kv::validation::{validate_key, validate_put_options, MAX_BULK_PAIRS};
use crate::kv::{Clock, KvBackend, KvError, KvResult, PutOptions};

use super::result::{BulkResult, EntryOutcome};
use super::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// One write of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEntry {
    pub key: String,
    pub value: String,
    pub options: PutOptions,
}

#[derive(Debug, Clone)]
pub struct BulkWriteOrchestrator {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl BulkWriteOrchestrator {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run every entry to completion and aggregate the outcomes
    pub async fn run(&self, entries: Vec<WriteEntry>) -> KvResult<BulkResult> {
        if entries.is_empty() || entries.len() > MAX_BULK_PAIRS {
            return Err(KvError::validation(format!(
                "pairs must contain between 1 and {} entries",
                MAX_BULK_PAIRS
            )));
        }

        let outcomes = join_all(entries.iter().map(|entry| self.write_one(entry))).await;
        let result = BulkResult::from_outcomes(outcomes);
        info!(
            backend = self.backend.name(),
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            "bulk write finished"
        );
        Ok(result)
    }

    async fn write_one(&self, entry: &WriteEntry) -> EntryOutcome {
        let checked = validate_key(&entry.key)
            .and_then(|_| validate_put_options(&entry.options, self.clock.now_millis()));
        if let Err(e) = checked {
            return EntryOutcome::failed(&entry.key, &e);
        }

        match self.put_with_retry(entry).await {
            Ok(()) => EntryOutcome::ok(&entry.key),
            Err(e) => EntryOutcome::failed(&entry.key, &e),
        }
    }

    async fn put_with_retry(&self, entry: &WriteEntry) -> KvResult<()> {
        let mut attempt: u32 = 1;
        loop {
            let err = match self
                .backend
                .put(&entry.key, &entry.value, &entry.options)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_rate_limited() => e,
                Err(e) => return Err(e),
            };

            match self.policy.delay_after(attempt) {
                Some(delay) => {
                    debug!(
                        key = %entry.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(key = %entry.key, attempts = attempt, "rate limit retries exhausted");
                    return Err(err);
                }
            }
        }
    }
}
