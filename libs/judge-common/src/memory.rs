//! In-process implementation of [`JobStore`], used by tests and local runs
//! where a Redis server is not available.

use crate::store::{JobStore, StoreError};
use crate::types::{Job, ResultRecord, TestResult, Verdict};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
    records: Mutex<HashMap<Uuid, ResultRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a raw envelope, bypassing serialization (for malformed-payload tests)
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.queue.lock().await.push_back(payload.into());
        self.notify.notify_one();
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_pending(&self, id: &Uuid) -> Result<(), StoreError> {
        self.records.lock().await.insert(*id, ResultRecord::Pending);
        Ok(())
    }

    async fn push(&self, job: &Job) -> Result<(), StoreError> {
        let payload = job.to_envelope()?;
        self.push_raw(payload).await;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.notify.notified();
            if let Some(payload) = self.queue.lock().await.pop_front() {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(
        &self,
        id: &Uuid,
        verdict: Verdict,
        results: &[TestResult],
    ) -> Result<(), StoreError> {
        let record = ResultRecord::Done {
            verdict,
            results: results.to_vec(),
            finished_at: Some(Utc::now()),
        };
        self.records.lock().await.insert(*id, record);
        Ok(())
    }

    async fn fetch(&self, id: &Uuid) -> Result<Option<ResultRecord>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn discard(&self, id: &Uuid) -> Result<(), StoreError> {
        self.records.lock().await.remove(id);
        Ok(())
    }
}
