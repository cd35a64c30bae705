use crate::store::{JobStore, StoreError};
use crate::types::{Job, ResultRecord, TestResult, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Redis key layout - API, CLI and worker must agree on these
pub const QUEUE_KEY: &str = "queue:runs";
pub const RESULT_PREFIX: &str = "result";

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_DONE: &str = "DONE";

/// Generate result hash key for a job
pub fn result_key(job_id: &Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

/// Field/value pairs of a terminal record, written with a single HSET
pub fn done_fields(
    verdict: Verdict,
    results: &[TestResult],
    finished_at: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, StoreError> {
    Ok(vec![
        ("status", STATUS_DONE.to_string()),
        ("verdict", verdict.as_str().to_string()),
        ("results", serde_json::to_string(results)?),
        ("finished_at", finished_at.to_rfc3339()),
    ])
}

/// Rebuild a record from the hash fields returned by HGETALL.
///
/// An empty hash is an unknown id. A missing `status` reads as PENDING.
/// DONE without both `verdict` and `results` is rejected as malformed.
pub fn record_from_fields(
    id: &Uuid,
    mut fields: HashMap<String, String>,
) -> Result<Option<ResultRecord>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let malformed = |reason: String| StoreError::Malformed { id: *id, reason };

    let status = fields
        .remove("status")
        .unwrap_or_else(|| STATUS_PENDING.to_string());

    match status.as_str() {
        STATUS_PENDING => Ok(Some(ResultRecord::Pending)),
        STATUS_DONE => {
            let raw_verdict = fields
                .remove("verdict")
                .ok_or_else(|| malformed("DONE without verdict".to_string()))?;
            let verdict = Verdict::parse(&raw_verdict)
                .ok_or_else(|| malformed(format!("unknown verdict '{}'", raw_verdict)))?;
            let raw_results = fields
                .remove("results")
                .ok_or_else(|| malformed("DONE without results".to_string()))?;
            let results: Vec<TestResult> = serde_json::from_str(&raw_results)?;
            let finished_at = fields
                .remove("finished_at")
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|at| at.with_timezone(&Utc));

            Ok(Some(ResultRecord::Done {
                verdict,
                results,
                finished_at,
            }))
        }
        other => Err(malformed(format!("unknown status '{}'", other))),
    }
}

/// Redis-backed queue (list) and result store (hash per submission)
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    result_ttl_secs: Option<u64>,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            result_ttl_secs: None,
        }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Expire terminal records this many seconds after they reach DONE
    pub fn with_result_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.result_ttl_secs = ttl_secs;
        self
    }

    /// Number of jobs waiting in the channel
    pub async fn queue_depth(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create_pending(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(result_key(id), "status", STATUS_PENDING).await?;
        Ok(())
    }

    /// Uses RPUSH for FIFO semantics
    async fn push(&self, job: &Job) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = job.to_envelope()?;
        let _: () = conn.rpush(QUEUE_KEY, payload).await?;
        Ok(())
    }

    /// Uses BLPOP so an idle worker wakes up regularly
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> =
            conn.blpop(QUEUE_KEY, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_key, payload)| payload))
    }

    async fn complete(
        &self,
        id: &Uuid,
        verdict: Verdict,
        results: &[TestResult],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = result_key(id);
        let fields = done_fields(verdict, results, Utc::now())?;

        match self.result_ttl_secs {
            Some(ttl) => {
                // MULTI/EXEC so the expiry can never land without the fields
                let _: () = redis::pipe()
                    .atomic()
                    .hset_multiple(&key, fields.as_slice())
                    .ignore()
                    .cmd("EXPIRE")
                    .arg(&key)
                    .arg(ttl)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                let _: () = conn.hset_multiple(&key, fields.as_slice()).await?;
            }
        }
        Ok(())
    }

    async fn fetch(&self, id: &Uuid) -> Result<Option<ResultRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(result_key(id)).await?;
        record_from_fields(id, fields)
    }

    async fn discard(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(result_key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestStatus;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_result_key_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(result_key(&id), result_key(&id));
        assert_eq!(result_key(&id), format!("result:{}", id));
    }

    #[test]
    fn test_empty_hash_is_unknown() {
        let id = Uuid::new_v4();
        assert_eq!(record_from_fields(&id, HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_pending_hash() {
        let id = Uuid::new_v4();
        let record = record_from_fields(&id, fields(&[("status", "PENDING")])).unwrap();
        assert_eq!(record, Some(ResultRecord::Pending));
    }

    #[test]
    fn test_done_fields_round_trip_through_hash() {
        let id = Uuid::new_v4();
        let results = vec![TestResult {
            test_index: 0,
            status: TestStatus::Passed,
            stdout: "0 1\n".to_string(),
            stderr: String::new(),
            expected: "0 1\n".to_string(),
        }];
        let at = Utc::now();
        let written: HashMap<String, String> = done_fields(Verdict::Accepted, &results, at)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        match record_from_fields(&id, written).unwrap() {
            Some(ResultRecord::Done {
                verdict,
                results: read,
                finished_at,
            }) => {
                assert_eq!(verdict, Verdict::Accepted);
                assert_eq!(read, results);
                assert_eq!(finished_at.map(|t| t.timestamp()), Some(at.timestamp()));
            }
            other => panic!("expected DONE record, got {:?}", other),
        }
    }

    #[test]
    fn test_done_without_results_is_malformed() {
        let id = Uuid::new_v4();
        let err = record_from_fields(&id, fields(&[("status", "DONE"), ("verdict", "ACCEPTED")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let id = Uuid::new_v4();
        let err = record_from_fields(&id, fields(&[("status", "RUNNING")])).unwrap_err();
        assert!(err.to_string().contains("RUNNING"));
    }

    /// Requires a Redis server on REDIS_URL (default redis://127.0.0.1:6379)
    #[tokio::test]
    #[ignore]
    async fn test_redis_enqueue_poll_lifecycle() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisStore::connect(&url).await.expect("Failed to connect to Redis");

        let never_pushed = Uuid::new_v4();
        assert_eq!(crate::store::poll(&store, &never_pushed).await.unwrap(), None);

        let id = crate::store::enqueue(&store, crate::types::JobKind::Public, "two-sum", "print('0 1')")
            .await
            .unwrap();
        assert_eq!(
            crate::store::poll(&store, &id).await.unwrap(),
            Some(ResultRecord::Pending)
        );

        store
            .complete(&id, Verdict::Error, &[TestResult::job_error("boom")])
            .await
            .unwrap();
        let record = crate::store::poll(&store, &id).await.unwrap().unwrap();
        assert_eq!(record.verdict(), Some(Verdict::Error));
    }
}
