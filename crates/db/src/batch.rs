//! Batched access to the key-value table.
//!
//! Stores only ever apply part of a batch under contention; the rest comes back
//! as unprocessed. [`batch_write_all`] and [`batch_get_all`] split requests into
//! store-sized chunks and resubmit the unprocessed remainder of each chunk with
//! an escalating delay until it drains or the retry ceiling is hit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Largest number of puts/deletes a store accepts per call.
pub const MAX_WRITE_BATCH: usize = 25;
/// Largest number of keys a store accepts per get call.
pub const MAX_GET_BATCH: usize = 100;

/// Delay multipliers, indexed by retry number.
pub const BACKOFF_STEPS: [u32; 10] = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition: String,
    pub sort: String,
}

impl RecordKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: RecordKey,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Record),
    Delete(RecordKey),
}

impl WriteRequest {
    pub fn key(&self) -> &RecordKey {
        match self {
            WriteRequest::Put(record) => &record.key,
            WriteRequest::Delete(key) => key,
        }
    }
}

#[derive(Debug, Default)]
pub struct GetOutput {
    pub records: Vec<Record>,
    pub unprocessed: Vec<RecordKey>,
}

/// The primitive operations a backing table has to offer.
///
/// Implementations may leave any subset of a batch unapplied and report it
/// back; every put and delete is idempotent so resubmitting is always safe.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Apply at most [`MAX_WRITE_BATCH`] requests, returning the unprocessed ones.
    async fn batch_write(&self, requests: Vec<WriteRequest>)
        -> Result<Vec<WriteRequest>, StoreError>;

    /// Fetch at most [`MAX_GET_BATCH`] keys. Missing keys are simply absent
    /// from `records`; keys the store did not get to are in `unprocessed`.
    async fn batch_get(&self, keys: Vec<RecordKey>) -> Result<GetOutput, StoreError>;

    /// Every record in the table.
    async fn scan(&self) -> Result<Vec<Record>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// One step of [`BACKOFF_STEPS`].
    pub unit: Duration,
    pub max_retries: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_millis(50),
            max_retries: 10,
        }
    }
}

impl BatchPolicy {
    /// Delay before retry number `retry` (zero based). Past the end of the
    /// table the last step repeats.
    pub fn delay(&self, retry: usize) -> Duration {
        let step = BACKOFF_STEPS[retry.min(BACKOFF_STEPS.len() - 1)];
        self.unit * step
    }
}

/// The two shapes of batched request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Write(Vec<WriteRequest>),
    Get(Vec<RecordKey>),
}

/// Run either kind of batch to completion. Writes yield no records.
pub async fn batch_apply(
    store: &dyn BatchStore,
    policy: &BatchPolicy,
    op: BatchOp,
) -> Result<Vec<Record>, StoreError> {
    match op {
        BatchOp::Write(requests) => batch_write_all(store, policy, requests)
            .await
            .map(|()| Vec::new()),
        BatchOp::Get(keys) => batch_get_all(store, policy, keys).await,
    }
}

pub async fn batch_write_all(
    store: &dyn BatchStore,
    policy: &BatchPolicy,
    requests: Vec<WriteRequest>,
) -> Result<(), StoreError> {
    for chunk in chunked(requests, MAX_WRITE_BATCH) {
        drain(policy, chunk, |pending| async move {
            let unprocessed = store.batch_write(pending).await?;
            Ok((Vec::<Record>::new(), unprocessed))
        })
        .await?;
    }
    Ok(())
}

/// Fetch every key; each found record is returned exactly once.
pub async fn batch_get_all(
    store: &dyn BatchStore,
    policy: &BatchPolicy,
    keys: Vec<RecordKey>,
) -> Result<Vec<Record>, StoreError> {
    let mut records = Vec::new();
    for chunk in chunked(keys, MAX_GET_BATCH) {
        let found = drain(policy, chunk, |pending| async move {
            let output = store.batch_get(pending).await?;
            Ok((output.records, output.unprocessed))
        })
        .await?;
        records.extend(found);
    }
    Ok(records)
}

/// Submit `pending` until nothing is left, sleeping between rounds.
async fn drain<T, R, F, Fut>(
    policy: &BatchPolicy,
    mut pending: Vec<T>,
    mut submit: F,
) -> Result<Vec<R>, StoreError>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(Vec<R>, Vec<T>), StoreError>>,
{
    let mut done = Vec::new();
    let mut retry = 0;

    loop {
        let submitted = pending.len();
        let (finished, unprocessed) = submit(pending).await?;
        done.extend(finished);

        if unprocessed.is_empty() {
            return Ok(done);
        }

        if retry >= policy.max_retries {
            return Err(StoreError::RetriesExhausted {
                retries: retry,
                unprocessed: unprocessed.len(),
            });
        }

        let delay = policy.delay(retry);
        warn!(
            submitted,
            unprocessed = unprocessed.len(),
            retry = retry + 1,
            ?delay,
            "batch partially applied, retrying"
        );
        tokio::time::sleep(delay).await;

        pending = unprocessed;
        retry += 1;
    }
}

fn chunked<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(size).collect());
    }
    debug!(chunks = chunks.len(), "split batch");
    chunks
}
