//! Single-flight job coordination.
//!
//! A key is claimed in the [`InFlightSet`] under the same lock that records
//! its job task, and released by a drop guard owned by that task, so the marker goes away on
//! success, failure, panic and abort alike. The cache write at the end of a
//! job is the only completion signal; readers poll the cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::AbortHandle;

use crate::models::job::{BatchSummary, ProcessOutcome};
use crate::models::product::{KeyError, LookupKey};
use crate::services::cache::{CacheError, ProductCache};
use crate::services::pipeline::{JobError, ProductPipeline};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid UPC: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Cache unavailable: {0}")]
    Cache(#[from] CacheError),
}

struct Slot {
    job_id: u64,
    abort: AbortHandle,
}

/// Keys currently owned by a running job.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashMap<LookupKey, Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl InFlightSet {
    /// Claim `key` and hand its guard to `spawn`, recording the returned task
    /// handle under the same lock. Returns false if another job owns `key`.
    ///
    /// `spawn` runs with the lock held and must move the guard into the task
    /// rather than dropping it.
    fn start<F>(&self, key: &LookupKey, spawn: F) -> bool
    where
        F: FnOnce(InFlightGuard) -> AbortHandle,
    {
        let mut slots = self.lock();
        if slots.contains_key(key) {
            return false;
        }
        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let abort = spawn(InFlightGuard {
            set: self.clone(),
            key: key.clone(),
            job_id,
        });
        slots.insert(key.clone(), Slot { job_id, abort });
        metrics::gauge!("upc_jobs_in_flight").set(slots.len() as f64);
        true
    }

    fn release(&self, key: &LookupKey, job_id: u64) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|s| s.job_id == job_id) {
            slots.remove(key);
        }
        metrics::gauge!("upc_jobs_in_flight").set(slots.len() as f64);
    }

    pub fn contains(&self, key: &LookupKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn abort(&self, key: &LookupKey) -> bool {
        let handle = self.lock().get(key).map(|s| s.abort.clone());
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn abort_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self.lock().values().map(|s| s.abort.clone()).collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    // Critical sections never panic, so a poisoned lock still holds a
    // consistent map.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LookupKey, Slot>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one in-flight key. Dropping it releases the key.
struct InFlightGuard {
    set: InFlightSet,
    key: LookupKey,
    job_id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.key, self.job_id);
    }
}

/// Accepts processing requests and runs at most one job per key.
pub struct JobCoordinator {
    pipeline: Arc<ProductPipeline>,
    cache: ProductCache,
    in_flight: InFlightSet,
}

impl JobCoordinator {
    pub fn new(pipeline: ProductPipeline, cache: ProductCache) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            cache,
            in_flight: InFlightSet::default(),
        }
    }

    /// Start a background job for `raw` unless it is cached or already running.
    /// Returns without waiting for the job.
    pub async fn request_processing(&self, raw: &str) -> Result<ProcessOutcome, CoordinatorError> {
        let key = LookupKey::parse(raw)?;

        if self.cache.contains(&key).await? {
            return Ok(ProcessOutcome::AlreadyCached);
        }

        if self.try_start(&key) {
            Ok(ProcessOutcome::Started)
        } else {
            Ok(ProcessOutcome::AlreadyProcessing)
        }
    }

    /// Deduplicate `raw_keys`, then start a job for every valid key that is
    /// neither cached nor in flight.
    ///
    /// All cache checks finish before the first job starts, so a cache error
    /// fails the batch without launching anything.
    pub async fn submit_batch<I, S>(&self, raw_keys: I) -> Result<BatchSummary, CoordinatorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = raw_keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| seen.insert(k.clone()))
            .collect();

        let mut summary = BatchSummary {
            total: unique.len(),
            ..BatchSummary::default()
        };

        let mut pending = Vec::new();
        for raw in &unique {
            let Ok(key) = LookupKey::parse(raw) else {
                continue;
            };
            if !self.cache.contains(&key).await? {
                pending.push(key);
            }
        }

        for key in &pending {
            if self.try_start(key) {
                summary.queued += 1;
            }
        }
        summary.ignored = summary.total - summary.queued;

        tracing::info!(
            total = summary.total,
            queued = summary.queued,
            ignored = summary.ignored,
            "Batch processing initiated"
        );
        Ok(summary)
    }

    pub fn is_processing(&self, key: &LookupKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Abort the job for `key`. Returns whether a running job was found.
    ///
    /// A key is only visible as in flight once its task handle is recorded,
    /// so a job that [`request_processing`](Self::request_processing)
    /// reported as started can always be cancelled.
    pub fn cancel(&self, key: &LookupKey) -> bool {
        self.in_flight.abort(key)
    }

    /// Abort every running job.
    pub fn shutdown(&self) {
        let aborted = self.in_flight.abort_all();
        if aborted > 0 {
            tracing::info!(aborted, "Aborted in-flight jobs");
        }
    }

    fn try_start(&self, key: &LookupKey) -> bool {
        let started = self.in_flight.start(key, |guard| {
            let pipeline = Arc::clone(&self.pipeline);
            let cache = self.cache.clone();
            let task_key = key.clone();
            tokio::spawn(async move {
                let _guard = guard;
                run_job(&pipeline, &cache, &task_key).await;
            })
            .abort_handle()
        });
        if !started {
            return false;
        }

        metrics::counter!("upc_jobs_started_total").increment(1);
        tracing::info!(upc = %key, "Started background job");
        true
    }
}

async fn run_job(pipeline: &ProductPipeline, cache: &ProductCache, key: &LookupKey) {
    let start = Instant::now();

    let outcome = match pipeline.run(key).await {
        Ok(result) => cache
            .put(&result)
            .await
            .map_err(|e| ("cache", true, e.to_string())),
        Err(JobError::Lookup(e)) => Err(("lookup", e.is_transient(), e.to_string())),
    };

    metrics::histogram!("upc_job_duration_seconds").record(start.elapsed().as_secs_f64());
    match outcome {
        Ok(()) => {
            metrics::counter!("upc_jobs_completed_total").increment(1);
            tracing::info!(
                upc = %key,
                duration_ms = start.elapsed().as_millis() as u64,
                "Job completed, result cached"
            );
        }
        Err((stage, transient, error)) => {
            metrics::counter!("upc_jobs_failed_total").increment(1);
            if transient {
                tracing::error!(upc = %key, stage, error = %error, "Job failed, nothing cached");
            } else {
                tracing::warn!(upc = %key, stage, error = %error, "Product not found, nothing cached");
            }
        }
    }
}
