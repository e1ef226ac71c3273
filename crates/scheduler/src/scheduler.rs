use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use adflux_core::RetryPolicy;

use crate::job::{FailedJob, Job, JobError, JobHandler};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub retry: RetryPolicy,
    /// Maximum entries kept in the failed-job diagnostics list; the oldest
    /// entry is evicted when full.
    pub failed_job_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            failed_job_capacity: 100,
        }
    }
}

struct RepeatingEntry {
    queue: String,
    interval: Duration,
    ticker: JoinHandle<()>,
}

struct Inner {
    config: SchedulerConfig,
    handlers: RwLock<HashMap<String, JobHandler>>,
    definitions: Mutex<HashMap<String, RepeatingEntry>>,
    /// One async mutex per dedup key: occurrences sharing a key queue up
    /// behind it while different keys run concurrently.
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    failed: Mutex<VecDeque<FailedJob>>,
    metrics: SchedulerMetrics,
    shutdown: AtomicBool,
}

/// In-process job scheduler over the tokio runtime.
///
/// Cheap to clone; all clones share the same definitions, handlers, and
/// metrics.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: RwLock::new(HashMap::new()),
                definitions: Mutex::new(HashMap::new()),
                key_locks: Mutex::new(HashMap::new()),
                failed: Mutex::new(VecDeque::new()),
                metrics: SchedulerMetrics::default(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Register the consumer for a queue. Jobs fired for a queue with no
    /// handler are dropped with a warning.
    pub fn process<F, Fut>(&self, queue: &str, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.inner
            .handlers
            .write()
            .unwrap()
            .insert(queue.to_string(), handler);
        info!(queue = %queue, "queue handler registered");
    }

    /// Install or replace the repeating definition for `dedup_key`. The old
    /// ticker (if any) is aborted first, so exactly one active definition
    /// exists per key. The first occurrence fires immediately.
    pub fn schedule_repeating(
        &self,
        queue: &str,
        dedup_key: &str,
        interval: Duration,
        payload: Value,
    ) {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            warn!(dedup_key = %dedup_key, "scheduler shut down — repeating definition ignored");
            return;
        }

        let mut definitions = self.inner.definitions.lock().unwrap();
        if let Some(old) = definitions.remove(dedup_key) {
            old.ticker.abort();
            info!(dedup_key = %dedup_key, "repeating definition replaced");
        } else {
            info!(
                dedup_key = %dedup_key,
                queue = %queue,
                interval_ms = interval.as_millis() as u64,
                "repeating definition installed"
            );
        }

        let inner = Arc::clone(&self.inner);
        let job = Job {
            queue: queue.to_string(),
            dedup_key: Some(dedup_key.to_string()),
            payload,
            attempt: 0,
        };

        let ticker = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if inner.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                inner.metrics.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
                let occurrence = job.clone();
                let inner = Arc::clone(&inner);
                // Executions are detached from the ticker so stopping a
                // definition never cancels an in-flight run.
                tokio::spawn(async move {
                    run_job(inner, occurrence).await;
                });
            }
        });

        definitions.insert(
            dedup_key.to_string(),
            RepeatingEntry {
                queue: queue.to_string(),
                interval,
                ticker,
            },
        );
    }

    /// Remove the repeating definition; in-flight executions complete.
    pub fn stop_repeating(&self, dedup_key: &str) {
        let mut definitions = self.inner.definitions.lock().unwrap();
        if let Some(entry) = definitions.remove(dedup_key) {
            entry.ticker.abort();
            info!(dedup_key = %dedup_key, queue = %entry.queue, "repeating definition removed");
        }
    }

    /// Fire a single job immediately (no dedup key — runs concurrently with
    /// everything).
    pub fn enqueue_once(&self, queue: &str, payload: Value) {
        self.spawn_once(queue, None, payload);
    }

    /// Fire a single job immediately, serialized with other occurrences of
    /// the same dedup key.
    pub fn enqueue_once_keyed(&self, queue: &str, dedup_key: &str, payload: Value) {
        self.spawn_once(queue, Some(dedup_key.to_string()), payload);
    }

    fn spawn_once(&self, queue: &str, dedup_key: Option<String>, payload: Value) {
        self.inner
            .metrics
            .jobs_enqueued
            .fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let job = Job {
            queue: queue.to_string(),
            dedup_key,
            payload,
            attempt: 0,
        };
        tokio::spawn(async move {
            run_job(inner, job).await;
        });
    }

    /// Stop all repeating tickers. In-flight jobs finish on their own; all
    /// persistence they perform is idempotent, so abandoning the process
    /// afterwards is safe.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        let mut definitions = self.inner.definitions.lock().unwrap();
        for (key, entry) in definitions.drain() {
            entry.ticker.abort();
            debug!(dedup_key = %key, "repeating definition stopped on shutdown");
        }
        info!("scheduler shut down");
    }

    pub fn active_repeating(&self) -> usize {
        self.inner.definitions.lock().unwrap().len()
    }

    pub fn has_repeating(&self, dedup_key: &str) -> bool {
        self.inner
            .definitions
            .lock()
            .unwrap()
            .contains_key(dedup_key)
    }

    /// Interval of an installed definition (diagnostics).
    pub fn repeating_interval(&self, dedup_key: &str) -> Option<Duration> {
        self.inner
            .definitions
            .lock()
            .unwrap()
            .get(dedup_key)
            .map(|e| e.interval)
    }

    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.inner.failed.lock().unwrap().iter().cloned().collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let active = self.active_repeating();
        let failed = self.inner.failed.lock().unwrap().len();
        self.inner.metrics.snapshot(active, failed)
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        self.inner.key_locks.lock().unwrap().len()
    }
}

async fn run_job(inner: Arc<Inner>, mut job: Job) {
    let handler = {
        let handlers = inner.handlers.read().unwrap();
        handlers.get(&job.queue).cloned()
    };
    let Some(handler) = handler else {
        warn!(queue = %job.queue, "no handler registered — job dropped");
        return;
    };

    // Per-key single concurrency: hold the key's mutex for the whole
    // attempt/retry cycle.
    let guard = match &job.dedup_key {
        Some(key) => {
            let lock = {
                let mut locks = inner.key_locks.lock().unwrap();
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            };
            Some(lock.lock_owned().await)
        }
        None => None,
    };

    loop {
        match handler(job.clone()).await {
            Ok(()) => {
                inner.metrics.jobs_executed.fetch_add(1, Ordering::Relaxed);
                break;
            }
            Err(JobError::Fatal(error)) => {
                warn!(queue = %job.queue, error = %error, "job failed fatally — not retried");
                record_failure(&inner, &job, job.attempt + 1, error);
                break;
            }
            Err(JobError::Retryable(error)) => {
                let next_attempt = job.attempt + 1;
                if next_attempt >= inner.config.retry.max_attempts {
                    warn!(
                        queue = %job.queue,
                        attempts = next_attempt,
                        error = %error,
                        "job retries exhausted — dropped to failed list"
                    );
                    record_failure(&inner, &job, next_attempt, error);
                    break;
                }
                let delay = inner.config.retry.delay_for_attempt(job.attempt);
                warn!(
                    queue = %job.queue,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "job failed — retrying"
                );
                inner.metrics.jobs_retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
                job.attempt = next_attempt;
            }
        }
    }

    drop(guard);
    if let Some(key) = &job.dedup_key {
        release_key_lock(&inner, key);
    }
}

/// Drop a key's mutex from the map once nothing holds or waits on it, so
/// one-shot dedup keys do not accumulate. Clone-from-map and eviction both
/// run under the map lock, so a waiter that already cloned the Arc keeps
/// the strong count above 1 and the entry alive.
fn release_key_lock(inner: &Inner, key: &str) {
    let mut locks = inner.key_locks.lock().unwrap();
    if let Some(lock) = locks.get(key) {
        if Arc::strong_count(lock) == 1 {
            locks.remove(key);
        }
    }
}

fn record_failure(inner: &Inner, job: &Job, attempts: u32, error: String) {
    inner.metrics.jobs_failed.fetch_add(1, Ordering::Relaxed);
    let mut failed = inner.failed.lock().unwrap();
    if failed.len() >= inner.config.failed_job_capacity {
        failed.pop_front();
    }
    failed.push_back(FailedJob {
        queue: job.queue.clone(),
        dedup_key: job.dedup_key.clone(),
        payload: job.payload.clone(),
        attempts,
        error,
        failed_at: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use adflux_core::BackoffStrategy;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, AtomicU64};

    fn fast_retry(max_attempts: u32) -> SchedulerConfig {
        SchedulerConfig {
            retry: RetryPolicy {
                max_attempts,
                backoff_base_ms: 1,
                strategy: BackoffStrategy::Exponential,
            },
            failed_job_capacity: 100,
        }
    }

    #[tokio::test]
    async fn test_schedule_repeating_replaces_on_same_key() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let seen = hits.clone();
        scheduler.process("poll", move |job: Job| {
            let seen = seen.clone();
            async move {
                seen.lock()
                    .unwrap()
                    .push(job.payload["tag"].as_str().unwrap_or("?").to_string());
                Ok(())
            }
        });

        scheduler.schedule_repeating("poll", "tenant-1", Duration::from_millis(40), json!({"tag": "a"}));
        scheduler.schedule_repeating("poll", "tenant-1", Duration::from_millis(40), json!({"tag": "b"}));

        assert_eq!(scheduler.active_repeating(), 1);
        assert!(scheduler.has_repeating("tenant-1"));

        tokio::time::sleep(Duration::from_millis(220)).await;
        scheduler.shutdown();

        let seen = hits.lock().unwrap();
        let a_count = seen.iter().filter(|t| *t == "a").count();
        let b_count = seen.iter().filter(|t| *t == "b").count();
        // The replaced definition fired at most its immediate first tick.
        assert!(a_count <= 1, "replaced definition kept firing: {a_count}");
        assert!(b_count >= 2, "replacement never fired: {b_count}");
    }

    #[tokio::test]
    async fn test_stop_repeating_removes_definition() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        scheduler.process("poll", move |_job| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });

        scheduler.schedule_repeating("poll", "k", Duration::from_millis(30), json!({}));
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop_repeating("k");
        assert_eq!(scheduler.active_repeating(), 0);

        let after_stop = count.load(Ordering::Relaxed);
        assert!(after_stop >= 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
    }

    #[tokio::test]
    async fn test_same_key_occurrences_never_overlap() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());
        let current = Arc::new(AtomicI64::new(0));
        let max_seen = Arc::new(AtomicI64::new(0));

        let (cur, max) = (current.clone(), max_seen.clone());
        scheduler.process("work", move |_job| {
            let (cur, max) = (cur.clone(), max.clone());
            async move {
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(25)).await;
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });

        for _ in 0..3 {
            scheduler.enqueue_once_keyed("work", "same", json!({}));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(scheduler.metrics().jobs_executed, 3);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());
        let current = Arc::new(AtomicI64::new(0));
        let max_seen = Arc::new(AtomicI64::new(0));

        let (cur, max) = (current.clone(), max_seen.clone());
        scheduler.process("work", move |_job| {
            let (cur, max) = (cur.clone(), max.clone());
            async move {
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });

        scheduler.enqueue_once_keyed("work", "k1", json!({}));
        scheduler.enqueue_once_keyed("work", "k2", json!({}));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(max_seen.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_attempts() {
        let scheduler = JobScheduler::new(fast_retry(3));
        let runs = Arc::new(AtomicU64::new(0));

        let r = runs.clone();
        scheduler.process("flaky", move |_job| {
            let r = r.clone();
            async move {
                r.fetch_add(1, Ordering::Relaxed);
                Err(JobError::Retryable("still broken".into()))
            }
        });

        scheduler.enqueue_once("flaky", json!({"id": 7}));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::Relaxed), 3);
        let snapshot = scheduler.metrics();
        assert_eq!(snapshot.jobs_executed, 0);
        assert_eq!(snapshot.jobs_retried, 2);
        assert_eq!(snapshot.jobs_failed, 1);

        let failed = scheduler.failed_jobs();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 3);
        assert_eq!(failed[0].payload["id"], 7);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_never_retried() {
        let scheduler = JobScheduler::new(fast_retry(5));
        let runs = Arc::new(AtomicU64::new(0));

        let r = runs.clone();
        scheduler.process("broken", move |_job| {
            let r = r.clone();
            async move {
                r.fetch_add(1, Ordering::Relaxed);
                Err(JobError::Fatal("tenant not connected".into()))
            }
        });

        scheduler.enqueue_once("broken", json!({}));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert_eq!(scheduler.metrics().jobs_retried, 0);
        assert_eq!(scheduler.failed_jobs()[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_failed_job_list_is_bounded() {
        let config = SchedulerConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                backoff_base_ms: 1,
                strategy: BackoffStrategy::Fixed,
            },
            failed_job_capacity: 2,
        };
        let scheduler = JobScheduler::new(config);

        scheduler.process("doomed", |_job| async {
            Err(JobError::Retryable("nope".into()))
        });

        for i in 0..3 {
            scheduler.enqueue_once_keyed("doomed", "serial", json!({"i": i}));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let failed = scheduler.failed_jobs();
        assert_eq!(failed.len(), 2);
        // Oldest entry evicted.
        assert_eq!(failed[0].payload["i"], 1);
        assert_eq!(failed[1].payload["i"], 2);
    }

    #[tokio::test]
    async fn test_key_locks_are_released_after_completion() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());

        scheduler.process("work", |_job| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        });

        for _ in 0..3 {
            scheduler.enqueue_once_keyed("work", "shared", json!({}));
        }
        scheduler.enqueue_once_keyed("work", "other", json!({}));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(scheduler.metrics().jobs_executed, 4);
        // No uncontended mutex lingers once its last holder finishes.
        assert_eq!(scheduler.key_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_job_without_handler_is_dropped() {
        let scheduler = JobScheduler::new(SchedulerConfig::default());
        scheduler.enqueue_once("nobody-home", json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.metrics().jobs_executed, 0);
        assert!(scheduler.failed_jobs().is_empty());
    }
}
