//! Bounded-parallel probe scheduling
//!
//! A fixed pool of workers drains a shared job queue. Each worker owns a
//! stable thread id (`Thread-1`, `Thread-2`, ...) that is stamped on every
//! result it produces. A probe that panics is converted into a
//! `runtime error` result for its node; the rest of the run continues.

use sourcefresh_core::FreshnessResult;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use crate::prober::{Probe, ProbeJob};

pub struct Scheduler {
    threads: usize,
    cancel: Option<watch::Receiver<bool>>,
}

impl Scheduler {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            cancel: None,
        }
    }

    /// Stop dispatching once the channel carries `true`.
    ///
    /// In-flight probes run to completion; jobs that were never dispatched
    /// get a `runtime error` result.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Number of workers used for `jobs` jobs against `probe`
    pub fn worker_count(&self, jobs: usize, probe: &dyn Probe) -> usize {
        let limit = probe
            .max_concurrency()
            .map_or(self.threads, |max| self.threads.min(max));
        limit.min(jobs).max(1)
    }

    /// Run every job, returning one result per job in completion order
    pub async fn run(&self, jobs: Vec<ProbeJob>, probe: Arc<dyn Probe>) -> Vec<FreshnessResult> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let total = jobs.len();
        let workers = self.worker_count(total, probe.as_ref());
        tracing::info!(jobs = total, workers, "Running freshness checks");

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(workers);
        for worker in 1..=workers {
            let thread_id = format!("Thread-{}", worker);
            let queue = Arc::clone(&queue);
            let probe = Arc::clone(&probe);
            let tx = tx.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if is_cancelled(&cancel) {
                        break;
                    }

                    let Some(job) = queue.lock().await.pop_front() else {
                        break;
                    };

                    let result = run_isolated(Arc::clone(&probe), job, &thread_id).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Freshness worker failed: {}", e);
            }
        }

        // Whatever is still queued was never dispatched
        let remaining: Vec<ProbeJob> = queue.lock().await.drain(..).collect();
        if !remaining.is_empty() {
            tracing::warn!(skipped = remaining.len(), "Freshness run cancelled");
            results.extend(
                remaining
                    .iter()
                    .map(|job| job.runtime_error("Thread-0", format!("Skipped {}: run was cancelled", job.unique_id))),
            );
        }

        results
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Run one probe on its own task so a panic only affects that node
async fn run_isolated(probe: Arc<dyn Probe>, job: ProbeJob, thread_id: &str) -> FreshnessResult {
    let task_job = job.clone();
    let task_thread = thread_id.to_string();
    let handle = tokio::spawn(async move { probe.probe(&task_job, &task_thread).await });

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(unique_id = %job.unique_id, "Freshness probe aborted: {}", e);
            job.runtime_error(thread_id, format!("Freshness check for {} aborted: {}", job.unique_id, e))
        }
    }
}
