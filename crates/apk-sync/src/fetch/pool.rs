//! Fixed-size pool of fetch workers
//!
//! Each worker owns a bounded queue. A job carries the request and a oneshot
//! sender for its single response; the worker answers every job it takes,
//! then pauses after a failure before taking the next one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use apk_common::{Error, Result};

use super::{ControlPlaneTransport, FetchRequest, SyncResponse};

/// Worker pool sizing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolConfig {
    /// Number of workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Queue capacity per worker
    #[serde(default = "default_queue_size")]
    pub queue_size_per_pool: usize,
    /// Seconds a worker waits after a failed request
    #[serde(default = "default_pause")]
    pub pause_time_after_failure: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_size_per_pool: default_queue_size(),
            pause_time_after_failure: default_pause(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_queue_size() -> usize {
    1000
}

fn default_pause() -> u64 {
    5
}

struct Job {
    request: FetchRequest,
    reply: oneshot::Sender<SyncResponse>,
}

/// Pool of workers executing fetch requests
pub struct RequestWorkerPool {
    queues: Vec<mpsc::Sender<Job>>,
    next: AtomicUsize,
}

impl RequestWorkerPool {
    /// Spawn the workers on the current tokio runtime
    pub fn start(config: &WorkerPoolConfig, transport: Arc<dyn ControlPlaneTransport>) -> Self {
        let pause = Duration::from_secs(config.pause_time_after_failure);
        let queues = (0..config.pool_size.max(1))
            .map(|id| {
                let (tx, rx) = mpsc::channel(config.queue_size_per_pool.max(1));
                tokio::spawn(run_worker(id, rx, transport.clone(), pause));
                tx
            })
            .collect();
        Self {
            queues,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.queues.len()
    }

    /// Queue a request and return the receiver for its response.
    ///
    /// Workers are picked round robin; a full queue is skipped in favour of
    /// one with room. When every queue is full the call waits on the picked
    /// worker's queue.
    pub async fn submit(&self, request: FetchRequest) -> Result<oneshot::Receiver<SyncResponse>> {
        let (reply, rx) = oneshot::channel();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        let mut job = Job { request, reply };

        for offset in 0..self.queues.len() {
            let idx = (start + offset) % self.queues.len();
            match self.queues[idx].try_send(job) {
                Ok(()) => {
                    trace!(worker = idx, "queued fetch job");
                    return Ok(rx);
                }
                Err(mpsc::error::TrySendError::Full(j)) => job = j,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(Error::internal_with_context(
                        "worker_pool",
                        format!("worker {} has stopped", idx),
                    ))
                }
            }
        }

        debug!(worker = start, "all fetch queues full, waiting");
        self.queues[start].send(job).await.map_err(|_| {
            Error::internal_with_context("worker_pool", format!("worker {} has stopped", start))
        })?;
        Ok(rx)
    }
}

async fn run_worker(
    id: usize,
    mut jobs: mpsc::Receiver<Job>,
    transport: Arc<dyn ControlPlaneTransport>,
    pause: Duration,
) {
    while let Some(job) = jobs.recv().await {
        let response = transport.fetch(&job.request).await;
        let failed = response.is_failure();
        if job.reply.send(response).is_err() {
            debug!(worker = id, "fetch caller went away before the response");
        }
        if failed && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    trace!(worker = id, "fetch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockControlPlaneTransport;
    use std::sync::atomic::AtomicU32;

    fn config(pool_size: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            pool_size,
            queue_size_per_pool: 4,
            pause_time_after_failure: 0,
        }
    }

    fn request(id: &str) -> FetchRequest {
        FetchRequest::runtime_artifacts(Some(id.to_string()), vec!["Default".to_string()])
    }

    /// Story: every submitted job gets exactly one response, matched to its
    /// own request.
    #[tokio::test]
    async fn story_each_job_receives_its_own_response() {
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().times(6).returning(|r| {
            SyncResponse::Found(r.api_id.clone().unwrap_or_default().into_bytes())
        });
        let pool = RequestWorkerPool::start(&config(3), Arc::new(transport));
        assert_eq!(pool.size(), 3);

        let mut receivers = Vec::new();
        for i in 0..6 {
            receivers.push((i, pool.submit(request(&format!("api-{i}"))).await.unwrap()));
        }
        for (i, rx) in receivers {
            assert_eq!(
                rx.await.unwrap(),
                SyncResponse::Found(format!("api-{i}").into_bytes())
            );
        }
    }

    #[tokio::test]
    async fn test_failures_are_still_answered() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().returning(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            SyncResponse::Error {
                code: 502,
                message: "bad gateway".to_string(),
            }
        });
        let pool = RequestWorkerPool::start(&config(1), Arc::new(transport));

        let first = pool.submit(request("a")).await.unwrap();
        let second = pool.submit(request("b")).await.unwrap();
        assert!(first.await.unwrap().is_failure());
        assert!(second.await.unwrap().is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pool_config_defaults() {
        let config: WorkerPoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorkerPoolConfig::default());
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.queue_size_per_pool, 1000);
        assert_eq!(config.pause_time_after_failure, 5);
    }

    #[tokio::test]
    async fn test_zero_sized_pool_still_has_one_worker() {
        let mut transport = MockControlPlaneTransport::new();
        transport
            .expect_fetch()
            .returning(|_| SyncResponse::NotFound);
        let pool = RequestWorkerPool::start(&config(0), Arc::new(transport));
        assert_eq!(pool.size(), 1);
        let rx = pool.submit(request("a")).await.unwrap();
        assert_eq!(rx.await.unwrap(), SyncResponse::NotFound);
    }
}
