//! Fetching deployment artifacts from the control plane
//!
//! Requests go through a [`RequestWorkerPool`]; each submitted request gets
//! exactly one [`SyncResponse`] back. [`FetchClient`] layers the retry policy
//! on top: 4xx responses end the cycle, everything else is retried with
//! backoff until the control plane answers.

pub mod http;
pub mod pool;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info, warn};

use apk_common::retry::{retry_with_backoff, RetryConfig};
use apk_common::telemetry::Severity;
use apk_common::{Error, Result};

pub use pool::{RequestWorkerPool, WorkerPoolConfig};

/// Control plane endpoint serving deployment artifacts
pub const RUNTIME_ARTIFACTS_ENDPOINT: &str = "runtime-artifacts";

/// Status the control plane uses for "nothing deployed"
pub const NO_CONTENT: u16 = 204;

/// Error code logged when the control plane rejects a request
pub const ERROR_CODE_FETCH_REJECTED: u32 = 1106;

/// Error code logged when a fetch fails and will be retried
pub const ERROR_CODE_FETCH_RETRYING: u32 = 1107;

/// One fetch request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Restrict the fetch to one API; all APIs when `None`
    pub api_id: Option<String>,
    /// Gateway environment labels to fetch for
    pub environment_labels: Vec<String>,
    /// Endpoint path below `/api/am/gateway/v2/`
    pub endpoint: String,
    /// Ask for APK resource types (`type=APK`)
    pub include_resource_types: bool,
}

impl FetchRequest {
    /// Request the runtime artifacts for the given labels
    pub fn runtime_artifacts(api_id: Option<String>, environment_labels: Vec<String>) -> Self {
        Self {
            api_id,
            environment_labels,
            endpoint: RUNTIME_ARTIFACTS_ENDPOINT.to_string(),
            include_resource_types: true,
        }
    }
}

/// Outcome of a single request to the control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncResponse {
    /// Non-empty artifact bundle
    Found(Vec<u8>),
    /// The control plane answered but had nothing to send
    NotFound,
    /// The request failed; `code` is the HTTP status or 0 when there was none
    Error {
        /// HTTP status, 0 for transport failures
        code: u16,
        /// Error description
        message: String,
    },
}

impl SyncResponse {
    /// Whether the worker should pause before taking the next job
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error { code, .. } if *code != NO_CONTENT)
    }
}

/// Transport to the control plane
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlaneTransport: Send + Sync {
    /// Perform one request; never retries
    async fn fetch(&self, request: &FetchRequest) -> SyncResponse;
}

/// Result of a fetch after retries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Artifact bundle bytes
    Artifacts(Vec<u8>),
    /// Nothing deployed for the requested labels
    Empty,
}

/// Retrying client over the worker pool
pub struct FetchClient {
    pool: Arc<RequestWorkerPool>,
    retry: RetryConfig,
}

impl FetchClient {
    /// Create a client submitting through `pool`
    pub fn new(pool: Arc<RequestWorkerPool>, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    /// Submit one request and wait for its response
    pub async fn fetch_once(&self, request: FetchRequest) -> Result<SyncResponse> {
        if request.environment_labels.is_empty() {
            return Err(Error::config_for_field(
                "controlPlane.environmentLabels",
                "at least one environment label is required to fetch artifacts",
            ));
        }
        let reply = self.pool.submit(request).await?;
        reply.await.map_err(|_| {
            Error::internal_with_context("fetch", "worker dropped the request without answering")
        })
    }

    /// Fetch artifacts, retrying until the control plane gives a usable answer.
    ///
    /// Returns [`FetchOutcome::Empty`] for empty bodies and 204. A 4xx ends
    /// the attempt with [`Error::FetchUnrecoverable`]. Every other failure is
    /// retried with a fresh job and reply channel.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        retry_with_backoff(
            &self.retry,
            "fetch_artifacts",
            |e: &Error| matches!(e, Error::FetchRecoverable { .. }),
            || self.attempt(request.clone()),
        )
        .await
    }

    async fn attempt(&self, request: FetchRequest) -> Result<FetchOutcome> {
        let api_id = request.api_id.clone().unwrap_or_default();
        match self.fetch_once(request).await? {
            SyncResponse::Found(bytes) => {
                debug!(api_id = %api_id, bytes = bytes.len(), "fetched artifact bundle");
                Ok(FetchOutcome::Artifacts(bytes))
            }
            SyncResponse::NotFound => {
                info!(api_id = %api_id, "control plane returned no artifacts");
                Ok(FetchOutcome::Empty)
            }
            SyncResponse::Error { code: NO_CONTENT, .. } => {
                info!(api_id = %api_id, "no APIs deployed for the configured environments");
                Ok(FetchOutcome::Empty)
            }
            SyncResponse::Error { code, message } => {
                let err = Error::fetch(code, message);
                if err.is_retryable() {
                    warn!(
                        severity = %Severity::Minor,
                        error_code = ERROR_CODE_FETCH_RETRYING,
                        status = code,
                        api_id = %api_id,
                        error = %err,
                        "failed to fetch artifacts from control plane, retrying"
                    );
                } else {
                    error!(
                        severity = %Severity::Critical,
                        error_code = ERROR_CODE_FETCH_REJECTED,
                        status = code,
                        api_id = %api_id,
                        error = %err,
                        "control plane rejected the artifact request"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    fn pool_config() -> WorkerPoolConfig {
        WorkerPoolConfig {
            pool_size: 2,
            queue_size_per_pool: 8,
            pause_time_after_failure: 0,
        }
    }

    fn client_with(transport: MockControlPlaneTransport) -> FetchClient {
        let pool = RequestWorkerPool::start(&pool_config(), Arc::new(transport));
        FetchClient::new(Arc::new(pool), fast_retry())
    }

    fn request() -> FetchRequest {
        FetchRequest::runtime_artifacts(None, vec!["Default".to_string()])
    }

    // ==========================================================================
    // Successful fetches
    // ==========================================================================

    #[tokio::test]
    async fn story_found_bundle_is_returned() {
        let mut transport = MockControlPlaneTransport::new();
        transport
            .expect_fetch()
            .times(1)
            .returning(|_| SyncResponse::Found(vec![1, 2, 3]));

        let outcome = client_with(transport).fetch(&request()).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Artifacts(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn story_no_content_and_empty_body_mean_nothing_deployed() {
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().times(1).returning(|_| SyncResponse::Error {
            code: NO_CONTENT,
            message: String::new(),
        });
        assert_eq!(
            client_with(transport).fetch(&request()).await.unwrap(),
            FetchOutcome::Empty
        );

        let mut transport = MockControlPlaneTransport::new();
        transport
            .expect_fetch()
            .times(1)
            .returning(|_| SyncResponse::NotFound);
        assert_eq!(
            client_with(transport).fetch(&request()).await.unwrap(),
            FetchOutcome::Empty
        );
    }

    // ==========================================================================
    // Failure classification
    // ==========================================================================

    /// Story: a 4xx is terminal; the transport is called exactly once.
    #[tokio::test]
    async fn story_client_error_is_not_retried() {
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().times(1).returning(|_| SyncResponse::Error {
            code: 401,
            message: "unauthorized".to_string(),
        });

        let err = client_with(transport).fetch(&request()).await.unwrap_err();
        assert!(matches!(err, Error::FetchUnrecoverable { code: 401, .. }));
    }

    /// Story: 5xx and transport failures are retried until the control plane
    /// answers, each attempt as a fresh request.
    #[tokio::test]
    async fn story_server_and_transport_errors_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().times(3).returning(move |_| {
            match c.fetch_add(1, Ordering::SeqCst) {
                0 => SyncResponse::Error {
                    code: 503,
                    message: "unavailable".to_string(),
                },
                1 => SyncResponse::Error {
                    code: 0,
                    message: "connection refused".to_string(),
                },
                _ => SyncResponse::Found(b"zip".to_vec()),
            }
        });

        let outcome = client_with(transport).fetch(&request()).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Artifacts(b"zip".to_vec()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_labels_are_rejected_before_any_request() {
        let mut transport = MockControlPlaneTransport::new();
        transport.expect_fetch().never();

        let client = client_with(transport);
        let err = client
            .fetch(&FetchRequest::runtime_artifacts(None, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_request_is_passed_through_to_transport() {
        let mut transport = MockControlPlaneTransport::new();
        transport
            .expect_fetch()
            .withf(|r| {
                r.api_id.as_deref() == Some("api-1")
                    && r.endpoint == RUNTIME_ARTIFACTS_ENDPOINT
                    && r.environment_labels == vec!["Default".to_string()]
            })
            .times(1)
            .returning(|_| SyncResponse::NotFound);

        let client = client_with(transport);
        let req = FetchRequest::runtime_artifacts(Some("api-1".to_string()), vec!["Default".into()]);
        assert_eq!(client.fetch(&req).await.unwrap(), FetchOutcome::Empty);
    }

    #[test]
    fn test_no_content_is_not_a_worker_failure() {
        assert!(!SyncResponse::Error {
            code: NO_CONTENT,
            message: String::new()
        }
        .is_failure());
        assert!(SyncResponse::Error {
            code: 500,
            message: String::new()
        }
        .is_failure());
        assert!(!SyncResponse::NotFound.is_failure());
    }
}
