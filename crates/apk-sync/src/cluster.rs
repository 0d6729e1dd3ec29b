//! Applying resource sets to the cluster

use async_trait::async_trait;
use kube::api::PatchParams;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use apk_common::kube_utils::{apply_objects_ordered, delete_if_exists, HasApiResource};
use apk_common::retry::{retry_with_backoff, RetryConfig};
use apk_common::{Result, FIELD_MANAGER};

use crate::resources::types::AiRateLimitPolicyResource;
use crate::resources::ResourceSet;

/// Attempts made for one apply before the API is skipped
pub const APPLY_ATTEMPTS: u32 = 3;

/// Trait abstracting cluster writes for testability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Server-side apply every resource of the set, returning the count
    async fn apply(&self, resources: &ResourceSet) -> Result<usize>;

    /// Delete an AI rate limit policy; `Ok(false)` when it did not exist
    async fn delete_ai_rate_limit_policy(&self, name: &str, namespace: &str) -> Result<bool>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
    default_namespace: String,
    retry: RetryConfig,
}

impl KubeClusterClient {
    /// Wrap a kube client; untagged sets are applied to `default_namespace`
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
            retry: RetryConfig::with_max_attempts(APPLY_ATTEMPTS),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn apply(&self, resources: &ResourceSet) -> Result<usize> {
        let namespace = resources.namespace().unwrap_or(&self.default_namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let applied = retry_with_backoff(
            &self.retry,
            "apply_resources",
            |e: &apk_common::Error| e.is_retryable(),
            || apply_objects_ordered(&self.client, namespace, &resources.resources, &params),
        )
        .await?;

        debug!(namespace = %namespace, applied, "applied resource set");
        Ok(applied)
    }

    async fn delete_ai_rate_limit_policy(&self, name: &str, namespace: &str) -> Result<bool> {
        let ar = AiRateLimitPolicyResource::api_resource();
        let deleted = delete_if_exists(&self.client, &ar, name, namespace).await?;
        if deleted {
            info!(name = %name, namespace = %namespace, "deleted AI rate limit policy");
        }
        Ok(deleted)
    }
}
