//! The reconciliation cycle
//!
//! One cycle fetches the artifact bundle for the configured environment
//! labels and walks its deployments in order:
//!
//! ```text
//! fetch -> unpack -> deployments.json -> per deployment:
//!     lookup -> decode -> generate config -> generate resources -> tag -> apply
//! ```
//!
//! Fetch and unpack failures end the cycle. A failure at any later stage
//! skips that deployment only and is recorded in the [`CycleReport`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use apk_common::{Error, Result};

use crate::apkconf::ConfigGenerator;
use crate::archive::{ArtifactBundle, Deployment};
use crate::artifact::decode_api_artifact;
use crate::cluster::ClusterClient;
use crate::fetch::{FetchClient, FetchOutcome, FetchRequest};
use crate::model::EnvironmentType;
use crate::ratelimit::ai_policy_name;
use crate::resources::{tag_resources, CertContainer, Placement, ResourceGenerator};

/// Stage at which a deployment was abandoned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The bundle has no member named by the deployment
    LookupMiss,
    /// The API's zip could not be decoded
    DecodeFailed,
    /// APK-Conf generation failed
    ConfigFailed,
    /// Resource generation failed
    ResourceFailed,
    /// The cluster rejected the resources
    ApplyFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LookupMiss => "lookup_miss",
            Self::DecodeFailed => "decode_failed",
            Self::ConfigFailed => "config_failed",
            Self::ResourceFailed => "resource_failed",
            Self::ApplyFailed => "apply_failed",
        };
        f.write_str(s)
    }
}

/// A deployment that was not applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedDeployment {
    /// Bundle member named by the deployment
    pub api_file: String,
    /// Where processing stopped
    pub reason: SkipReason,
    /// Error text, when there was one
    pub error: Option<String>,
}

/// Outcome of one cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// UUIDs of applied APIs, in deployment order
    pub applied: Vec<String>,
    /// Deployments that were skipped
    pub skipped: Vec<SkippedDeployment>,
}

impl CycleReport {
    /// Whether nothing was applied or skipped
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.skipped.is_empty()
    }
}

/// Drives fetch-to-apply cycles
pub struct Synchronizer {
    fetch: FetchClient,
    config_generator: ConfigGenerator,
    resources: Arc<dyn ResourceGenerator>,
    cluster: Arc<dyn ClusterClient>,
    namespace: String,
    environment_labels: Vec<String>,
}

impl Synchronizer {
    /// Wire the pipeline from its collaborators
    pub fn new(
        fetch: FetchClient,
        config_generator: ConfigGenerator,
        resources: Arc<dyn ResourceGenerator>,
        cluster: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        environment_labels: Vec<String>,
    ) -> Self {
        Self {
            fetch,
            config_generator,
            resources,
            cluster,
            namespace: namespace.into(),
            environment_labels,
        }
    }

    /// Run one cycle for every API, or for `api_id` only.
    ///
    /// Returns the UUIDs of applied APIs alongside the skipped deployments.
    /// Errors only when the fetch is rejected or the bundle is unusable.
    pub async fn fetch_apis_on_event(&self, api_id: Option<&str>) -> Result<CycleReport> {
        let request = FetchRequest::runtime_artifacts(
            api_id.map(str::to_string),
            self.environment_labels.clone(),
        );
        debug!(api_id = ?api_id, labels = ?self.environment_labels, "starting fetch cycle");

        let report = match self.fetch.fetch(&request).await? {
            FetchOutcome::Empty => {
                info!(
                    environments = %self.environment_labels.join(", "),
                    "no API artifacts available in the control plane"
                );
                CycleReport::default()
            }
            FetchOutcome::Artifacts(bytes) => self.process_bundle(bytes).await?,
        };

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "fetch cycle completed"
        );
        Ok(report)
    }

    /// Process an already fetched artifact bundle
    pub async fn process_bundle(&self, bytes: Vec<u8>) -> Result<CycleReport> {
        let mut bundle = ArtifactBundle::open(bytes)?;
        let descriptor = bundle.deployment_descriptor()?;

        let mut report = CycleReport::default();
        for deployment in descriptor.deployments() {
            match self.process_deployment(&mut bundle, deployment).await {
                Ok(api_uuid) => report.applied.push(api_uuid),
                Err((reason, err)) => {
                    match (&reason, &err) {
                        (SkipReason::LookupMiss, _) => warn!(
                            api_file = %deployment.api_file,
                            "API file listed in deployments.json is missing from the bundle"
                        ),
                        (_, Some(e)) => error!(
                            api_file = %deployment.api_file,
                            reason = %reason,
                            error = %e,
                            "skipping deployment"
                        ),
                        (_, None) => {}
                    }
                    report.skipped.push(SkippedDeployment {
                        api_file: deployment.api_file.clone(),
                        reason,
                        error: err.map(|e| e.to_string()),
                    });
                }
            }
        }
        Ok(report)
    }

    async fn process_deployment(
        &self,
        bundle: &mut ArtifactBundle,
        deployment: &Deployment,
    ) -> std::result::Result<String, (SkipReason, Option<Error>)> {
        let bytes = match bundle.read_member(&deployment.api_file) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err((SkipReason::LookupMiss, None)),
            Err(e) => return Err((SkipReason::DecodeFailed, Some(e))),
        };
        let artifact = decode_api_artifact(&deployment.api_file, &bytes)
            .map_err(|e| (SkipReason::DecodeFailed, Some(e)))?;

        let outcome = self.config_generator.generate(
            &artifact.api,
            &artifact.certs,
            &artifact.endpoints,
            &deployment.organization_id,
        );

        // Stages without an AI limit must not keep a stale policy, whether
        // or not generation succeeded
        for env in EnvironmentType::ALL {
            if outcome.ai_rate_limit(env).is_none() {
                let name = ai_policy_name(&outcome.api.name, &outcome.api.version, env);
                if let Err(e) = self
                    .cluster
                    .delete_ai_rate_limit_policy(&name, &self.namespace)
                    .await
                {
                    warn!(
                        api = %outcome.api,
                        environment = %env,
                        policy = %name,
                        error = %e,
                        "failed to delete AI rate limit policy"
                    );
                }
            }
        }

        let config = outcome
            .config
            .map_err(|e| (SkipReason::ConfigFailed, Some(e)))?;
        debug!(api = %config.api, api_uuid = %config.api_uuid, "generated APK configuration");

        let certs = CertContainer::new(&artifact.certs, &config.base_name);
        let mut resources = self
            .resources
            .generate(&config, artifact.schema.clone(), &certs)
            .await
            .map_err(|e| (SkipReason::ResourceFailed, Some(e)))?;

        let revision_id = deployment
            .revision_id
            .clone()
            .unwrap_or_else(|| config.revision_id.to_string());
        tag_resources(
            &mut resources,
            Placement {
                namespace: self.namespace.clone(),
                organization: deployment.organization_id.clone(),
                environments: deployment.environments.clone(),
                api_uuid: config.api_uuid.clone(),
                revision_id,
            },
            &config.rate_limit_policies,
        );

        let applied = self
            .cluster
            .apply(&resources)
            .await
            .map_err(|e| (SkipReason::ApplyFailed, Some(e)))?;
        info!(
            api = %config.api,
            api_uuid = %config.api_uuid,
            resources = applied,
            routes = resources.of_kind("HTTPRoute").count(),
            "API applied successfully"
        );
        Ok(config.api_uuid)
    }
}
