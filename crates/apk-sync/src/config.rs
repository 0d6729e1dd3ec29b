//! Agent configuration
//!
//! Loaded from a YAML file. The control plane password may be supplied
//! through `APIM_CP_PASSWORD` instead of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use apk_common::{Error, Result, DEFAULT_NAMESPACE};

use crate::fetch::pool::WorkerPoolConfig;
use crate::ratelimit::{default_policies, RateLimitCatalog, RateLimitPolicy};

/// Environment variable overriding `controlPlane.password`
pub const PASSWORD_ENV: &str = "APIM_CP_PASSWORD";

/// Root configuration document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Control plane connection
    pub control_plane: ControlPlaneConfig,
    /// Agent process settings
    #[serde(default)]
    pub agent: AgentSettings,
    /// Data plane (cluster) settings
    #[serde(default)]
    pub data_plane: DataPlaneConfig,
    /// Named request-count policies APIs may reference
    #[serde(default = "default_policies")]
    pub rate_limit_policies: Vec<RateLimitPolicy>,
}

/// Control plane connection settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Base URL, e.g. `https://apim:9443`
    pub service_url: String,
    /// Basic auth username
    pub username: String,
    /// Basic auth password
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Gateway environment labels this agent serves
    #[serde(default = "default_environment_labels")]
    pub environment_labels: Vec<String>,
    /// Accept any server certificate
    #[serde(default)]
    pub skip_ssl_verification: bool,
    /// Seconds before the first fetch retry
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    /// Upper bound in seconds for the fetch retry backoff
    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval: u64,
    /// HTTP client settings
    #[serde(default)]
    pub http_client: HttpClientConfig,
    /// Fetch worker pool settings
    #[serde(default)]
    pub request_worker_pool: WorkerPoolConfig,
}

impl ControlPlaneConfig {
    /// Initial fetch retry delay
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }

    /// Maximum fetch retry delay
    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_secs(self.max_retry_interval)
    }
}

fn default_environment_labels() -> Vec<String> {
    vec!["Default".to_string()]
}

fn default_retry_interval() -> u64 {
    5
}

fn default_max_retry_interval() -> u64 {
    60
}

/// HTTP client settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpClientConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

impl HttpClientConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Agent process settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// Extra CA certificates trusted for control plane TLS
    #[serde(default)]
    pub trust_store: TrustStoreConfig,
}

/// Trust store location
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustStoreConfig {
    /// PEM bundle path
    #[serde(default)]
    pub location: Option<PathBuf>,
}

/// Data plane (cluster) settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneConfig {
    /// Namespace resources are applied into
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Config deployer endpoint; local generation is used when unset
    #[serde(default)]
    pub k8s_resource_endpoint: Option<String>,
    /// Gateway the generated routes attach to
    #[serde(default = "default_gateway_name")]
    pub gateway_name: String,
    /// Seconds between full resyncs in `run` mode
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u64,
    /// Kubeconfig path; in-cluster or default config when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

impl Default for DataPlaneConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            k8s_resource_endpoint: None,
            gateway_name: default_gateway_name(),
            resync_interval: default_resync_interval(),
            kubeconfig: None,
        }
    }
}

impl DataPlaneConfig {
    /// Resync interval as a duration
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval)
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_gateway_name() -> String {
    "wso2-apk-default".to_string()
}

fn default_resync_interval() -> u64 {
    300
}

impl AgentConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&yaml)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from the environment
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.control_plane.password = password;
        }
    }

    /// Check the invariants the rest of the agent relies on
    pub fn validate(&self) -> Result<()> {
        let cp = &self.control_plane;
        if cp.service_url.trim().is_empty() {
            return Err(Error::config_for_field(
                "controlPlane.serviceUrl",
                "must not be empty",
            ));
        }
        if !(cp.service_url.starts_with("http://") || cp.service_url.starts_with("https://")) {
            return Err(Error::config_for_field(
                "controlPlane.serviceUrl",
                "must be an http or https URL",
            ));
        }
        if cp.environment_labels.iter().all(|l| l.trim().is_empty()) {
            return Err(Error::config_for_field(
                "controlPlane.environmentLabels",
                "at least one environment label is required",
            ));
        }
        if cp.retry_interval == 0 {
            return Err(Error::config_for_field(
                "controlPlane.retryInterval",
                "must be at least one second",
            ));
        }
        if cp.http_client.request_timeout == 0 {
            return Err(Error::config_for_field(
                "controlPlane.httpClient.requestTimeout",
                "must be at least one second",
            ));
        }
        if cp.request_worker_pool.pool_size == 0 {
            return Err(Error::config_for_field(
                "controlPlane.requestWorkerPool.poolSize",
                "must be at least 1",
            ));
        }
        if cp.request_worker_pool.queue_size_per_pool == 0 {
            return Err(Error::config_for_field(
                "controlPlane.requestWorkerPool.queueSizePerPool",
                "must be at least 1",
            ));
        }
        if self.data_plane.namespace.trim().is_empty() {
            return Err(Error::config_for_field(
                "dataPlane.namespace",
                "must not be empty",
            ));
        }
        if let Some(endpoint) = &self.data_plane.k8s_resource_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::config_for_field(
                    "dataPlane.k8sResourceEndpoint",
                    "must be an http or https URL",
                ));
            }
        }
        Ok(())
    }

    /// Environment labels with blanks removed
    pub fn environment_labels(&self) -> Vec<String> {
        self.control_plane
            .environment_labels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Rate limit catalog built from the configured policies
    pub fn rate_limit_catalog(&self) -> RateLimitCatalog {
        RateLimitCatalog::new(self.rate_limit_policies.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::TimeUnit;

    const MINIMAL: &str = r#"
controlPlane:
  serviceUrl: https://apim.example.com:9443
  username: admin
  password: admin
"#;

    #[test]
    fn story_minimal_config_gets_defaults() {
        let config = AgentConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.control_plane.environment_labels, vec!["Default"]);
        assert_eq!(config.control_plane.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.control_plane.max_retry_interval(), Duration::from_secs(60));
        assert_eq!(
            config.control_plane.http_client.request_timeout(),
            Duration::from_secs(30)
        );
        assert_eq!(config.control_plane.request_worker_pool.pool_size, 4);
        assert_eq!(config.data_plane.namespace, "apk");
        assert!(config.data_plane.k8s_resource_endpoint.is_none());
        assert_eq!(config.rate_limit_catalog().len(), 3);
        assert!(config.agent.trust_store.location.is_none());
    }

    #[test]
    fn story_full_config_round_trips_every_section() {
        let yaml = r#"
controlPlane:
  serviceUrl: https://apim:9443
  username: admin
  environmentLabels: [Default, " ", Internal]
  skipSslVerification: true
  retryInterval: 2
  maxRetryInterval: 30
  httpClient:
    requestTimeout: 10
  requestWorkerPool:
    poolSize: 2
    queueSizePerPool: 50
    pauseTimeAfterFailure: 3
agent:
  trustStore:
    location: /etc/apk/ca.pem
dataPlane:
  namespace: gateways
  k8sResourceEndpoint: https://config-deployer:9443/api/configurator/1.2.0/apis/generate-k8s-resources
  gatewayName: edge
  resyncInterval: 60
rateLimitPolicies:
  - name: Gold
    requestsPerUnit: 5000
    unit: min
"#;
        let config = AgentConfig::from_yaml_str(yaml).unwrap();
        assert!(config.control_plane.skip_ssl_verification);
        assert_eq!(config.environment_labels(), vec!["Default", "Internal"]);
        assert_eq!(config.control_plane.request_worker_pool.queue_size_per_pool, 50);
        assert_eq!(
            config.agent.trust_store.location,
            Some(PathBuf::from("/etc/apk/ca.pem"))
        );
        assert_eq!(config.data_plane.namespace, "gateways");
        assert_eq!(config.data_plane.gateway_name, "edge");
        assert_eq!(config.data_plane.resync_interval(), Duration::from_secs(60));

        let catalog = config.rate_limit_catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Gold").unwrap().unit, TimeUnit::Minute);
    }

    #[test]
    fn test_password_env_override() {
        let mut config = AgentConfig::from_yaml_str(MINIMAL).unwrap();
        config.apply_env_overrides(|key| {
            (key == PASSWORD_ENV).then(|| "from-env".to_string())
        });
        assert_eq!(config.control_plane.password, "from-env");

        // Empty values do not clobber the file
        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config.control_plane.password, "from-env");
    }

    fn field_of(err: Error) -> Option<String> {
        match err {
            Error::Config { field, .. } => field,
            other => panic!("Expected Config variant, got {other:?}"),
        }
    }

    #[test]
    fn story_validation_names_the_offending_key() {
        let yaml = MINIMAL.replace("https://apim.example.com:9443", "apim:9443");
        let err = AgentConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(field_of(err).as_deref(), Some("controlPlane.serviceUrl"));

        let yaml = format!("{}  environmentLabels: []\n", MINIMAL);
        let err = AgentConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(
            field_of(err).as_deref(),
            Some("controlPlane.environmentLabels")
        );

        let yaml = format!("{}dataPlane:\n  namespace: \"\"\n", MINIMAL);
        let err = AgentConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(field_of(err).as_deref(), Some("dataPlane.namespace"));

        let yaml = format!(
            "{}dataPlane:\n  k8sResourceEndpoint: config-deployer:9443\n",
            MINIMAL
        );
        let err = AgentConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(
            field_of(err).as_deref(),
            Some("dataPlane.k8sResourceEndpoint")
        );
    }

    #[test]
    fn test_unparseable_yaml_is_config_error() {
        let err = AgentConfig::from_yaml_str("controlPlane: [").unwrap_err();
        assert!(matches!(err, Error::Config { field: None, .. }));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.control_plane.username, "admin");

        let err = AgentConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
