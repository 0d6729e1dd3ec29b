//! APK-Conf: the gateway-side description of an API
//!
//! [`ConfigGenerator`] turns a decoded API definition into an [`ApkConf`]
//! plus the side data (secrets, rate limit policies, AI limits) needed to
//! produce cluster resources from it.

pub mod filter;
pub mod generator;

use serde::Serialize;

use apk_common::kube_utils::sha1_hex;

use crate::model::{AdditionalProperty, CorsConfiguration, EnvironmentType};
use crate::ratelimit::{AiRateLimit, RateLimitPolicy, TimeUnit};

pub use filter::{Filter, Header, HeaderChanges, PolicyRef};
pub use generator::{
    ConfigGenerator, ConfigOutcome, EndpointCredentials, EndpointSecretData, GeneratedConfig,
};

/// Gateway-side API description
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkConf {
    /// API UUID
    pub id: String,
    /// API name
    pub name: String,
    /// Path the API is exposed on, without tenant prefix
    pub base_path: String,
    /// API version
    pub version: String,
    /// REST, GRAPHQL or GRPC
    #[serde(rename = "type")]
    pub type_: String,
    /// Whether this version also answers on the unversioned path
    pub default_version: bool,
    /// Whether subscriptions are validated
    pub subscription_validation: bool,
    /// Backends per stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_configurations: Option<EndpointConfigurations>,
    /// Operations
    pub operations: Vec<ApkOperation>,
    /// API-level rate limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    /// Authentication schemes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<AuthConfiguration>,
    /// CORS settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_configuration: Option<CorsConfiguration>,
    /// Free-form properties
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_properties: Vec<AdditionalProperty>,
}

/// Backends per stage
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EndpointConfigurations {
    /// Production backends
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub production: Vec<EndpointConfiguration>,
    /// Sandbox backends
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sandbox: Vec<EndpointConfiguration>,
}

impl EndpointConfigurations {
    /// Backends of one stage
    pub fn for_env(&self, env: EnvironmentType) -> &[EndpointConfiguration] {
        match env {
            EnvironmentType::Production => &self.production,
            EnvironmentType::Sandbox => &self.sandbox,
        }
    }

    fn for_env_mut(&mut self, env: EnvironmentType) -> &mut Vec<EndpointConfiguration> {
        match env {
            EnvironmentType::Production => &mut self.production,
            EnvironmentType::Sandbox => &mut self.sandbox,
        }
    }

    /// Whether there are no backends in either stage
    pub fn is_empty(&self) -> bool {
        self.production.is_empty() && self.sandbox.is_empty()
    }
}

/// One backend
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfiguration {
    /// Backend URL
    pub endpoint: String,
    /// Backend credentials reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_security: Option<EndpointSecurity>,
    /// Backend TLS certificate reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateRef>,
    /// Token based rate limit
    #[serde(rename = "aiRatelimit", skip_serializing_if = "Option::is_none")]
    pub ai_rate_limit: Option<AiRateLimitConf>,
}

/// Backend credentials reference
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSecurity {
    /// Whether credentials are sent
    pub enabled: bool,
    /// Where the credentials live
    pub security_type: SecurityType,
}

/// Secret layout of backend credentials
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum SecurityType {
    /// Basic auth
    Basic {
        /// Secret holding the credentials
        secret_name: String,
        /// Key of the username
        user_name_key: String,
        /// Key of the password
        password_key: String,
    },
    /// API key
    ApiKey {
        /// Secret holding the key
        secret_name: String,
        /// `Header` or `Query`
        #[serde(rename = "in")]
        in_: String,
        /// Key of the API key name
        api_key_name_key: String,
        /// Key of the API key value
        api_key_value_key: String,
    },
}

impl SecurityType {
    /// Secret the credentials are stored in
    pub fn secret_name(&self) -> &str {
        match self {
            Self::Basic { secret_name, .. } | Self::ApiKey { secret_name, .. } => secret_name,
        }
    }
}

/// Reference to a certificate stored in a config map
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    /// Config map name
    pub secret_name: String,
    /// Key inside the config map
    pub secret_key: String,
}

/// Token based rate limit of a backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRateLimitConf {
    /// Always true when present
    pub enabled: bool,
    /// Token limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenLimit>,
    /// Request limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestLimit>,
}

impl From<&AiRateLimit> for AiRateLimitConf {
    fn from(limit: &AiRateLimit) -> Self {
        let has_tokens = limit.prompt_token_count.is_some()
            || limit.completion_token_count.is_some()
            || limit.total_token_count.is_some();
        Self {
            enabled: true,
            token: has_tokens.then(|| TokenLimit {
                prompt_limit: limit.prompt_token_count.unwrap_or(0),
                completion_limit: limit.completion_token_count.unwrap_or(0),
                total_limit: limit.total_token_count.unwrap_or(0),
                unit: limit.time_unit,
            }),
            request: limit.request_count.map(|count| RequestLimit {
                request_limit: count,
                unit: limit.time_unit,
            }),
        }
    }
}

/// Token limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimit {
    /// Prompt tokens
    pub prompt_limit: u32,
    /// Completion tokens
    pub completion_limit: u32,
    /// Total tokens
    pub total_limit: u32,
    /// Window
    pub unit: TimeUnit,
}

/// Request limit
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLimit {
    /// Requests
    pub request_limit: u32,
    /// Window
    pub unit: TimeUnit,
}

/// One operation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkOperation {
    /// Path template
    pub target: String,
    /// HTTP verb
    pub verb: String,
    /// Whether authentication is enforced
    pub secured: bool,
    /// Required scopes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Traffic filters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    /// Operation-level rate limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_rate_limit: Option<RateLimit>,
}

/// Request-count limit referencing a named policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Requests per unit
    pub requests_per_unit: u32,
    /// Window
    pub unit: TimeUnit,
    /// Name of the policy the limit was resolved from
    #[serde(skip)]
    pub policy_name: String,
}

impl From<&RateLimitPolicy> for RateLimit {
    fn from(policy: &RateLimitPolicy) -> Self {
        Self {
            requests_per_unit: policy.requests_per_unit,
            unit: policy.unit,
            policy_name: policy.name.clone(),
        }
    }
}

/// Authentication scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AuthType {
    /// OAuth2 bearer tokens
    OAuth2,
    /// API keys
    APIKey,
    /// Mutual TLS
    #[serde(rename = "mTLS")]
    MTls,
}

/// One authentication scheme
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfiguration {
    /// Scheme
    pub auth_type: AuthType,
    /// Whether the scheme is active
    pub enabled: bool,
    /// `mandatory` or `optional`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    /// Header carrying the credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    /// Whether the header is read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_enable: Option<bool>,
    /// Query parameter carrying the credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_param_name: Option<String>,
    /// Whether the query parameter is read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_param_enable: Option<bool>,
    /// Whether the credential is forwarded to the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_token_to_upstream: Option<bool>,
    /// Trusted client certificates (mTLS)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<CertificateRef>,
}

impl AuthConfiguration {
    fn new(auth_type: AuthType) -> Self {
        Self {
            auth_type,
            enabled: true,
            required: None,
            header_name: None,
            header_enable: None,
            query_param_name: None,
            query_param_enable: None,
            send_token_to_upstream: None,
            certificates: Vec::new(),
        }
    }
}

// =============================================================================
// Resource naming
// =============================================================================

/// Base name of every cluster resource belonging to an API
pub fn resource_base_name(organization: &str, name: &str, version: &str) -> String {
    sha1_hex(&[organization, name, version])
}

/// Secret holding the credentials of the `index`th backend of a stage
pub fn endpoint_secret_name(base: &str, env: EnvironmentType, index: usize) -> String {
    format!("{}-{}-secret-{}", base, env, index)
}

/// Config map holding backend certificates
pub fn endpoint_cert_config_map_name(base: &str) -> String {
    format!("{}-endpoint-certs", base)
}

/// Config map holding client certificates
pub fn client_cert_config_map_name(base: &str) -> String {
    format!("{}-client-certs", base)
}

/// Config map key of a certificate alias
pub fn cert_key(alias: &str) -> String {
    let key: String = alias
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.crt", key)
}
