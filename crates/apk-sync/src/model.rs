//! API project documents as exported by the control plane
//!
//! These mirror the files found inside a per-API artifact bundle
//! (`api.yaml`, `endpoints.yaml`, certificate descriptors). Only the fields
//! the agent consumes are modelled; everything else is ignored on decode.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment stage of an endpoint or rate limit
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnvironmentType {
    /// Production traffic
    #[serde(alias = "PRODUCTION", alias = "production")]
    Production,
    /// Sandbox traffic
    #[serde(alias = "SANDBOX", alias = "sandbox")]
    Sandbox,
}

impl EnvironmentType {
    /// Both stages, production first
    pub const ALL: [EnvironmentType; 2] = [EnvironmentType::Production, EnvironmentType::Sandbox];

    /// Lowercase tag used in names and fingerprints
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and version identifying an API in logs and cleanup keys
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiMetadata {
    /// API name
    pub name: String,
    /// API version
    pub version: String,
}

impl fmt::Display for ApiMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// `api.yaml` envelope
#[derive(Clone, Debug, Deserialize)]
pub struct ApiProject {
    /// Document type (`api`)
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Exporter version
    #[serde(default)]
    pub version: String,
    /// The API definition
    pub data: ApiDefinition,
}

/// The API definition document
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDefinition {
    /// API UUID assigned by the control plane
    #[serde(default)]
    pub id: Option<String>,
    /// API name
    pub name: String,
    /// API version
    pub version: String,
    /// Context path, possibly prefixed with `/t/<tenant>`
    #[serde(default)]
    pub context: String,
    /// API type (HTTP, GRAPHQL, GRPC, WS, ...)
    #[serde(rename = "type", default = "default_api_type")]
    pub type_: String,
    /// Whether this is the default version of the API
    #[serde(default)]
    pub is_default_version: bool,
    /// Revision deployed, when exported as part of a revision
    #[serde(default)]
    pub revision_id: Option<u32>,
    /// Security schemes (oauth2, api_key, mutualssl, ...)
    #[serde(default)]
    pub security_scheme: Vec<String>,
    /// Header carrying the OAuth2 token
    #[serde(default)]
    pub authorization_header: Option<String>,
    /// Header carrying the API key
    #[serde(default)]
    pub api_key_header: Option<String>,
    /// API-level throttling policy name
    #[serde(default)]
    pub api_throttling_policy: Option<String>,
    /// Backend endpoints
    #[serde(default)]
    pub endpoint_config: Option<EndpointConfig>,
    /// CORS settings
    #[serde(default)]
    pub cors_configuration: Option<CorsConfiguration>,
    /// Resources exposed by the API
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Free-form properties
    #[serde(default)]
    pub additional_properties: Vec<AdditionalProperty>,
    /// Backend throughput limits, including token based AI limits
    #[serde(default)]
    pub max_tps: Option<MaxTps>,
}

fn default_api_type() -> String {
    "HTTP".to_string()
}

/// Endpoint configuration block (snake_case keys as exported)
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EndpointConfig {
    /// `http`, `load_balance`, `failover`, ...
    #[serde(default)]
    pub endpoint_type: String,
    /// Production endpoint(s)
    #[serde(default)]
    pub production_endpoints: Option<EndpointList>,
    /// Sandbox endpoint(s)
    #[serde(default)]
    pub sandbox_endpoints: Option<EndpointList>,
    /// Backend credentials per stage
    #[serde(default)]
    pub endpoint_security: Option<EndpointSecurityConfig>,
}

impl EndpointConfig {
    /// Endpoint URLs for the given stage
    pub fn urls(&self, env: EnvironmentType) -> Vec<String> {
        let list = match env {
            EnvironmentType::Production => self.production_endpoints.as_ref(),
            EnvironmentType::Sandbox => self.sandbox_endpoints.as_ref(),
        };
        list.map(EndpointList::urls).unwrap_or_default()
    }

    /// Backend security for the given stage
    pub fn security(&self, env: EnvironmentType) -> Option<&SecurityConfig> {
        let security = self.endpoint_security.as_ref()?;
        match env {
            EnvironmentType::Production => security.production.as_ref(),
            EnvironmentType::Sandbox => security.sandbox.as_ref(),
        }
    }
}

/// A single endpoint or a list (load balanced / failover)
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EndpointList {
    /// One endpoint
    One(EndpointUrl),
    /// Several endpoints
    Many(Vec<EndpointUrl>),
}

impl EndpointList {
    /// Non-empty URLs in declaration order
    pub fn urls(&self) -> Vec<String> {
        let urls: Vec<&EndpointUrl> = match self {
            Self::One(u) => vec![u],
            Self::Many(list) => list.iter().collect(),
        };
        urls.into_iter()
            .map(|u| u.url.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

/// Endpoint URL wrapper
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EndpointUrl {
    /// Backend URL
    #[serde(default)]
    pub url: String,
}

/// Backend security per stage
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EndpointSecurityConfig {
    /// Production credentials
    #[serde(default)]
    pub production: Option<SecurityConfig>,
    /// Sandbox credentials
    #[serde(default)]
    pub sandbox: Option<SecurityConfig>,
}

/// Backend credentials
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Whether backend security is enabled
    #[serde(default)]
    pub enabled: bool,
    /// `BASIC`, `APIKEY`, `DIGEST`, `OAUTH`
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Basic auth username
    #[serde(default)]
    pub username: String,
    /// Basic auth password
    #[serde(default)]
    pub password: String,
    /// API key name
    #[serde(default)]
    pub api_key_identifier: String,
    /// API key value
    #[serde(default)]
    pub api_key_value: String,
    /// `HEADER` or `QUERY_PARAMETER`
    #[serde(default)]
    pub api_key_identifier_type: String,
}

/// CORS settings (shared by the API definition and APK-Conf)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfiguration {
    /// Whether CORS handling is enabled
    #[serde(default)]
    pub cors_configuration_enabled: bool,
    /// Allowed origins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_origins: Vec<String>,
    /// Whether credentials are allowed
    #[serde(default)]
    pub access_control_allow_credentials: bool,
    /// Allowed request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_headers: Vec<String>,
    /// Allowed methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_methods: Vec<String>,
    /// Response headers exposed to the browser
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_expose_headers: Vec<String>,
}

/// One API resource
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Path template, e.g. `/menu/{id}`
    pub target: String,
    /// HTTP verb
    pub verb: String,
    /// `Any`, `None`, ...
    #[serde(default)]
    pub auth_type: Option<String>,
    /// Operation-level throttling policy name
    #[serde(default)]
    pub throttling_policy: Option<String>,
    /// Required scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Mediation policies attached to the operation
    #[serde(default)]
    pub operation_policies: Option<OperationPolicies>,
}

/// Request/response policy lists of an operation
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct OperationPolicies {
    /// Request flow policies
    #[serde(default)]
    pub request: Vec<OperationPolicy>,
    /// Response flow policies
    #[serde(default)]
    pub response: Vec<OperationPolicy>,
}

/// A policy attached to an operation
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPolicy {
    /// Policy name (addHeader, removeHeader, redirectRequest, mirrorRequest, ...)
    pub policy_name: String,
    /// Policy version
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
    /// Policy parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

fn default_policy_version() -> String {
    "v1".to_string()
}

/// Additional API property
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalProperty {
    /// Property name
    pub name: String,
    /// Property value
    #[serde(default)]
    pub value: String,
}

/// Backend throughput limits
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxTps {
    /// Production request count
    #[serde(default)]
    pub production: Option<u32>,
    /// Production time unit
    #[serde(default)]
    pub production_time_unit: Option<String>,
    /// Sandbox request count
    #[serde(default)]
    pub sandbox: Option<u32>,
    /// Sandbox time unit
    #[serde(default)]
    pub sandbox_time_unit: Option<String>,
    /// Token based (AI) throttling
    #[serde(default)]
    pub token_based_throttling_configuration: Option<TokenThrottlingConfig>,
}

/// Token based throttling for AI APIs
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenThrottlingConfig {
    /// Master switch
    #[serde(default)]
    pub is_token_based_throttling_enabled: bool,
    /// Production prompt token limit
    #[serde(default)]
    pub production_max_prompt_token_count: Option<u32>,
    /// Production completion token limit
    #[serde(default)]
    pub production_max_completion_token_count: Option<u32>,
    /// Production total token limit
    #[serde(default)]
    pub production_max_total_token_count: Option<u32>,
    /// Sandbox prompt token limit
    #[serde(default)]
    pub sandbox_max_prompt_token_count: Option<u32>,
    /// Sandbox completion token limit
    #[serde(default)]
    pub sandbox_max_completion_token_count: Option<u32>,
    /// Sandbox total token limit
    #[serde(default)]
    pub sandbox_max_total_token_count: Option<u32>,
}

/// `endpoints.yaml` envelope
#[derive(Clone, Debug, Deserialize)]
pub struct EndpointsDocument {
    /// Listed endpoints
    #[serde(default)]
    pub data: Vec<ApimEndpoint>,
}

/// An endpoint declared outside the API definition
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApimEndpoint {
    /// Endpoint UUID
    #[serde(default)]
    pub endpoint_uuid: String,
    /// Display name
    #[serde(default)]
    pub endpoint_name: String,
    /// Endpoint URLs and security
    #[serde(default)]
    pub endpoint_config: EndpointConfig,
    /// Stage the endpoint belongs to
    pub deployment_stage: EnvironmentType,
}

/// Certificate descriptor envelope (`*_certificates.yaml`)
#[derive(Clone, Debug, Deserialize)]
pub struct CertificatesDocument<T> {
    /// Listed certificates
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Endpoint certificate descriptor entry
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCertificateEntry {
    /// Certificate alias
    pub alias: String,
    /// Endpoint URL the certificate belongs to
    #[serde(default)]
    pub endpoint: String,
    /// File name of the PEM inside the bundle, or the PEM itself
    pub certificate: String,
}

/// Client certificate descriptor entry
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCertificateEntry {
    /// Certificate alias
    pub alias: String,
    /// File name of the PEM inside the bundle, or the PEM itself
    pub certificate: String,
    /// Subscription tier bound to the certificate
    #[serde(default)]
    pub tier_name: Option<String>,
    /// Stage the certificate is valid for
    #[serde(default)]
    pub key_type: Option<EnvironmentType>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use apk_common::yaml::decode_document;

    const API_YAML: &str = r#"
type: api
version: v4.3.0
data:
  id: 8f2c4b1e-0a41-4b8e-9a3c-1d2e3f4a5b6c
  name: PizzaShackAPI
  version: 1.0.0
  context: /t/acme/pizzashack
  type: HTTP
  isDefaultVersion: true
  securityScheme: [oauth2, api_key]
  apiThrottlingPolicy: 10KPerMin
  endpointConfig:
    endpoint_type: load_balance
    production_endpoints:
      - url: https://pizza-1.example.com/v1
      - url: https://pizza-2.example.com/v1
    sandbox_endpoints:
      url: http://sandbox.example.com
    endpoint_security:
      production:
        enabled: true
        type: BASIC
        username: admin
        password: secret
  operations:
    - target: /menu
      verb: GET
      authType: Any
      throttlingPolicy: Unlimited
      scopes: [read]
      operationPolicies:
        request:
          - policyName: addHeader
            parameters:
              headerName: x-tenant
              headerValue: acme
        response: []
  additionalProperties:
    - name: team
      value: pizza
      display: true
"#;

    #[test]
    fn story_api_yaml_decodes_the_fields_the_agent_uses() {
        let project: ApiProject = decode_document(API_YAML.as_bytes(), "api.yaml").unwrap();
        let api = project.data;
        assert_eq!(project.type_, "api");
        assert_eq!(api.name, "PizzaShackAPI");
        assert_eq!(api.context, "/t/acme/pizzashack");
        assert!(api.is_default_version);
        assert_eq!(api.security_scheme, vec!["oauth2", "api_key"]);

        let endpoints = api.endpoint_config.as_ref().unwrap();
        assert_eq!(
            endpoints.urls(EnvironmentType::Production),
            vec!["https://pizza-1.example.com/v1", "https://pizza-2.example.com/v1"]
        );
        assert_eq!(
            endpoints.urls(EnvironmentType::Sandbox),
            vec!["http://sandbox.example.com"]
        );
        let security = endpoints.security(EnvironmentType::Production).unwrap();
        assert!(security.enabled);
        assert_eq!(security.type_, "BASIC");
        assert!(endpoints.security(EnvironmentType::Sandbox).is_none());

        let op = &api.operations[0];
        assert_eq!(op.verb, "GET");
        let policies = op.operation_policies.as_ref().unwrap();
        assert_eq!(policies.request[0].policy_name, "addHeader");
        assert_eq!(policies.request[0].policy_version, "v1");
        assert_eq!(api.additional_properties[0].value, "pizza");
    }

    #[test]
    fn test_api_type_defaults_to_http() {
        let api: ApiDefinition =
            serde_json::from_value(serde_json::json!({"name": "a", "version": "1"})).unwrap();
        assert_eq!(api.type_, "HTTP");
        assert!(api.operations.is_empty());
    }

    #[test]
    fn test_environment_type_accepts_exported_spellings() {
        let stage: EnvironmentType = serde_json::from_str("\"PRODUCTION\"").unwrap();
        assert_eq!(stage, EnvironmentType::Production);
        let stage: EnvironmentType = serde_json::from_str("\"sandbox\"").unwrap();
        assert_eq!(stage, EnvironmentType::Sandbox);
        assert_eq!(EnvironmentType::Sandbox.to_string(), "sandbox");
    }

    #[test]
    fn test_api_metadata_display() {
        let meta = ApiMetadata {
            name: "Pets".to_string(),
            version: "2.0".to_string(),
        };
        assert_eq!(meta.to_string(), "Pets:2.0");
    }

    #[test]
    fn test_empty_urls_are_dropped() {
        let list = EndpointList::Many(vec![
            EndpointUrl { url: " ".to_string() },
            EndpointUrl {
                url: "http://a".to_string(),
            },
        ]);
        assert_eq!(list.urls(), vec!["http://a"]);
    }
}
