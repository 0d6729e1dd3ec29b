//! Typed cluster resources produced by local generation
//!
//! - **APK data plane**: API, Backend, RateLimitPolicy, AIRateLimitPolicy
//! - **Gateway API**: HTTPRoute
//!
//! All resource types implement `HasApiResource` for consistent API version handling.

use serde::{Deserialize, Serialize};

use apk_common::kube_utils::{HasApiResource, ObjectMeta};

use crate::ratelimit::TimeUnit;

/// APK data plane API group
pub const DP_GROUP: &str = "dp.wso2.com";
/// Gateway API group
pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

// =============================================================================
// Macro for default serde functions
// =============================================================================

/// Implements `default_api_version()` and `default_kind()` for serde defaults
/// and a `new(metadata, spec)` constructor.
macro_rules! impl_api_defaults {
    ($type:ident, $spec:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }

            /// Create the resource with its apiVersion and kind filled in
            pub fn new(metadata: ObjectMeta, spec: $spec) -> Self {
                Self {
                    api_version: Self::default_api_version(),
                    kind: Self::default_kind(),
                    metadata,
                    spec,
                }
            }
        }
    };
}

/// Reference to another resource by group, kind and name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// API group
    pub group: String,
    /// Kind
    pub kind: String,
    /// Name
    pub name: String,
}

impl TargetRef {
    /// Reference to a data plane resource
    pub fn dp(kind: &str, name: impl Into<String>) -> Self {
        Self {
            group: DP_GROUP.to_string(),
            kind: kind.to_string(),
            name: name.into(),
        }
    }
}

// =============================================================================
// API
// =============================================================================

/// APK `API` resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    /// API version (dp.wso2.com/v1alpha3)
    #[serde(default = "Api::default_api_version")]
    pub api_version: String,
    /// Resource kind (API)
    #[serde(default = "Api::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// API specification
    pub spec: ApiSpec,
}

impl HasApiResource for Api {
    const API_VERSION: &'static str = "dp.wso2.com/v1alpha3";
    const KIND: &'static str = "API";
}

impl_api_defaults!(Api, ApiSpec);

/// API spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    /// API name
    pub api_name: String,
    /// API version
    pub api_version: String,
    /// Base path
    pub base_path: String,
    /// REST, GRAPHQL or GRPC
    pub api_type: String,
    /// Whether the API is the default version
    pub is_default_version: bool,
    /// Owning organization (set during tagging)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    /// Gateway environment (set during tagging)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    /// Config map holding the interface definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_file_ref: Option<String>,
    /// Production routes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub production: Vec<EnvConfig>,
    /// Sandbox routes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sandbox: Vec<EnvConfig>,
    /// Additional properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_properties: Vec<Property>,
}

/// Routes serving one stage
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    /// HTTPRoute names
    pub route_refs: Vec<String>,
}

/// Name/value pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Property {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
}

// =============================================================================
// Backend
// =============================================================================

/// APK `Backend` resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// API version (dp.wso2.com/v1alpha2)
    #[serde(default = "Backend::default_api_version")]
    pub api_version: String,
    /// Resource kind (Backend)
    #[serde(default = "Backend::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Backend specification
    pub spec: BackendSpec,
}

impl HasApiResource for Backend {
    const API_VERSION: &'static str = "dp.wso2.com/v1alpha2";
    const KIND: &'static str = "Backend";
}

impl_api_defaults!(Backend, BackendSpec);

/// Backend spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Upstream hosts
    pub services: Vec<BackendService>,
    /// Path prefix on the upstream
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_path: String,
    /// http or https
    pub protocol: String,
    /// Upstream TLS trust
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<BackendTls>,
    /// Upstream credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<BackendSecurity>,
}

/// Upstream host and port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendService {
    /// Host
    pub host: String,
    /// Port
    pub port: u16,
}

/// Upstream TLS trust
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendTls {
    /// Config map key holding the CA certificate
    pub config_map_ref: KeyRef,
}

/// Key within a config map or secret
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRef {
    /// Object name
    pub name: String,
    /// Key
    pub key: String,
}

/// Upstream credentials
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendSecurity {
    /// Basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuthSecurity>,
    /// API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKeySecurity>,
}

/// Basic auth secret reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthSecurity {
    /// Secret and keys
    pub secret_ref: BasicSecretRef,
}

/// Secret holding basic auth credentials
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicSecretRef {
    /// Secret name
    pub name: String,
    /// Username key
    pub username_key: String,
    /// Password key
    pub password_key: String,
}

/// API key secret reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySecurity {
    /// `Header` or `Query`
    #[serde(rename = "in")]
    pub in_: String,
    /// Secret and keys
    pub secret_ref: ApiKeySecretRef,
}

/// Secret holding an API key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySecretRef {
    /// Secret name
    pub name: String,
    /// Key of the API key name
    pub name_key: String,
    /// Key of the API key value
    pub value_key: String,
}

// =============================================================================
// HTTPRoute
// =============================================================================

/// Gateway API `HTTPRoute` resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Route specification
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
}

impl_api_defaults!(HttpRoute, HttpRouteSpec);

/// HTTPRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Gateways the route attaches to
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames (replaced with the environment vhost during tagging)
    pub hostnames: Vec<String>,
    /// Rules
    pub rules: Vec<HttpRouteRule>,
}

/// Gateway reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// API group
    pub group: String,
    /// Kind (Gateway)
    pub kind: String,
    /// Gateway name
    pub name: String,
    /// Listener name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// One routing rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Matches
    pub matches: Vec<HttpRouteMatch>,
    /// Filters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<HttpRouteFilter>,
    /// Backends
    pub backend_refs: Vec<TargetRef>,
}

/// Path and method match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match
    pub path: PathMatch,
    /// HTTP method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Path match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathMatch {
    /// Exact, PathPrefix or RegularExpression
    #[serde(rename = "type")]
    pub type_: String,
    /// Path or pattern
    pub value: String,
}

/// Route filter
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteFilter {
    /// Filter type
    #[serde(rename = "type")]
    pub type_: String,
    /// Request header changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_header_modifier: Option<HeaderModifierConfig>,
    /// Response header changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_header_modifier: Option<HeaderModifierConfig>,
    /// Redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_redirect: Option<RedirectConfig>,
    /// Mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_mirror: Option<MirrorConfig>,
    /// Extension (data plane policy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_ref: Option<TargetRef>,
}

/// Header add/remove lists
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderModifierConfig {
    /// Headers to add
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<HttpHeader>,
    /// Header names to remove
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

/// Header name and value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpHeader {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
}

/// Redirect target
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectConfig {
    /// Scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Path replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathModifier>,
    /// Status code
    pub status_code: u16,
}

/// Full path replacement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathModifier {
    /// ReplaceFullPath
    #[serde(rename = "type")]
    pub type_: String,
    /// New path
    pub replace_full_path: String,
}

/// Mirror target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Backend receiving the copy
    pub backend_ref: TargetRef,
}

// =============================================================================
// Rate limiting
// =============================================================================

/// APK `RateLimitPolicy` resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicyResource {
    /// API version (dp.wso2.com/v1alpha3)
    #[serde(default = "RateLimitPolicyResource::default_api_version")]
    pub api_version: String,
    /// Resource kind (RateLimitPolicy)
    #[serde(default = "RateLimitPolicyResource::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Policy specification
    pub spec: RateLimitPolicySpec,
}

impl HasApiResource for RateLimitPolicyResource {
    const API_VERSION: &'static str = "dp.wso2.com/v1alpha3";
    const KIND: &'static str = "RateLimitPolicy";
}

impl_api_defaults!(RateLimitPolicyResource, RateLimitPolicySpec);

/// RateLimitPolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    /// Limit applied unless overridden
    pub default: RateLimitDefault,
    /// API or route the policy applies to
    pub target_ref: TargetRef,
}

/// Request-count limit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitDefault {
    /// API-wide limit
    pub api: RequestsPerUnit,
}

/// Requests per window
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestsPerUnit {
    /// Requests
    pub requests_per_unit: u32,
    /// Window
    pub unit: TimeUnit,
}

/// APK `AIRateLimitPolicy` resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiRateLimitPolicyResource {
    /// API version (dp.wso2.com/v1alpha3)
    #[serde(default = "AiRateLimitPolicyResource::default_api_version")]
    pub api_version: String,
    /// Resource kind (AIRateLimitPolicy)
    #[serde(default = "AiRateLimitPolicyResource::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Policy specification
    pub spec: AiRateLimitPolicySpec,
}

impl HasApiResource for AiRateLimitPolicyResource {
    const API_VERSION: &'static str = "dp.wso2.com/v1alpha3";
    const KIND: &'static str = "AIRateLimitPolicy";
}

impl_api_defaults!(AiRateLimitPolicyResource, AiRateLimitPolicySpec);

/// AIRateLimitPolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiRateLimitPolicySpec {
    /// Enforced limits
    #[serde(rename = "override")]
    pub override_: AiRateLimitValues,
    /// Backend the policy applies to
    pub target_ref: TargetRef,
}

/// Token and request limits
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiRateLimitValues {
    /// Owning organization
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    /// Token limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<TokenCount>,
    /// Request limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_count: Option<RequestsPerUnit>,
}

/// Token limits
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenCount {
    /// Prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_token_count: Option<u32>,
    /// Completion tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_token_count: Option<u32>,
    /// Total tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u32>,
    /// Window
    pub unit: TimeUnit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_resource_constants() {
        let ar = Api::api_resource();
        assert_eq!(ar.group, DP_GROUP);
        assert_eq!(ar.plural, "apis");
        assert_eq!(HttpRoute::api_resource().plural, "httproutes");
        assert_eq!(
            AiRateLimitPolicyResource::api_resource().plural,
            "airatelimitpolicies"
        );
    }

    #[test]
    fn test_new_fills_type_meta() {
        let route = HttpRoute::new(
            ObjectMeta::new("pets-production"),
            HttpRouteSpec {
                parent_refs: Vec::new(),
                hostnames: vec!["gw.example.com".to_string()],
                rules: Vec::new(),
            },
        );
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["apiVersion"], "gateway.networking.k8s.io/v1");
        assert_eq!(value["kind"], "HTTPRoute");
        assert_eq!(value["metadata"]["name"], "pets-production");
        assert_eq!(value["spec"]["hostnames"][0], "gw.example.com");
    }

    #[test]
    fn test_ai_policy_spec_uses_override_key() {
        let policy = AiRateLimitPolicyResource::new(
            ObjectMeta::new("p"),
            AiRateLimitPolicySpec {
                override_: AiRateLimitValues {
                    organization: "acme".to_string(),
                    token_count: None,
                    request_count: Some(RequestsPerUnit {
                        requests_per_unit: 5,
                        unit: TimeUnit::Minute,
                    }),
                },
                target_ref: TargetRef::dp("Backend", "b"),
            },
        );
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["spec"]["override"]["requestCount"]["requestsPerUnit"], 5);
        assert_eq!(value["spec"]["targetRef"]["group"], DP_GROUP);
    }

    #[test]
    fn test_deserialize_defaults_type_meta() {
        let json = serde_json::json!({
            "metadata": {"name": "b"},
            "spec": {"services": [{"host": "h", "port": 80}], "protocol": "http"}
        });
        let backend: Backend = serde_json::from_value(json).unwrap();
        assert_eq!(backend.kind, "Backend");
        assert_eq!(backend.api_version, "dp.wso2.com/v1alpha2");
    }
}
