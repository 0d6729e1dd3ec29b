//! APK-Conf generation from an API definition

use std::collections::BTreeMap;

use reqwest::Url;
use tracing::debug;

use apk_common::{Error, Result};

use super::filter::filters_from_policies;
use super::{
    cert_key, client_cert_config_map_name, endpoint_cert_config_map_name, endpoint_secret_name,
    resource_base_name, AiRateLimitConf, ApkConf, ApkOperation, AuthConfiguration, AuthType,
    CertificateRef, EndpointConfiguration, EndpointConfigurations, EndpointSecurity, RateLimit,
    SecurityType,
};
use crate::artifact::CertArtifact;
use crate::model::{
    ApiDefinition, ApiMetadata, ApimEndpoint, EnvironmentType, Operation, SecurityConfig,
};
use crate::ratelimit::{ai_rate_limits, AiRateLimit, RateLimitCatalog, RateLimitPolicy};

const DEFAULT_AUTHORIZATION_HEADER: &str = "Authorization";
const DEFAULT_API_KEY_HEADER: &str = "ApiKey";
const DEFAULT_API_KEY_QUERY_PARAM: &str = "apikey";
const REQUIRED_MANDATORY: &str = "mandatory";
const REQUIRED_OPTIONAL: &str = "optional";

/// Secret keys used for basic auth credentials
pub const BASIC_USERNAME_KEY: &str = "username";
/// Secret key of the basic auth password
pub const BASIC_PASSWORD_KEY: &str = "password";
/// Secret key of the API key name
pub const API_KEY_NAME_KEY: &str = "apiKeyName";
/// Secret key of the API key value
pub const API_KEY_VALUE_KEY: &str = "apiKeyValue";

/// Backend credentials
#[derive(Clone, PartialEq, Eq)]
pub enum EndpointCredentials {
    /// Basic auth
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// API key
    ApiKey {
        /// Key name (header or query parameter)
        name: String,
        /// Key value
        value: String,
    },
}

impl std::fmt::Debug for EndpointCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::ApiKey { name, .. } => f
                .debug_struct("ApiKey")
                .field("name", name)
                .field("value", &"<redacted>")
                .finish(),
        }
    }
}

/// Credentials of one backend, to be stored in a secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSecretData {
    /// Secret name referenced from the APK-Conf
    pub secret_name: String,
    /// Stage of the backend
    pub environment: EnvironmentType,
    /// Backend URL
    pub endpoint: String,
    /// The credentials
    pub credentials: EndpointCredentials,
}

/// Everything produced for one API
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedConfig {
    /// The APK-Conf document
    pub apk_conf: ApkConf,
    /// API UUID
    pub api_uuid: String,
    /// Revision of the definition
    pub revision_id: u32,
    /// Owning organization
    pub organization: String,
    /// Base name of the API's cluster resources
    pub base_name: String,
    /// Named policies referenced by the API and its operations
    pub rate_limit_policies: BTreeMap<String, RateLimitPolicy>,
    /// Backend credentials
    pub endpoint_secrets: Vec<EndpointSecretData>,
    /// API name and version
    pub api: ApiMetadata,
    /// Production AI rate limit
    pub prod_ai_rate_limit: Option<AiRateLimit>,
    /// Sandbox AI rate limit
    pub sand_ai_rate_limit: Option<AiRateLimit>,
}

/// Result of generation for one API.
///
/// The API metadata and AI limits are known even when generation fails, so
/// the caller can still clean up AI rate limit policies.
#[derive(Debug)]
pub struct ConfigOutcome {
    /// API name and version
    pub api: ApiMetadata,
    /// Production AI rate limit
    pub prod_ai_rate_limit: Option<AiRateLimit>,
    /// Sandbox AI rate limit
    pub sand_ai_rate_limit: Option<AiRateLimit>,
    /// The generated configuration
    pub config: Result<GeneratedConfig>,
}

impl ConfigOutcome {
    /// AI limit of one stage
    pub fn ai_rate_limit(&self, env: EnvironmentType) -> Option<&AiRateLimit> {
        match env {
            EnvironmentType::Production => self.prod_ai_rate_limit.as_ref(),
            EnvironmentType::Sandbox => self.sand_ai_rate_limit.as_ref(),
        }
    }
}

/// Generates APK-Conf documents
pub struct ConfigGenerator {
    catalog: RateLimitCatalog,
}

impl ConfigGenerator {
    /// Create a generator resolving throttling policies against `catalog`
    pub fn new(catalog: RateLimitCatalog) -> Self {
        Self { catalog }
    }

    /// Generate the configuration of one API
    pub fn generate(
        &self,
        api: &ApiDefinition,
        certs: &CertArtifact,
        endpoints: &[ApimEndpoint],
        organization_id: &str,
    ) -> ConfigOutcome {
        let meta = ApiMetadata {
            name: api.name.clone(),
            version: api.version.clone(),
        };
        let (prod_ai_rate_limit, sand_ai_rate_limit) = ai_rate_limits(api.max_tps.as_ref());

        let config = self.build(
            api,
            certs,
            endpoints,
            organization_id,
            &meta,
            [prod_ai_rate_limit.as_ref(), sand_ai_rate_limit.as_ref()],
        );
        if let Ok(c) = &config {
            debug!(
                api = %meta,
                api_uuid = %c.api_uuid,
                operations = c.apk_conf.operations.len(),
                secrets = c.endpoint_secrets.len(),
                "generated APK configuration"
            );
        }

        ConfigOutcome {
            api: meta,
            prod_ai_rate_limit,
            sand_ai_rate_limit,
            config,
        }
    }

    fn build(
        &self,
        api: &ApiDefinition,
        certs: &CertArtifact,
        endpoints: &[ApimEndpoint],
        organization: &str,
        meta: &ApiMetadata,
        ai_limits: [Option<&AiRateLimit>; 2],
    ) -> Result<GeneratedConfig> {
        let fail = |msg: String| Error::config_generation(meta.to_string(), msg);

        let api_type = match api.type_.to_ascii_uppercase().as_str() {
            "HTTP" | "REST" => "REST",
            "GRAPHQL" => "GRAPHQL",
            "GRPC" => "GRPC",
            other => return Err(fail(format!("unsupported API type {}", other))),
        };

        let base_name = resource_base_name(organization, &api.name, &api.version);
        let api_uuid = api
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| base_name.clone());

        let mut rate_limit_policies = BTreeMap::new();
        let rate_limit = self
            .resolve(api.api_throttling_policy.as_deref(), &mut rate_limit_policies)
            .map_err(|name| fail(format!("unknown API throttling policy {}", name)))?;

        let operations = api
            .operations
            .iter()
            .map(|op| self.operation(op, &mut rate_limit_policies).map_err(&fail))
            .collect::<Result<Vec<_>>>()?;

        let (endpoint_configurations, endpoint_secrets) =
            endpoint_configurations(api, endpoints, certs, &base_name, ai_limits).map_err(&fail)?;

        Ok(GeneratedConfig {
            apk_conf: ApkConf {
                id: api_uuid.clone(),
                name: api.name.clone(),
                base_path: base_path(&api.context, organization),
                version: api.version.clone(),
                type_: api_type.to_string(),
                default_version: api.is_default_version,
                subscription_validation: false,
                endpoint_configurations: Some(endpoint_configurations),
                operations,
                rate_limit,
                authentication: authentication(api, certs, &base_name),
                cors_configuration: api
                    .cors_configuration
                    .clone()
                    .filter(|c| c.cors_configuration_enabled),
                additional_properties: api.additional_properties.clone(),
            },
            api_uuid,
            revision_id: api.revision_id.unwrap_or(0),
            organization: organization.to_string(),
            base_name,
            rate_limit_policies,
            endpoint_secrets,
            api: meta.clone(),
            prod_ai_rate_limit: ai_limits[0].cloned(),
            sand_ai_rate_limit: ai_limits[1].cloned(),
        })
    }

    /// Resolve a policy reference, recording named policies in `used`.
    /// The error is the unknown policy name.
    fn resolve(
        &self,
        name: Option<&str>,
        used: &mut BTreeMap<String, RateLimitPolicy>,
    ) -> std::result::Result<Option<RateLimit>, String> {
        let policy = self.catalog.resolve(name)?;
        Ok(policy.map(|p| {
            used.insert(p.name.clone(), p.clone());
            RateLimit::from(p)
        }))
    }

    fn operation(
        &self,
        op: &Operation,
        used: &mut BTreeMap<String, RateLimitPolicy>,
    ) -> std::result::Result<ApkOperation, String> {
        let verb = op.verb.to_ascii_uppercase();
        let filters = match &op.operation_policies {
            Some(policies) => filters_from_policies(policies)
                .map_err(|e| format!("operation {} {}: {}", verb, op.target, e))?,
            None => Vec::new(),
        };
        let operation_rate_limit = self
            .resolve(op.throttling_policy.as_deref(), used)
            .map_err(|name| {
                format!(
                    "operation {} {}: unknown throttling policy {}",
                    verb, op.target, name
                )
            })?;

        Ok(ApkOperation {
            target: op.target.clone(),
            secured: !op
                .auth_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("None")),
            verb,
            scopes: op.scopes.clone(),
            filters,
            operation_rate_limit,
        })
    }
}

/// Context path without the `/t/<organization>` tenant prefix
fn base_path(context: &str, organization: &str) -> String {
    let tenant_prefix = format!("/t/{}", organization);
    let stripped = context
        .strip_prefix(tenant_prefix.as_str())
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(context);
    if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{}", stripped)
    }
}

/// Backends per stage from the definition and `endpoints.yaml`, plus the
/// credentials of secured backends
fn endpoint_configurations(
    api: &ApiDefinition,
    endpoints: &[ApimEndpoint],
    certs: &CertArtifact,
    base_name: &str,
    ai_limits: [Option<&AiRateLimit>; 2],
) -> std::result::Result<(EndpointConfigurations, Vec<EndpointSecretData>), String> {
    let mut configurations = EndpointConfigurations::default();
    let mut secrets = Vec::new();

    for (env, ai_limit) in EnvironmentType::ALL.into_iter().zip(ai_limits) {
        let mut sources: Vec<(String, Option<&SecurityConfig>)> = Vec::new();
        if let Some(config) = &api.endpoint_config {
            sources.extend(config.urls(env).into_iter().map(|u| (u, config.security(env))));
        }
        for endpoint in endpoints.iter().filter(|e| e.deployment_stage == env) {
            let config = &endpoint.endpoint_config;
            sources.extend(config.urls(env).into_iter().map(|u| (u, config.security(env))));
        }

        let mut seen = Vec::new();
        for (url, security) in sources {
            if seen.contains(&url) {
                continue;
            }
            Url::parse(&url).map_err(|e| format!("invalid {} endpoint {}: {}", env, url, e))?;

            let index = seen.len();
            let endpoint_security = match security.filter(|s| s.enabled) {
                Some(security) => {
                    let secret_name = endpoint_secret_name(base_name, env, index);
                    let (security_type, credentials) = security_type(security, &secret_name)
                        .map_err(|e| format!("{} endpoint {}: {}", env, url, e))?;
                    secrets.push(EndpointSecretData {
                        secret_name,
                        environment: env,
                        endpoint: url.clone(),
                        credentials,
                    });
                    Some(EndpointSecurity {
                        enabled: true,
                        security_type,
                    })
                }
                None => None,
            };

            let certificate = certs
                .endpoint_certificates
                .iter()
                .find(|c| c.endpoint == url)
                .map(|c| CertificateRef {
                    secret_name: endpoint_cert_config_map_name(base_name),
                    secret_key: cert_key(&c.alias),
                });

            configurations.for_env_mut(env).push(EndpointConfiguration {
                endpoint: url.clone(),
                endpoint_security,
                certificate,
                ai_rate_limit: ai_limit.map(AiRateLimitConf::from),
            });
            seen.push(url);
        }
    }

    if configurations.is_empty() {
        return Err("API has no production or sandbox endpoints".to_string());
    }
    Ok((configurations, secrets))
}

fn security_type(
    security: &SecurityConfig,
    secret_name: &str,
) -> std::result::Result<(SecurityType, EndpointCredentials), String> {
    match security.type_.to_ascii_uppercase().as_str() {
        "BASIC" => Ok((
            SecurityType::Basic {
                secret_name: secret_name.to_string(),
                user_name_key: BASIC_USERNAME_KEY.to_string(),
                password_key: BASIC_PASSWORD_KEY.to_string(),
            },
            EndpointCredentials::Basic {
                username: security.username.clone(),
                password: security.password.clone(),
            },
        )),
        "APIKEY" | "API_KEY" => {
            let in_ = if security
                .api_key_identifier_type
                .eq_ignore_ascii_case("QUERY_PARAMETER")
            {
                "Query"
            } else {
                "Header"
            };
            Ok((
                SecurityType::ApiKey {
                    secret_name: secret_name.to_string(),
                    in_: in_.to_string(),
                    api_key_name_key: API_KEY_NAME_KEY.to_string(),
                    api_key_value_key: API_KEY_VALUE_KEY.to_string(),
                },
                EndpointCredentials::ApiKey {
                    name: security.api_key_identifier.clone(),
                    value: security.api_key_value.clone(),
                },
            ))
        }
        other => Err(format!("unsupported endpoint security type {}", other)),
    }
}

fn authentication(
    api: &ApiDefinition,
    certs: &CertArtifact,
    base_name: &str,
) -> Vec<AuthConfiguration> {
    let schemes: Vec<String> = api
        .security_scheme
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect();
    let has = |scheme: &str| schemes.iter().any(|s| s == scheme);

    let app_required = if has("oauth_basic_auth_api_key_mandatory") || !has("mutualssl") {
        REQUIRED_MANDATORY
    } else {
        REQUIRED_OPTIONAL
    };

    let mut auth = Vec::new();
    if has("oauth2") {
        auth.push(AuthConfiguration {
            required: Some(app_required.to_string()),
            header_name: Some(
                api.authorization_header
                    .clone()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| DEFAULT_AUTHORIZATION_HEADER.to_string()),
            ),
            header_enable: Some(true),
            send_token_to_upstream: Some(false),
            ..AuthConfiguration::new(AuthType::OAuth2)
        });
    }
    if has("api_key") {
        auth.push(AuthConfiguration {
            required: Some(app_required.to_string()),
            header_name: Some(
                api.api_key_header
                    .clone()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            ),
            header_enable: Some(true),
            query_param_name: Some(DEFAULT_API_KEY_QUERY_PARAM.to_string()),
            query_param_enable: Some(true),
            send_token_to_upstream: Some(false),
            ..AuthConfiguration::new(AuthType::APIKey)
        });
    }
    if has("mutualssl") {
        let required = if has("mutualssl_mandatory") {
            REQUIRED_MANDATORY
        } else {
            REQUIRED_OPTIONAL
        };
        auth.push(AuthConfiguration {
            required: Some(required.to_string()),
            certificates: certs
                .client_certificates
                .iter()
                .map(|c| CertificateRef {
                    secret_name: client_cert_config_map_name(base_name),
                    secret_key: cert_key(&c.alias),
                })
                .collect(),
            ..AuthConfiguration::new(AuthType::MTls)
        });
    }
    auth
}
