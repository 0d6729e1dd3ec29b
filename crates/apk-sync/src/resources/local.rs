//! In-process resource generation from an APK-Conf

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use apk_common::kube_utils::ObjectMeta;
use apk_common::{Error, Result};

use super::tagging::{ANNOTATION_RATELIMIT_POLICY, LABEL_ENVIRONMENT_TYPE};
use super::types::{
    AiRateLimitPolicyResource, AiRateLimitPolicySpec, AiRateLimitValues, Api, ApiKeySecretRef,
    ApiKeySecurity, ApiSpec, Backend, BackendSecurity, BackendService, BackendSpec, BackendTls,
    BasicAuthSecurity, BasicSecretRef, EnvConfig, HeaderModifierConfig, HttpHeader, HttpRoute,
    HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, KeyRef, MirrorConfig,
    ParentRef, PathMatch, PathModifier, Property, RateLimitDefault, RateLimitPolicyResource,
    RateLimitPolicySpec, RedirectConfig, RequestsPerUnit, TargetRef, TokenCount, GATEWAY_GROUP,
};
use super::{
    config_map, supporting_resources, to_object, CertContainer, ResourceGenerator, ResourceSet,
};
use crate::apkconf::{
    ApkOperation, EndpointConfiguration, Filter, GeneratedConfig, HeaderChanges, RateLimit,
    SecurityType,
};
use crate::model::EnvironmentType;
use crate::ratelimit::{ai_policy_name, AiRateLimit};

/// Placeholder host of generated routes, replaced during tagging
pub const DEFAULT_VHOST: &str = "default.gw.wso2.com";

/// Gateway listener routes attach to
pub const GATEWAY_LISTENER: &str = "httpslistener";

/// Config map key of the interface definition
pub const DEFINITION_KEY: &str = "definition";

/// Builds data plane resources without calling out of process
pub struct LocalResourceGenerator {
    gateway_name: String,
}

impl LocalResourceGenerator {
    /// Generator attaching routes to the named gateway
    pub fn new(gateway_name: impl Into<String>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
        }
    }

    fn build(
        &self,
        config: &GeneratedConfig,
        schema: Option<&str>,
        certs: &CertContainer,
    ) -> std::result::Result<Vec<Value>, String> {
        let conf = &config.apk_conf;
        let base = config.base_name.as_str();
        let mut out = supporting_resources(config, certs).map_err(|e| e.to_string())?;

        let definition_file_ref = match schema {
            Some(s) => {
                let name = format!("{}-definition", base);
                let data = BTreeMap::from([(DEFINITION_KEY.to_string(), s.to_string())]);
                out.push(config_map(&name, data).map_err(|e| e.to_string())?);
                Some(name)
            }
            None => None,
        };

        // Backends referenced by mirror filters, keyed by URL
        let mut mirrors: BTreeMap<String, String> = BTreeMap::new();
        for op in &conf.operations {
            for filter in &op.filters {
                if let Filter::Mirror { urls, .. } = filter {
                    for url in urls {
                        let next = format!("{}-mirror-{}", base, mirrors.len());
                        mirrors.entry(url.clone()).or_insert(next);
                    }
                }
            }
        }
        for (url, name) in &mirrors {
            let backend = backend(name, url, None)?;
            out.push(object(&backend)?);
        }

        // Operation rate limits, one policy per limited operation
        let mut operation_policies: BTreeMap<usize, String> = BTreeMap::new();
        for (i, op) in conf.operations.iter().enumerate() {
            if let Some(limit) = &op.operation_rate_limit {
                let name = format!("{}-operation-{}-ratelimit", base, i);
                let target = TargetRef::dp("Resource", base);
                out.push(object(&rate_limit_policy(&name, limit, target))?);
                operation_policies.insert(i, name);
            }
        }

        let mut route_refs: BTreeMap<EnvironmentType, Vec<String>> = BTreeMap::new();
        let endpoints = conf.endpoint_configurations.clone().unwrap_or_default();
        for env in EnvironmentType::ALL {
            let configured = endpoints.for_env(env);
            if configured.is_empty() {
                continue;
            }

            let mut backend_names = Vec::with_capacity(configured.len());
            for (i, endpoint) in configured.iter().enumerate() {
                let name = format!("{}-{}-backend-{}", base, env, i);
                let backend = backend(&name, &endpoint.endpoint, Some(endpoint))?;
                out.push(object(&backend)?);
                backend_names.push(name);
            }

            if let Some(limit) = stage_ai_limit(config, env) {
                out.push(object(&ai_rate_limit_policy(
                    config,
                    env,
                    limit,
                    &backend_names[0],
                ))?);
            }

            let route_name = format!("{}-{}", base, env);
            let rules = conf
                .operations
                .iter()
                .enumerate()
                .map(|(i, op)| {
                    route_rule(
                        &conf.base_path,
                        op,
                        &backend_names[0],
                        &mirrors,
                        operation_policies.get(&i).map(String::as_str),
                    )
                })
                .collect::<std::result::Result<Vec<_>, String>>()?;
            let route = HttpRoute::new(
                ObjectMeta::new(&route_name).with_label(LABEL_ENVIRONMENT_TYPE, env.as_str()),
                HttpRouteSpec {
                    parent_refs: vec![ParentRef {
                        group: GATEWAY_GROUP.to_string(),
                        kind: "Gateway".to_string(),
                        name: self.gateway_name.clone(),
                        section_name: Some(GATEWAY_LISTENER.to_string()),
                    }],
                    hostnames: vec![DEFAULT_VHOST.to_string()],
                    rules,
                },
            );
            out.push(object(&route)?);
            route_refs.entry(env).or_default().push(route_name);
        }

        if let Some(limit) = &conf.rate_limit {
            let name = format!("{}-ratelimit", base);
            let target = TargetRef::dp("API", base);
            out.push(object(&rate_limit_policy(&name, limit, target))?);
        }

        let env_config = |env: EnvironmentType| -> Vec<EnvConfig> {
            route_refs
                .get(&env)
                .map(|refs| {
                    vec![EnvConfig {
                        route_refs: refs.clone(),
                    }]
                })
                .unwrap_or_default()
        };
        let api = Api::new(
            ObjectMeta::new(base),
            ApiSpec {
                api_name: conf.name.clone(),
                api_version: conf.version.clone(),
                base_path: conf.base_path.clone(),
                api_type: conf.type_.clone(),
                is_default_version: conf.default_version,
                definition_file_ref,
                production: env_config(EnvironmentType::Production),
                sandbox: env_config(EnvironmentType::Sandbox),
                api_properties: conf
                    .additional_properties
                    .iter()
                    .map(|p| Property {
                        name: p.name.clone(),
                        value: p.value.clone(),
                    })
                    .collect(),
                ..Default::default()
            },
        );
        out.push(object(&api)?);

        Ok(out)
    }
}

#[async_trait]
impl ResourceGenerator for LocalResourceGenerator {
    async fn generate(
        &self,
        config: &GeneratedConfig,
        schema: Option<String>,
        certs: &CertContainer,
    ) -> Result<ResourceSet> {
        let resources = self
            .build(config, schema.as_deref(), certs)
            .map_err(|msg| Error::resource_generation(config.api.to_string(), msg))?;
        debug!(
            api = %config.api,
            resources = resources.len(),
            "generated resources locally"
        );
        Ok(ResourceSet::new(resources))
    }
}

fn object<T: serde::Serialize + apk_common::kube_utils::HasApiResource>(
    resource: &T,
) -> std::result::Result<Value, String> {
    to_object(T::KIND, resource).map_err(|e| e.to_string())
}

fn stage_ai_limit(config: &GeneratedConfig, env: EnvironmentType) -> Option<&AiRateLimit> {
    match env {
        EnvironmentType::Production => config.prod_ai_rate_limit.as_ref(),
        EnvironmentType::Sandbox => config.sand_ai_rate_limit.as_ref(),
    }
}

/// Backend for one upstream URL
fn backend(
    name: &str,
    url: &str,
    endpoint: Option<&EndpointConfiguration>,
) -> std::result::Result<Backend, String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid endpoint {}: {}", url, e))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| format!("endpoint {} has no host", url))?
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| format!("endpoint {} has no port", url))?;
    let path = parsed.path().trim_end_matches('/');

    let tls = endpoint
        .and_then(|e| e.certificate.as_ref())
        .map(|cert| BackendTls {
            config_map_ref: KeyRef {
                name: cert.secret_name.clone(),
                key: cert.secret_key.clone(),
            },
        });
    let security = endpoint
        .and_then(|e| e.endpoint_security.as_ref())
        .filter(|s| s.enabled)
        .map(|s| match &s.security_type {
            SecurityType::Basic {
                secret_name,
                user_name_key,
                password_key,
            } => BackendSecurity {
                basic: Some(BasicAuthSecurity {
                    secret_ref: BasicSecretRef {
                        name: secret_name.clone(),
                        username_key: user_name_key.clone(),
                        password_key: password_key.clone(),
                    },
                }),
                api_key: None,
            },
            SecurityType::ApiKey {
                secret_name,
                in_,
                api_key_name_key,
                api_key_value_key,
            } => BackendSecurity {
                basic: None,
                api_key: Some(ApiKeySecurity {
                    in_: in_.clone(),
                    secret_ref: ApiKeySecretRef {
                        name: secret_name.clone(),
                        name_key: api_key_name_key.clone(),
                        value_key: api_key_value_key.clone(),
                    },
                }),
            },
        });

    Ok(Backend::new(
        ObjectMeta::new(name),
        BackendSpec {
            services: vec![BackendService { host, port }],
            base_path: path.to_string(),
            protocol: parsed.scheme().to_string(),
            tls,
            security,
        },
    ))
}

fn rate_limit_policy(
    name: &str,
    limit: &RateLimit,
    target_ref: TargetRef,
) -> RateLimitPolicyResource {
    RateLimitPolicyResource::new(
        ObjectMeta::new(name).with_annotation(ANNOTATION_RATELIMIT_POLICY, &limit.policy_name),
        RateLimitPolicySpec {
            default: RateLimitDefault {
                api: RequestsPerUnit {
                    requests_per_unit: limit.requests_per_unit,
                    unit: limit.unit,
                },
            },
            target_ref,
        },
    )
}

fn ai_rate_limit_policy(
    config: &GeneratedConfig,
    env: EnvironmentType,
    limit: &AiRateLimit,
    backend: &str,
) -> AiRateLimitPolicyResource {
    let has_tokens = limit.prompt_token_count.is_some()
        || limit.completion_token_count.is_some()
        || limit.total_token_count.is_some();
    AiRateLimitPolicyResource::new(
        ObjectMeta::new(ai_policy_name(&config.api.name, &config.api.version, env)),
        AiRateLimitPolicySpec {
            override_: AiRateLimitValues {
                organization: config.organization.clone(),
                token_count: has_tokens.then(|| TokenCount {
                    request_token_count: limit.prompt_token_count,
                    response_token_count: limit.completion_token_count,
                    total_token_count: limit.total_token_count,
                    unit: limit.time_unit,
                }),
                request_count: limit.request_count.map(|count| RequestsPerUnit {
                    requests_per_unit: count,
                    unit: limit.time_unit,
                }),
            },
            target_ref: TargetRef::dp("Backend", backend),
        },
    )
}

fn route_rule(
    base_path: &str,
    op: &ApkOperation,
    backend: &str,
    mirrors: &BTreeMap<String, String>,
    rate_limit_policy: Option<&str>,
) -> std::result::Result<HttpRouteRule, String> {
    let mut filters = Vec::new();
    for filter in &op.filters {
        match filter {
            Filter::HeaderModifier {
                request_headers,
                response_headers,
                ..
            } => {
                if !request_headers.is_empty() {
                    filters.push(HttpRouteFilter {
                        type_: "RequestHeaderModifier".to_string(),
                        request_header_modifier: Some(header_modifier(request_headers)),
                        ..Default::default()
                    });
                }
                if !response_headers.is_empty() {
                    filters.push(HttpRouteFilter {
                        type_: "ResponseHeaderModifier".to_string(),
                        response_header_modifier: Some(header_modifier(response_headers)),
                        ..Default::default()
                    });
                }
            }
            Filter::Redirect {
                url, status_code, ..
            } => {
                let target =
                    Url::parse(url).map_err(|e| format!("invalid redirect URL {}: {}", url, e))?;
                let path = target.path();
                filters.push(HttpRouteFilter {
                    type_: "RequestRedirect".to_string(),
                    request_redirect: Some(RedirectConfig {
                        scheme: Some(target.scheme().to_string()),
                        hostname: target.host_str().map(str::to_string),
                        port: target.port(),
                        path: (!path.is_empty() && path != "/").then(|| PathModifier {
                            type_: "ReplaceFullPath".to_string(),
                            replace_full_path: path.to_string(),
                        }),
                        status_code: *status_code,
                    }),
                    ..Default::default()
                });
            }
            Filter::Mirror { urls, .. } => {
                for url in urls {
                    if let Some(name) = mirrors.get(url) {
                        filters.push(HttpRouteFilter {
                            type_: "RequestMirror".to_string(),
                            request_mirror: Some(MirrorConfig {
                                backend_ref: TargetRef::dp("Backend", name),
                            }),
                            ..Default::default()
                        });
                    }
                }
            }
        }
    }
    if let Some(policy) = rate_limit_policy {
        filters.push(HttpRouteFilter {
            type_: "ExtensionRef".to_string(),
            extension_ref: Some(TargetRef::dp("RateLimitPolicy", policy)),
            ..Default::default()
        });
    }

    let method = match op.verb.as_str() {
        "ANY" | "*" => None,
        verb => Some(verb.to_string()),
    };
    Ok(HttpRouteRule {
        matches: vec![HttpRouteMatch {
            path: path_match(base_path, &op.target),
            method,
        }],
        filters,
        backend_refs: vec![TargetRef::dp("Backend", backend)],
    })
}

fn header_modifier(changes: &HeaderChanges) -> HeaderModifierConfig {
    HeaderModifierConfig {
        add: changes
            .add_headers
            .iter()
            .map(|h| HttpHeader {
                name: h.name.clone(),
                value: h.value.clone(),
            })
            .collect(),
        remove: changes.remove_headers.clone(),
    }
}

/// Route path match for an operation target below `base_path`.
///
/// `/*` suffixes become prefix matches and `{param}` segments become regular
/// expressions; everything else matches exactly.
pub fn path_match(base_path: &str, target: &str) -> PathMatch {
    let base = base_path.trim_end_matches('/');

    if let Some(prefix) = target.strip_suffix("/*").or((target == "*").then_some("")) {
        let value = format!("{}{}", base, prefix);
        return PathMatch {
            type_: "PathPrefix".to_string(),
            value: if value.is_empty() { "/".to_string() } else { value },
        };
    }

    let full = format!("{}{}", base, target);
    if !target.contains('{') {
        return PathMatch {
            type_: "Exact".to_string(),
            value: full,
        };
    }

    let mut pattern = String::with_capacity(full.len() + 8);
    let mut in_param = false;
    for c in full.chars() {
        match c {
            '{' => in_param = true,
            '}' if in_param => {
                in_param = false;
                pattern.push_str("[^/]+");
            }
            _ if in_param => {}
            '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '^' | '$' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
    }
    PathMatch {
        type_: "RegularExpression".to_string(),
        value: pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apkconf::PolicyRef;
    use crate::artifact::CertArtifact;
    use crate::ratelimit::TimeUnit;
    use crate::testutil::pizza_config;
    use apk_common::kube_utils::object_name;

    async fn generate(config: &GeneratedConfig, schema: Option<&str>) -> ResourceSet {
        let certs = CertContainer::new(&CertArtifact::default(), &config.base_name);
        LocalResourceGenerator::new("wso2-apk-default")
            .generate(config, schema.map(str::to_string), &certs)
            .await
            .unwrap()
    }

    fn named<'a>(set: &'a ResourceSet, kind: &'a str, name: &str) -> &'a Value {
        set.of_kind(kind)
            .find(|r| object_name(r) == name)
            .unwrap_or_else(|| panic!("no {} named {}", kind, name))
    }

    // ==========================================================================
    // Full generation
    // ==========================================================================

    /// Story: the sample API yields its definition, credentials, one backend
    /// and route per stage, API and operation rate limits and the API itself.
    #[tokio::test]
    async fn story_pizza_api_resources() {
        let config = pizza_config();
        let base = config.base_name.clone();
        let set = generate(&config, Some("openapi: 3.0.1")).await;
        assert!(set.placement.is_none());

        let count = |kind: &str| set.of_kind(kind).count();
        assert_eq!(count("Secret"), 1);
        assert_eq!(count("ConfigMap"), 1);
        assert_eq!(count("Backend"), 2);
        assert_eq!(count("HTTPRoute"), 2);
        assert_eq!(count("RateLimitPolicy"), 2);
        assert_eq!(count("API"), 1);
        assert_eq!(count("AIRateLimitPolicy"), 0);

        let definition = named(&set, "ConfigMap", &format!("{}-definition", base));
        assert_eq!(definition["data"][DEFINITION_KEY], "openapi: 3.0.1");

        // Backends
        let prod = named(&set, "Backend", &format!("{}-production-backend-0", base));
        assert_eq!(prod["spec"]["services"][0]["host"], "pizza.example.com");
        assert_eq!(prod["spec"]["services"][0]["port"], 443);
        assert_eq!(prod["spec"]["protocol"], "https");
        assert_eq!(prod["spec"]["basePath"], "/v1");
        assert_eq!(
            prod["spec"]["security"]["basic"]["secretRef"]["name"],
            config.endpoint_secrets[0].secret_name.as_str()
        );
        let sandbox = named(&set, "Backend", &format!("{}-sandbox-backend-0", base));
        assert_eq!(sandbox["spec"]["services"][0]["port"], 8080);
        assert!(sandbox["spec"].get("security").is_none());

        // Routes
        let route = named(&set, "HTTPRoute", &format!("{}-production", base));
        assert_eq!(route["metadata"]["labels"][LABEL_ENVIRONMENT_TYPE], "production");
        assert_eq!(route["spec"]["parentRefs"][0]["name"], "wso2-apk-default");
        assert_eq!(route["spec"]["hostnames"][0], DEFAULT_VHOST);
        let rules = route["spec"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0]["matches"][0]["path"]["value"], "/pizzashack/1.0.0/menu");
        assert_eq!(rules[0]["matches"][0]["method"], "GET");
        let order_filters: Vec<&str> = rules[1]["filters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            order_filters,
            vec!["RequestHeaderModifier", "ResponseHeaderModifier", "ExtensionRef"]
        );
        assert_eq!(
            rules[1]["filters"][0]["requestHeaderModifier"]["add"][0]["name"],
            "x-source"
        );
        assert_eq!(
            rules[1]["backendRefs"][0]["name"],
            format!("{}-production-backend-0", base)
        );

        // Rate limits
        let api_limit = named(&set, "RateLimitPolicy", &format!("{}-ratelimit", base));
        assert_eq!(api_limit["spec"]["default"]["api"]["requestsPerUnit"], 10_000);
        assert_eq!(api_limit["spec"]["targetRef"]["kind"], "API");
        assert_eq!(
            api_limit["metadata"]["annotations"][ANNOTATION_RATELIMIT_POLICY],
            "10KPerMin"
        );

        // API
        let api = named(&set, "API", &base);
        assert_eq!(api["spec"]["apiName"], "PizzaShackAPI");
        assert_eq!(api["spec"]["apiType"], "REST");
        assert_eq!(api["spec"]["basePath"], "/pizzashack/1.0.0");
        assert_eq!(
            api["spec"]["definitionFileRef"],
            format!("{}-definition", base)
        );
        assert_eq!(
            api["spec"]["production"][0]["routeRefs"][0],
            format!("{}-production", base)
        );
        assert_eq!(
            api["spec"]["sandbox"][0]["routeRefs"][0],
            format!("{}-sandbox", base)
        );
        assert_eq!(api["spec"]["apiProperties"][0]["name"], "team");
    }

    #[tokio::test]
    async fn test_no_schema_means_no_definition_map() {
        let config = pizza_config();
        let set = generate(&config, None).await;
        assert_eq!(set.of_kind("ConfigMap").count(), 0);
        let api = named(&set, "API", &config.base_name);
        assert!(api["spec"].get("definitionFileRef").is_none());
    }

    // ==========================================================================
    // AI rate limits and filters
    // ==========================================================================

    /// Story: a production AI limit becomes a policy named by the API
    /// fingerprint and aimed at the first production backend.
    #[tokio::test]
    async fn story_ai_limit_targets_stage_backend() {
        let mut config = pizza_config();
        config.prod_ai_rate_limit = Some(AiRateLimit {
            prompt_token_count: Some(100),
            completion_token_count: None,
            total_token_count: Some(500),
            time_unit: TimeUnit::Hour,
            request_count: Some(10),
        });
        let set = generate(&config, None).await;

        let name = ai_policy_name("PizzaShackAPI", "1.0.0", EnvironmentType::Production);
        let policy = named(&set, "AIRateLimitPolicy", &name);
        let values = &policy["spec"]["override"];
        assert_eq!(values["tokenCount"]["requestTokenCount"], 100);
        assert!(values["tokenCount"].get("responseTokenCount").is_none());
        assert_eq!(values["tokenCount"]["unit"], "Hour");
        assert_eq!(values["requestCount"]["requestsPerUnit"], 10);
        assert_eq!(values["organization"], config.organization.as_str());
        assert_eq!(
            policy["spec"]["targetRef"]["name"],
            format!("{}-production-backend-0", config.base_name)
        );
        assert_eq!(set.of_kind("AIRateLimitPolicy").count(), 1);
    }

    #[tokio::test]
    async fn test_redirect_and_mirror_filters() {
        let mut config = pizza_config();
        let policy = PolicyRef {
            policy_name: "p".to_string(),
            policy_version: "v1".to_string(),
        };
        config.apk_conf.operations[0].filters = vec![
            Filter::Redirect {
                policy: policy.clone(),
                url: "https://new.example.com:8443/menu".to_string(),
                status_code: 301,
            },
            Filter::Mirror {
                policy,
                urls: vec!["http://mirror.example.com".to_string()],
            },
        ];
        let set = generate(&config, None).await;

        let mirror = named(&set, "Backend", &format!("{}-mirror-0", config.base_name));
        assert_eq!(mirror["spec"]["services"][0]["port"], 80);

        let route = named(&set, "HTTPRoute", &format!("{}-production", config.base_name));
        let filters = &route["spec"]["rules"][0]["filters"];
        assert_eq!(filters[0]["requestRedirect"]["hostname"], "new.example.com");
        assert_eq!(filters[0]["requestRedirect"]["port"], 8443);
        assert_eq!(filters[0]["requestRedirect"]["statusCode"], 301);
        assert_eq!(
            filters[0]["requestRedirect"]["path"]["replaceFullPath"],
            "/menu"
        );
        assert_eq!(
            filters[1]["requestMirror"]["backendRef"]["name"],
            format!("{}-mirror-0", config.base_name)
        );
    }

    #[tokio::test]
    async fn test_api_without_sandbox_has_single_route() {
        let mut config = pizza_config();
        if let Some(endpoints) = config.apk_conf.endpoint_configurations.as_mut() {
            endpoints.sandbox.clear();
        }
        let set = generate(&config, None).await;
        assert_eq!(set.of_kind("HTTPRoute").count(), 1);
        let api = named(&set, "API", &config.base_name);
        assert!(api["spec"].get("sandbox").is_none());
    }

    // ==========================================================================
    // Path matching
    // ==========================================================================

    #[test]
    fn test_path_match_kinds() {
        let exact = path_match("/pets/1.0", "/list");
        assert_eq!(exact.type_, "Exact");
        assert_eq!(exact.value, "/pets/1.0/list");

        let prefix = path_match("/pets/1.0/", "/files/*");
        assert_eq!(prefix.type_, "PathPrefix");
        assert_eq!(prefix.value, "/pets/1.0/files");

        let all = path_match("", "/*");
        assert_eq!(all.value, "/");

        let templated = path_match("/pets/1.0", "/pets/{petId}/tags/{tag}");
        assert_eq!(templated.type_, "RegularExpression");
        assert_eq!(templated.value, r"/pets/1\.0/pets/[^/]+/tags/[^/]+");
    }
}
