//! Shared Kubernetes utilities using kube-rs
//!
//! Resources produced by the agent are kept as JSON objects until they are
//! applied, so everything here works on `serde_json::Value` plus an
//! `ApiResource` derived from the object's apiVersion/kind.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, trace};

use crate::Error;

// =============================================================================
// ObjectMeta - metadata for generated resources
// =============================================================================

/// Kubernetes metadata for resources generated by the agent.
///
/// Construction adds the standard name and managed-by labels.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace (filled in during tagging when empty)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with standard agent labels
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), sanitize_label_value(&name));
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_AGENT.to_string(),
        );
        Self {
            name,
            namespace: String::new(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for resource types with a compile-time apiVersion and kind.
pub trait HasApiResource {
    /// Full API version (e.g., "dp.wso2.com/v1alpha3", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "API")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an `ApiResource` from an apiVersion string and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use apk_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("dp.wso2.com/v1alpha3");
/// assert_eq!(group, "dp.wso2.com");
/// assert_eq!(version, "v1alpha3");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Known kind plurals that the fallback rules get wrong
const KIND_PLURALS: &[(&str, &str)] = &[
    ("api", "apis"),
    ("httproute", "httproutes"),
    ("grpcroute", "grpcroutes"),
    ("gqlroute", "gqlroutes"),
    ("ratelimitpolicy", "ratelimitpolicies"),
    ("airatelimitpolicy", "airatelimitpolicies"),
    ("apipolicy", "apipolicies"),
    ("backendjwt", "backendjwts"),
];

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Get priority for a resource kind (lower = apply first)
///
/// Referenced objects precede the API that points at them; routes go last.
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Secret" | "ConfigMap" => 0,
        "Backend" | "BackendJWT" => 1,
        "Scope" | "Authentication" | "APIPolicy" => 2,
        "RateLimitPolicy" | "AIRateLimitPolicy" | "AIProvider" => 3,
        "API" => 4,
        "HTTPRoute" | "GRPCRoute" | "GQLRoute" => 5,
        _ => 6,
    }
}

/// Kind of a JSON resource object ("" when missing)
pub fn object_kind(obj: &serde_json::Value) -> &str {
    obj.get("kind").and_then(|v| v.as_str()).unwrap_or_default()
}

/// Name of a JSON resource object ("" when missing)
pub fn object_name(obj: &serde_json::Value) -> &str {
    obj.pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// Reduce an arbitrary string to a valid label value.
///
/// Label values are at most 63 characters of `[A-Za-z0-9._-]`, starting and
/// ending with an alphanumeric character.
pub fn sanitize_label_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(63)
        .collect();
    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

// =============================================================================
// Digests
// =============================================================================

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// SHA-1 over the concatenation of `parts`, as 40 lowercase hex characters.
///
/// Used where names must match the ones the control plane side computes;
/// not for anything security relevant.
pub fn sha1_hex(parts: &[&str]) -> String {
    use aws_lc_rs::digest;
    let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
    for part in parts {
        ctx.update(part.as_bytes());
    }
    hex_encode(ctx.finish().as_ref())
}

// =============================================================================
// Client construction
// =============================================================================

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

// =============================================================================
// Apply / delete
// =============================================================================

/// Server-side apply a single JSON resource into `namespace`.
pub async fn apply_object(
    client: &Client,
    namespace: &str,
    obj: &serde_json::Value,
    params: &PatchParams,
) -> Result<(), Error> {
    let api_version = obj
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::internal_with_context("apply_object", "missing apiVersion"))?;
    let kind = object_kind(obj);
    let name = object_name(obj);
    if kind.is_empty() || name.is_empty() {
        return Err(Error::internal_with_context(
            "apply_object",
            "resource is missing kind or metadata.name",
        ));
    }

    let ar = build_api_resource(api_version, kind);
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
    api.patch(name, params, &Patch::Apply(obj)).await?;
    trace!(kind = %kind, name = %name, namespace = %namespace, "applied resource");
    Ok(())
}

/// Apply resources layer by layer in `kind_priority` order.
///
/// Resources within one layer are applied in parallel; the first failing
/// layer stops the apply. Returns the number of resources applied.
pub async fn apply_objects_ordered(
    client: &Client,
    namespace: &str,
    objects: &[serde_json::Value],
    params: &PatchParams,
) -> Result<usize, Error> {
    use futures::future::join_all;

    let mut layers: BTreeMap<u8, Vec<&serde_json::Value>> = BTreeMap::new();
    for obj in objects {
        layers
            .entry(kind_priority(object_kind(obj)))
            .or_default()
            .push(obj);
    }

    let mut applied = 0;
    for (layer, objs) in layers {
        debug!(layer, count = objs.len(), "applying resource layer");
        let results = join_all(
            objs.iter()
                .map(|obj| apply_object(client, namespace, obj, params)),
        )
        .await;

        let mut errors: Vec<_> = results.into_iter().filter_map(|r| r.err()).collect();
        if !errors.is_empty() {
            for (i, err) in errors.iter().enumerate() {
                tracing::error!(error = %err, index = i, layer, "resource application failed");
            }
            return Err(errors.swap_remove(0));
        }
        applied += objs.len();
    }

    Ok(applied)
}

/// Delete a namespaced resource, treating "not found" as success.
///
/// Returns `true` when something was deleted.
pub async fn delete_if_exists(
    client: &Client,
    ar: &ApiResource,
    name: &str,
    namespace: &str,
) -> Result<bool, Error> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, ar);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
        Err(e) => Err(e.into()),
    }
}
