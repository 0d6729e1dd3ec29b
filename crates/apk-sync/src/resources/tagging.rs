//! Placement tagging of generated resources
//!
//! Tagging never fails: objects that are not JSON maps are left alone, and
//! missing intermediate maps are created.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use apk_common::kube_utils::{object_kind, sanitize_label_value};

use super::{Placement, ResourceSet};
use crate::model::EnvironmentType;
use crate::ratelimit::RateLimitPolicy;

/// Label carrying the API UUID
pub const LABEL_API_UUID: &str = "apk.wso2.com/api-uuid";
/// Label carrying the deployed revision
pub const LABEL_REVISION: &str = "apk.wso2.com/revision";
/// Label carrying the owning organization
pub const LABEL_ORGANIZATION: &str = "apk.wso2.com/organization";
/// Label carrying the gateway environment
pub const LABEL_ENVIRONMENT: &str = "apk.wso2.com/environment";
/// Label on routes telling production and sandbox apart
pub const LABEL_ENVIRONMENT_TYPE: &str = "apk.wso2.com/environment-type";
/// Annotation naming the policy a RateLimitPolicy was created from
pub const ANNOTATION_RATELIMIT_POLICY: &str = "apk.wso2.com/ratelimit-policy";

/// Host prefix of sandbox routes
pub const SANDBOX_HOST_PREFIX: &str = "sandbox.";

/// Stamp placement onto every resource of `set` and record it on the set
pub fn tag_resources(
    set: &mut ResourceSet,
    placement: Placement,
    rate_limit_policies: &BTreeMap<String, RateLimitPolicy>,
) {
    let environment = placement.environments.first();
    let mut labels = BTreeMap::from([
        (
            LABEL_API_UUID.to_string(),
            sanitize_label_value(&placement.api_uuid),
        ),
        (
            LABEL_REVISION.to_string(),
            sanitize_label_value(&placement.revision_id),
        ),
        (
            LABEL_ORGANIZATION.to_string(),
            sanitize_label_value(&placement.organization),
        ),
    ]);
    if let Some(env) = environment {
        labels.insert(LABEL_ENVIRONMENT.to_string(), sanitize_label_value(&env.name));
    }

    for resource in &mut set.resources {
        let kind = object_kind(resource).to_string();
        let Some(obj) = resource.as_object_mut() else {
            warn!(kind = %kind, "skipping tagging of non-object resource");
            continue;
        };

        if let Some(metadata) = child(obj, "metadata") {
            metadata.insert(
                "namespace".to_string(),
                Value::String(placement.namespace.clone()),
            );
            if let Some(l) = child(metadata, "labels") {
                for (k, v) in &labels {
                    l.insert(k.clone(), Value::String(v.clone()));
                }
            }
        }

        match kind.as_str() {
            "API" => {
                if let Some(spec) = child(obj, "spec") {
                    spec.insert(
                        "organization".to_string(),
                        Value::String(placement.organization.clone()),
                    );
                    if let Some(env) = environment {
                        spec.insert("environment".to_string(), Value::String(env.name.clone()));
                    }
                }
            }
            "HTTPRoute" | "GRPCRoute" | "GQLRoute" => {
                if let Some(env) = environment.filter(|e| !e.vhost.is_empty()) {
                    let host = if is_sandbox_route(obj) {
                        format!("{}{}", SANDBOX_HOST_PREFIX, env.vhost)
                    } else {
                        env.vhost.clone()
                    };
                    if let Some(spec) = child(obj, "spec") {
                        spec.insert(
                            "hostnames".to_string(),
                            Value::Array(vec![Value::String(host)]),
                        );
                    }
                }
            }
            "RateLimitPolicy" => fill_rate_limit(obj, rate_limit_policies),
            "AIRateLimitPolicy" => {
                if let Some(values) = child(obj, "spec").and_then(|s| child(s, "override")) {
                    values.insert(
                        "organization".to_string(),
                        Value::String(placement.organization.clone()),
                    );
                }
            }
            _ => {}
        }
    }

    debug!(
        api_uuid = %placement.api_uuid,
        namespace = %placement.namespace,
        resources = set.resources.len(),
        "tagged resources"
    );
    set.placement = Some(placement);
}

/// Child map under `key`, created when absent; `None` if it holds a non-map
fn child<'a>(obj: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    obj.entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn is_sandbox_route(obj: &Map<String, Value>) -> bool {
    let typed = obj
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.get(LABEL_ENVIRONMENT_TYPE))
        .and_then(Value::as_str);
    match typed {
        Some(t) => t == EnvironmentType::Sandbox.as_str(),
        None => obj
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|n| n.contains(EnvironmentType::Sandbox.as_str())),
    }
}

fn fill_rate_limit(obj: &mut Map<String, Value>, policies: &BTreeMap<String, RateLimitPolicy>) {
    let policy_name = obj
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(ANNOTATION_RATELIMIT_POLICY))
        .and_then(Value::as_str)
        .map(str::to_string);
    let Some(name) = policy_name else {
        return;
    };
    let Some(policy) = policies.get(&name) else {
        let resource = obj
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        warn!(
            policy = %name,
            resource = %resource,
            "rate limit policy not in the resolved policy map"
        );
        return;
    };
    if let Some(api) = child(obj, "spec")
        .and_then(|s| child(s, "default"))
        .and_then(|d| child(d, "api"))
    {
        api.insert(
            "requestsPerUnit".to_string(),
            Value::from(policy.requests_per_unit),
        );
        api.insert("unit".to_string(), Value::String(policy.unit.to_string()));
    }
}
