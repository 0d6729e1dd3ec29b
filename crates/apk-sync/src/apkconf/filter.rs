//! Operation filters
//!
//! Operation policies from the API definition become typed filters. Every
//! variant carries the same policy reference so the originating policy can be
//! traced back from the generated route.

use serde::Serialize;
use tracing::debug;

use crate::model::{OperationPolicies, OperationPolicy};

/// Policy a filter was created from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRef {
    /// Policy name
    pub policy_name: String,
    /// Policy version
    pub policy_version: String,
}

/// A header to set
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// Headers to add and remove in one direction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderChanges {
    /// Headers to add
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_headers: Vec<Header>,
    /// Header names to remove
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_headers: Vec<String>,
}

impl HeaderChanges {
    /// Whether nothing is changed
    pub fn is_empty(&self) -> bool {
        self.add_headers.is_empty() && self.remove_headers.is_empty()
    }
}

/// Filter applied to an operation's traffic
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Filter {
    /// Add or remove request and response headers
    HeaderModifier {
        /// Originating policy
        #[serde(flatten)]
        policy: PolicyRef,
        /// Request header changes
        #[serde(skip_serializing_if = "HeaderChanges::is_empty")]
        request_headers: HeaderChanges,
        /// Response header changes
        #[serde(skip_serializing_if = "HeaderChanges::is_empty")]
        response_headers: HeaderChanges,
    },
    /// Redirect the request
    Redirect {
        /// Originating policy
        #[serde(flatten)]
        policy: PolicyRef,
        /// Target URL
        url: String,
        /// Redirect status code
        status_code: u16,
    },
    /// Mirror the request to other backends
    Mirror {
        /// Originating policy
        #[serde(flatten)]
        policy: PolicyRef,
        /// Mirror target URLs
        urls: Vec<String>,
    },
}

impl Filter {
    /// The policy the filter came from
    pub fn policy(&self) -> &PolicyRef {
        match self {
            Self::HeaderModifier { policy, .. }
            | Self::Redirect { policy, .. }
            | Self::Mirror { policy, .. } => policy,
        }
    }
}

/// Policy names understood by the agent
pub const ADD_HEADER: &str = "addHeader";
/// Removes a header
pub const REMOVE_HEADER: &str = "removeHeader";
/// Redirects the request
pub const REDIRECT_REQUEST: &str = "redirectRequest";
/// Mirrors the request
pub const MIRROR_REQUEST: &str = "mirrorRequest";

const DEFAULT_REDIRECT_STATUS: u16 = 302;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flow {
    Request,
    Response,
}

/// Convert an operation's policies into filters.
///
/// Unrecognised policies are skipped. A recognised policy with missing
/// parameters is an error naming the policy.
pub fn filters_from_policies(policies: &OperationPolicies) -> Result<Vec<Filter>, String> {
    let request = policies.request.iter().map(|p| (Flow::Request, p));
    let response = policies.response.iter().map(|p| (Flow::Response, p));

    let mut filters = Vec::new();
    for (flow, policy) in request.chain(response) {
        if let Some(filter) = to_filter(flow, policy)? {
            filters.push(filter);
        }
    }
    Ok(filters)
}

fn to_filter(flow: Flow, policy: &OperationPolicy) -> Result<Option<Filter>, String> {
    let policy_ref = PolicyRef {
        policy_name: policy.policy_name.clone(),
        policy_version: policy.policy_version.clone(),
    };

    let filter = match (policy.policy_name.as_str(), flow) {
        (ADD_HEADER, _) => {
            let changes = HeaderChanges {
                add_headers: vec![Header {
                    name: required_param(policy, "headerName")?,
                    value: optional_param(policy, "headerValue").unwrap_or_default(),
                }],
                remove_headers: Vec::new(),
            };
            header_modifier(policy_ref, flow, changes)
        }
        (REMOVE_HEADER, _) => {
            let changes = HeaderChanges {
                add_headers: Vec::new(),
                remove_headers: vec![required_param(policy, "headerName")?],
            };
            header_modifier(policy_ref, flow, changes)
        }
        (REDIRECT_REQUEST, Flow::Request) => Filter::Redirect {
            policy: policy_ref,
            url: required_param(policy, "url")?,
            status_code: policy
                .parameters
                .get("statusCode")
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(DEFAULT_REDIRECT_STATUS),
        },
        (MIRROR_REQUEST, Flow::Request) => {
            let urls = mirror_urls(policy);
            if urls.is_empty() {
                return Err(format!("policy {} requires parameter 'urls'", policy.policy_name));
            }
            Filter::Mirror {
                policy: policy_ref,
                urls,
            }
        }
        (name, _) => {
            debug!(policy = %name, "operation policy has no filter equivalent, skipping");
            return Ok(None);
        }
    };
    Ok(Some(filter))
}

fn header_modifier(policy: PolicyRef, flow: Flow, changes: HeaderChanges) -> Filter {
    let (request_headers, response_headers) = match flow {
        Flow::Request => (changes, HeaderChanges::default()),
        Flow::Response => (HeaderChanges::default(), changes),
    };
    Filter::HeaderModifier {
        policy,
        request_headers,
        response_headers,
    }
}

fn optional_param(policy: &OperationPolicy, key: &str) -> Option<String> {
    match policy.parameters.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn required_param(policy: &OperationPolicy, key: &str) -> Result<String, String> {
    optional_param(policy, key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("policy {} requires parameter '{}'", policy.policy_name, key))
}

fn mirror_urls(policy: &OperationPolicy) -> Vec<String> {
    match policy.parameters.get("urls").or_else(|| policy.parameters.get("url")) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
