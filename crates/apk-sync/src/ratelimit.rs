//! Rate limit policies and token based AI rate limits
//!
//! Named request-count policies come from the agent configuration. AI rate
//! limits are derived per API from `maxTps` and are keyed in the cluster by a
//! fingerprint of the API name, version and stage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use apk_common::kube_utils::sha1_hex;

use crate::model::{EnvironmentType, MaxTps};

/// Name of the policy that disables request limiting
pub const UNLIMITED_POLICY: &str = "Unlimited";

/// Rate limit window
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum TimeUnit {
    /// Per second
    Second,
    /// Per minute
    #[default]
    Minute,
    /// Per hour
    Hour,
    /// Per day
    Day,
}

impl TimeUnit {
    /// Parse the spellings used by exported APIs and the config file
    /// (`sec`, `SECOND`, `min`, `Minute`, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Some(Self::Second),
            "m" | "min" | "minute" | "minutes" => Some(Self::Minute),
            "h" | "hour" | "hours" => Some(Self::Hour),
            "d" | "day" | "days" => Some(Self::Day),
            _ => None,
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown time unit '{}'", value))
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Second => "Second",
            Self::Minute => "Minute",
            Self::Hour => "Hour",
            Self::Day => "Day",
        };
        f.write_str(s)
    }
}

/// A named request-count policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    /// Policy name as referenced by APIs (e.g. `10KPerMin`)
    pub name: String,
    /// Requests allowed per unit
    pub requests_per_unit: u32,
    /// Window
    pub unit: TimeUnit,
}

impl RateLimitPolicy {
    /// Create a policy
    pub fn new(name: impl Into<String>, requests_per_unit: u32, unit: TimeUnit) -> Self {
        Self {
            name: name.into(),
            requests_per_unit,
            unit,
        }
    }
}

/// Policies every control plane ships with
pub fn default_policies() -> Vec<RateLimitPolicy> {
    vec![
        RateLimitPolicy::new("10KPerMin", 10_000, TimeUnit::Minute),
        RateLimitPolicy::new("20KPerMin", 20_000, TimeUnit::Minute),
        RateLimitPolicy::new("50KPerMin", 50_000, TimeUnit::Minute),
    ]
}

/// Lookup of named policies
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateLimitCatalog {
    policies: BTreeMap<String, RateLimitPolicy>,
}

impl RateLimitCatalog {
    /// Build a catalog; later entries replace earlier ones with the same name
    pub fn new(policies: impl IntoIterator<Item = RateLimitPolicy>) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    /// Resolve a policy reference.
    ///
    /// Empty names and [`UNLIMITED_POLICY`] mean "no limit" and resolve to
    /// `Ok(None)`. Unknown names are an error carrying the name.
    pub fn resolve(&self, name: Option<&str>) -> Result<Option<&RateLimitPolicy>, String> {
        let name = match name.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(n) if n.eq_ignore_ascii_case(UNLIMITED_POLICY) => return Ok(None),
            Some(n) => n,
        };
        self.policies
            .get(name)
            .map(Some)
            .ok_or_else(|| name.to_string())
    }

    /// Look up a policy by exact name
    pub fn get(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    /// Number of named policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Token based rate limit for one stage of an AI API
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRateLimit {
    /// Prompt (request) token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u32>,
    /// Completion (response) token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_token_count: Option<u32>,
    /// Total token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u32>,
    /// Window shared by the token and request limits
    pub time_unit: TimeUnit,
    /// Request count limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<u32>,
}

/// Derive the production and sandbox AI rate limits of an API.
///
/// Nothing is produced unless token based throttling is enabled. A stage gets
/// a limit when it has at least one token or request count configured.
pub fn ai_rate_limits(max_tps: Option<&MaxTps>) -> (Option<AiRateLimit>, Option<AiRateLimit>) {
    let Some(max_tps) = max_tps else {
        return (None, None);
    };
    let Some(tokens) = max_tps
        .token_based_throttling_configuration
        .as_ref()
        .filter(|t| t.is_token_based_throttling_enabled)
    else {
        return (None, None);
    };

    let production = build_ai_limit(
        tokens.production_max_prompt_token_count,
        tokens.production_max_completion_token_count,
        tokens.production_max_total_token_count,
        max_tps.production,
        max_tps.production_time_unit.as_deref(),
    );
    let sandbox = build_ai_limit(
        tokens.sandbox_max_prompt_token_count,
        tokens.sandbox_max_completion_token_count,
        tokens.sandbox_max_total_token_count,
        max_tps.sandbox,
        max_tps.sandbox_time_unit.as_deref(),
    );
    (production, sandbox)
}

fn build_ai_limit(
    prompt: Option<u32>,
    completion: Option<u32>,
    total: Option<u32>,
    requests: Option<u32>,
    unit: Option<&str>,
) -> Option<AiRateLimit> {
    if prompt.is_none() && completion.is_none() && total.is_none() && requests.is_none() {
        return None;
    }
    let time_unit = match unit {
        None => TimeUnit::default(),
        Some(u) => TimeUnit::parse(u).unwrap_or_else(|| {
            warn!(unit = %u, "unknown AI rate limit time unit, using Minute");
            TimeUnit::default()
        }),
    };
    Some(AiRateLimit {
        prompt_token_count: prompt,
        completion_token_count: completion,
        total_token_count: total,
        time_unit,
        request_count: requests,
    })
}

/// Cluster name of the AI rate limit policy of one API stage.
///
/// SHA-1 over name, version and stage with no separators, in hex. Generation
/// and cleanup both derive the name here so they always agree.
pub fn ai_policy_name(api_name: &str, api_version: &str, env: EnvironmentType) -> String {
    sha1_hex(&[api_name, api_version, env.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenThrottlingConfig;

    #[test]
    fn test_time_unit_parse_spellings() {
        assert_eq!(TimeUnit::parse("MINUTE"), Some(TimeUnit::Minute));
        assert_eq!(TimeUnit::parse("min"), Some(TimeUnit::Minute));
        assert_eq!(TimeUnit::parse("sec"), Some(TimeUnit::Second));
        assert_eq!(TimeUnit::parse("Hour"), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::parse("DAY"), Some(TimeUnit::Day));
        assert_eq!(TimeUnit::parse("fortnight"), None);
    }

    #[test]
    fn test_time_unit_serde_uses_capitalised_names() {
        let unit: TimeUnit = serde_json::from_str("\"min\"").unwrap();
        assert_eq!(serde_json::to_string(&unit).unwrap(), "\"Minute\"");
        assert!(serde_json::from_str::<TimeUnit>("\"week\"").is_err());
    }

    /// Story: API and operation throttling references resolve against the
    /// configured catalog; Unlimited and empty references mean no limit.
    #[test]
    fn story_catalog_resolution() {
        let catalog = RateLimitCatalog::new(default_policies());
        assert_eq!(catalog.len(), 3);

        let policy = catalog.resolve(Some("10KPerMin")).unwrap().unwrap();
        assert_eq!(policy.requests_per_unit, 10_000);
        assert_eq!(policy.unit, TimeUnit::Minute);

        assert_eq!(catalog.resolve(Some("Unlimited")), Ok(None));
        assert_eq!(catalog.resolve(Some("")), Ok(None));
        assert_eq!(catalog.resolve(None), Ok(None));

        assert_eq!(catalog.resolve(Some("1PerYear")), Err("1PerYear".to_string()));
    }

    #[test]
    fn test_catalog_later_entries_win() {
        let catalog = RateLimitCatalog::new(vec![
            RateLimitPolicy::new("Gold", 10, TimeUnit::Second),
            RateLimitPolicy::new("Gold", 20, TimeUnit::Second),
        ]);
        assert_eq!(catalog.get("Gold").unwrap().requests_per_unit, 20);
    }

    fn token_config(enabled: bool) -> MaxTps {
        MaxTps {
            production: Some(100),
            production_time_unit: Some("MINUTE".to_string()),
            sandbox: None,
            sandbox_time_unit: None,
            token_based_throttling_configuration: Some(TokenThrottlingConfig {
                is_token_based_throttling_enabled: enabled,
                production_max_prompt_token_count: Some(1000),
                production_max_completion_token_count: Some(2000),
                production_max_total_token_count: Some(3000),
                ..Default::default()
            }),
        }
    }

    /// Story: AI limits exist only when token throttling is switched on, and
    /// only for stages that have something configured.
    #[test]
    fn story_ai_rate_limits_from_max_tps() {
        let (prod, sand) = ai_rate_limits(Some(&token_config(true)));
        let prod = prod.unwrap();
        assert_eq!(prod.prompt_token_count, Some(1000));
        assert_eq!(prod.completion_token_count, Some(2000));
        assert_eq!(prod.total_token_count, Some(3000));
        assert_eq!(prod.request_count, Some(100));
        assert_eq!(prod.time_unit, TimeUnit::Minute);
        assert!(sand.is_none());

        assert_eq!(ai_rate_limits(Some(&token_config(false))), (None, None));
        assert_eq!(ai_rate_limits(None), (None, None));
    }

    #[test]
    fn test_ai_policy_name_is_sha1_of_name_version_stage() {
        let name = ai_policy_name("Chat", "1.0.0", EnvironmentType::Production);
        assert_eq!(name, sha1_hex(&["Chat1.0.0production"]));
        assert_eq!(name.len(), 40);
        assert_ne!(
            name,
            ai_policy_name("Chat", "1.0.0", EnvironmentType::Sandbox)
        );
    }
}
