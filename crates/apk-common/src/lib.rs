//! Common types for the APK agent: errors, retry, YAML and Kubernetes utilities

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the agent applies resources into when none is configured
pub const DEFAULT_NAMESPACE: &str = "apk";

/// Field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "apk-agent";

/// Standard name label key
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Managed-by label value for resources created by the agent
pub const LABEL_MANAGED_BY_AGENT: &str = "apk-agent";
