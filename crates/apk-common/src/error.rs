//! Error types for the APK agent
//!
//! Each variant carries the context of the failing stage.
//! [`Error::is_retryable`] classifies transient failures.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for APK agent operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Control plane rejected the request (4xx); retrying will not help
    #[error("control plane request failed with status {code}: {message}")]
    FetchUnrecoverable {
        /// HTTP status reported by the control plane
        code: u16,
        /// Error message as received
        message: String,
    },

    /// Control plane could not be reached or answered with a transient failure
    #[error("control plane unavailable (status {code}): {message}")]
    FetchRecoverable {
        /// HTTP status, or 0 when no response was received
        code: u16,
        /// Error message as received
        message: String,
    },

    /// The fetched artifact bundle is not a usable archive
    #[error("malformed artifact bundle: {message}")]
    ArchiveMalformed {
        /// Description of what is wrong
        message: String,
        /// Archive member involved, if any
        entry: Option<String>,
    },

    /// A per-API artifact inside the bundle could not be decoded
    #[error("artifact error for {api_file}: {message}")]
    Artifact {
        /// Archive member name of the API artifact
        api_file: String,
        /// Description of what failed
        message: String,
    },

    /// APK configuration could not be generated for an API
    #[error("config generation failed for {api}: {message}")]
    ConfigGeneration {
        /// API name and version
        api: String,
        /// Description of what failed
        message: String,
    },

    /// Cluster resources could not be generated for an API
    #[error("resource generation failed for {api}: {message}")]
    ResourceGeneration {
        /// API name and version
        api: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document or resource kind being processed (if known)
        kind: Option<String>,
    },

    /// Invalid agent configuration or precondition violation
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
        /// The offending configuration key (e.g., "controlPlane.serviceUrl")
        field: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "worker_pool", "apply")
        context: String,
    },
}

impl Error {
    /// Map a control plane error code onto the recoverable/unrecoverable split.
    ///
    /// Codes in `[400, 500)` are unrecoverable; everything else is retried.
    pub fn fetch(code: u16, message: impl Into<String>) -> Self {
        if (400..500).contains(&code) {
            Self::FetchUnrecoverable {
                code,
                message: message.into(),
            }
        } else {
            Self::FetchRecoverable {
                code,
                message: message.into(),
            }
        }
    }

    /// Create an archive error without member context
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::ArchiveMalformed {
            message: msg.into(),
            entry: None,
        }
    }

    /// Create an archive error for a specific archive member
    pub fn archive_entry(entry: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ArchiveMalformed {
            message: msg.into(),
            entry: Some(entry.into()),
        }
    }

    /// Create an artifact decoding error
    pub fn artifact(api_file: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Artifact {
            api_file: api_file.into(),
            message: msg.into(),
        }
    }

    /// Create a config generation error
    pub fn config_generation(api: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ConfigGeneration {
            api: api.into(),
            message: msg.into(),
        }
    }

    /// Create a resource generation error
    pub fn resource_generation(api: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ResourceGeneration {
            api: api.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with document/resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a specific key
    pub fn config_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Archive, artifact, generation and configuration errors need a change on
    /// the control plane or in the agent config. Kubernetes errors are retried
    /// unless the API server answered with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::FetchUnrecoverable { .. } => false,
            Error::FetchRecoverable { .. } => true,
            Error::ArchiveMalformed { .. } => false,
            Error::Artifact { .. } => false,
            Error::ConfigGeneration { .. } => false,
            Error::ResourceGeneration { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Status code reported by the control plane, for fetch errors
    pub fn fetch_code(&self) -> Option<u16> {
        match self {
            Error::FetchUnrecoverable { code, .. } | Error::FetchRecoverable { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}
