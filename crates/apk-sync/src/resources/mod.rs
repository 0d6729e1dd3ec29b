//! Cluster resource generation
//!
//! A [`ResourceGenerator`] turns a [`GeneratedConfig`] into a [`ResourceSet`]
//! of JSON objects. Two implementations exist:
//!
//! - [`LocalResourceGenerator`] builds the data plane resources in-process
//! - [`RemoteResourceGenerator`] posts the APK-Conf to a config deployer and
//!   reads back the resources it returns
//!
//! Both emit the same supporting objects (credential secrets and certificate
//! config maps). [`tag_resources`] then stamps placement metadata onto the
//! set before it is applied.

pub mod local;
pub mod remote;
pub mod tagging;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sObjectMeta;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::Value;

use apk_common::kube_utils::{object_kind, sanitize_label_value};
use apk_common::{Error, Result, LABEL_MANAGED_BY, LABEL_MANAGED_BY_AGENT, LABEL_NAME};

use crate::apkconf::generator::{
    API_KEY_NAME_KEY, API_KEY_VALUE_KEY, BASIC_PASSWORD_KEY, BASIC_USERNAME_KEY,
};
use crate::apkconf::{
    cert_key, client_cert_config_map_name, endpoint_cert_config_map_name, EndpointCredentials,
    GeneratedConfig,
};
use crate::archive::DeploymentEnvironment;
use crate::artifact::CertArtifact;

pub use local::LocalResourceGenerator;
pub use remote::RemoteResourceGenerator;
pub use tagging::tag_resources;

/// Where and for whom a resource set is deployed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    /// Target namespace
    pub namespace: String,
    /// Owning organization
    pub organization: String,
    /// Gateway environments the API is deployed to
    pub environments: Vec<DeploymentEnvironment>,
    /// API UUID
    pub api_uuid: String,
    /// Deployed revision
    pub revision_id: String,
}

/// Resources of one API plus their placement once tagged
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceSet {
    /// Resource objects with apiVersion, kind and metadata
    pub resources: Vec<Value>,
    /// Set by [`tag_resources`]
    pub placement: Option<Placement>,
}

impl ResourceSet {
    /// Untagged set
    pub fn new(resources: Vec<Value>) -> Self {
        Self {
            resources,
            placement: None,
        }
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources of one kind
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.resources.iter().filter(move |r| object_kind(r) == kind)
    }

    /// Tagged namespace, if any
    pub fn namespace(&self) -> Option<&str> {
        self.placement
            .as_ref()
            .map(|p| p.namespace.as_str())
            .filter(|ns| !ns.is_empty())
    }
}

/// Certificates of one API keyed the way the APK-Conf references them
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertContainer {
    /// Backend CA certificates: config map key to PEM
    pub endpoint_certificates: BTreeMap<String, String>,
    /// Client certificates for mTLS: config map key to PEM
    pub client_certificates: BTreeMap<String, String>,
    /// Config map holding the backend certificates
    pub endpoint_config_map: String,
    /// Config map holding the client certificates
    pub client_config_map: String,
}

impl CertContainer {
    /// Index the certificates of an artifact under the API's base name
    pub fn new(certs: &CertArtifact, base_name: &str) -> Self {
        Self {
            endpoint_certificates: certs
                .endpoint_certificates
                .iter()
                .map(|c| (cert_key(&c.alias), c.pem.clone()))
                .collect(),
            client_certificates: certs
                .client_certificates
                .iter()
                .map(|c| (cert_key(&c.alias), c.pem.clone()))
                .collect(),
            endpoint_config_map: endpoint_cert_config_map_name(base_name),
            client_config_map: client_cert_config_map_name(base_name),
        }
    }
}

/// Produces the cluster resources of one API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceGenerator: Send + Sync {
    /// Generate untagged resources from a generated configuration and the
    /// API's interface definition
    async fn generate(
        &self,
        config: &GeneratedConfig,
        schema: Option<String>,
        certs: &CertContainer,
    ) -> Result<ResourceSet>;
}

// =============================================================================
// Supporting objects
// =============================================================================

fn core_meta(name: &str) -> K8sObjectMeta {
    K8sObjectMeta {
        name: Some(name.to_string()),
        labels: Some(BTreeMap::from([
            (LABEL_NAME.to_string(), sanitize_label_value(name)),
            (
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_AGENT.to_string(),
            ),
        ])),
        ..Default::default()
    }
}

/// Serialize a typed resource into the JSON form kept in a [`ResourceSet`]
pub(crate) fn to_object<T: Serialize>(kind: &str, resource: &T) -> Result<Value> {
    serde_json::to_value(resource).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

/// Config map with string data
pub(crate) fn config_map(name: &str, data: BTreeMap<String, String>) -> Result<Value> {
    let cm = ConfigMap {
        metadata: core_meta(name),
        data: Some(data),
        ..Default::default()
    };
    to_object("ConfigMap", &cm)
}

/// Credential secrets and certificate config maps of an API
pub fn supporting_resources(config: &GeneratedConfig, certs: &CertContainer) -> Result<Vec<Value>> {
    let mut out = Vec::new();

    for secret in &config.endpoint_secrets {
        let data = match &secret.credentials {
            EndpointCredentials::Basic { username, password } => BTreeMap::from([
                (BASIC_USERNAME_KEY.to_string(), username.clone()),
                (BASIC_PASSWORD_KEY.to_string(), password.clone()),
            ]),
            EndpointCredentials::ApiKey { name, value } => BTreeMap::from([
                (API_KEY_NAME_KEY.to_string(), name.clone()),
                (API_KEY_VALUE_KEY.to_string(), value.clone()),
            ]),
        };
        let s = Secret {
            metadata: core_meta(&secret.secret_name),
            string_data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        out.push(to_object("Secret", &s)?);
    }

    if !certs.endpoint_certificates.is_empty() {
        out.push(config_map(
            &certs.endpoint_config_map,
            certs.endpoint_certificates.clone(),
        )?);
    }
    if !certs.client_certificates.is_empty() {
        out.push(config_map(
            &certs.client_config_map,
            certs.client_certificates.clone(),
        )?);
    }

    Ok(out)
}
