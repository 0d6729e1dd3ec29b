//! Outer artifact bundle: a zip holding `deployments.json` and one zip per API

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use serde::{Deserialize, Deserializer};
use tracing::trace;
use zip::ZipArchive;

use apk_common::yaml::decode_document;
use apk_common::{Error, Result};

/// Name of the deployment descriptor member
pub const DEPLOYMENTS_DESCRIPTOR: &str = "deployments.json";

/// `deployments.json`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeploymentDescriptor {
    /// Document type
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Document version
    #[serde(default)]
    pub version: String,
    /// Deployment list
    #[serde(default)]
    pub data: DeploymentData,
}

impl DeploymentDescriptor {
    /// Listed deployments; empty when the list is absent
    pub fn deployments(&self) -> &[Deployment] {
        self.data.deployments.as_deref().unwrap_or_default()
    }
}

/// Body of the deployment descriptor
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DeploymentData {
    /// One record per deployed API; may be absent
    #[serde(default)]
    pub deployments: Option<Vec<Deployment>>,
}

/// One deployed API
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Archive member holding the API's own zip
    pub api_file: String,
    /// Owning organization
    #[serde(default)]
    pub organization_id: String,
    /// Deployed revision
    #[serde(default, deserialize_with = "string_or_number")]
    pub revision_id: Option<String>,
    /// Gateway environments the API is deployed to
    #[serde(default)]
    pub environments: Vec<DeploymentEnvironment>,
}

/// Gateway environment of a deployment
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEnvironment {
    /// Environment name
    pub name: String,
    /// Virtual host the API is exposed on
    #[serde(default)]
    pub vhost: String,
    /// Environment type (hybrid, production, sandbox)
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    /// Deployment time (epoch millis)
    #[serde(default)]
    pub deployed_time_stamp: Option<i64>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Opened outer bundle with an index of its member names
pub struct ArtifactBundle {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    index: BTreeSet<String>,
}

impl ArtifactBundle {
    /// Open a bundle from its bytes.
    ///
    /// Only the central directory is read here. Member contents are
    /// decompressed by [`ArtifactBundle::read_member`], so an unreadable
    /// member fails that member alone.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::archive(format!("not a zip archive: {}", e)))?;

        let index: BTreeSet<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        trace!(members = index.len(), "indexed artifact bundle");
        Ok(Self { archive, index })
    }

    /// Whether the bundle has a member with this exact name
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Read a member; `None` when it does not exist
    pub fn read_member(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| Error::archive_entry(name, e.to_string()))?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| Error::archive_entry(name, format!("failed to read: {}", e)))?;
        Ok(Some(buf))
    }

    /// Read and decode `deployments.json`
    pub fn deployment_descriptor(&mut self) -> Result<DeploymentDescriptor> {
        let bytes = self.read_member(DEPLOYMENTS_DESCRIPTOR)?.ok_or_else(|| {
            Error::archive_entry(DEPLOYMENTS_DESCRIPTOR, "missing from artifact bundle")
        })?;
        decode_document(&bytes, DEPLOYMENTS_DESCRIPTOR).map_err(|e| {
            Error::archive_entry(DEPLOYMENTS_DESCRIPTOR, e.to_string())
        })
    }
}
