//! Per-API artifact decoding
//!
//! Each deployed API arrives as its own zip. All files sit under one project
//! directory (`PizzaShackAPI-1.0.0/api.yaml`, ...), which is stripped before
//! matching well-known paths.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use zip::ZipArchive;

use apk_common::yaml::decode_document;
use apk_common::{Error, Result};

use crate::model::{
    ApiDefinition, ApiProject, ApimEndpoint, CertificatesDocument, ClientCertificateEntry,
    EndpointCertificateEntry, EndpointsDocument, EnvironmentType,
};

const API_DESCRIPTORS: [&str; 2] = ["api.yaml", "api.json"];
const ENDPOINT_DESCRIPTORS: [&str; 2] = ["endpoints.yaml", "endpoints.json"];
const DEFINITION_FILES: [&str; 6] = [
    "Definitions/swagger.yaml",
    "Definitions/swagger.json",
    "Definitions/schema.graphql",
    "Definitions/asyncapi.yaml",
    "Definitions/asyncapi.json",
    "Definitions/api.proto",
];
const ENDPOINT_CERT_DIR: &str = "Endpoint-certificates";
const CLIENT_CERT_DIR: &str = "Client-certificates";

/// Backend TLS certificate for one endpoint URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointCertificate {
    /// Alias
    pub alias: String,
    /// Endpoint URL the certificate is for
    pub endpoint: String,
    /// PEM content
    pub pem: String,
}

/// Client certificate used for mutual TLS
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Alias
    pub alias: String,
    /// Subscription tier
    pub tier_name: Option<String>,
    /// Stage the certificate applies to; both when `None`
    pub key_type: Option<EnvironmentType>,
    /// PEM content
    pub pem: String,
}

/// Certificates shipped with an API
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertArtifact {
    /// Client certificates for mutual TLS
    pub client_certificates: Vec<ClientCertificate>,
    /// Backend certificates
    pub endpoint_certificates: Vec<EndpointCertificate>,
}

impl CertArtifact {
    /// Whether there are no certificates at all
    pub fn is_empty(&self) -> bool {
        self.client_certificates.is_empty() && self.endpoint_certificates.is_empty()
    }
}

/// Decoded per-API artifact
#[derive(Clone, Debug, PartialEq)]
pub struct ApiArtifact {
    /// The API definition
    pub api: ApiDefinition,
    /// Interface definition (OpenAPI, GraphQL SDL, ...)
    pub schema: Option<String>,
    /// Endpoints declared in `endpoints.yaml`
    pub endpoints: Vec<ApimEndpoint>,
    /// Certificates
    pub certs: CertArtifact,
}

/// Decode an API's zip as named by `api_file` in the deployment descriptor
pub fn decode_api_artifact(api_file: &str, bytes: &[u8]) -> Result<ApiArtifact> {
    let files = read_project_files(api_file, bytes)?;

    let api_path = API_DESCRIPTORS
        .iter()
        .find(|p| files.contains_key(**p))
        .ok_or_else(|| Error::artifact(api_file, "no api.yaml or api.json in artifact"))?;
    let project: ApiProject = decode(api_file, api_path, &files[*api_path])?;

    let schema = match DEFINITION_FILES.iter().find(|p| files.contains_key(**p)) {
        Some(path) => Some(
            String::from_utf8(files[*path].clone())
                .map_err(|_| Error::artifact(api_file, format!("{} is not valid UTF-8", path)))?,
        ),
        None => None,
    };

    let endpoints = match ENDPOINT_DESCRIPTORS.iter().find(|p| files.contains_key(**p)) {
        Some(path) => decode::<EndpointsDocument>(api_file, path, &files[*path])?.data,
        None => Vec::new(),
    };

    let certs = CertArtifact {
        endpoint_certificates: endpoint_certificates(api_file, &files)?,
        client_certificates: client_certificates(api_file, &files)?,
    };

    debug!(
        api_file = %api_file,
        api = %project.data.name,
        has_schema = schema.is_some(),
        endpoints = endpoints.len(),
        certificates = certs.endpoint_certificates.len() + certs.client_certificates.len(),
        "decoded API artifact"
    );

    Ok(ApiArtifact {
        api: project.data,
        schema,
        endpoints,
        certs,
    })
}

/// Read every file of the inner zip keyed by its path relative to the
/// project directory (the directory holding the API descriptor).
fn read_project_files(api_file: &str, bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::artifact(api_file, format!("not a zip archive: {}", e)))?;

    let mut raw = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::artifact(api_file, format!("unreadable member: {}", e)))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| Error::artifact(api_file, format!("failed to read {}: {}", name, e)))?;
        raw.push((name, buf));
    }

    let root = project_root(raw.iter().map(|(n, _)| n.as_str()))
        .ok_or_else(|| Error::artifact(api_file, "no api.yaml or api.json in artifact"))?;

    Ok(raw
        .into_iter()
        .filter_map(|(name, buf)| {
            name.strip_prefix(root.as_str())
                .map(|relative| (relative.to_string(), buf))
        })
        .collect())
}

/// Directory prefix (with trailing `/`, or empty) of the shallowest API descriptor
fn project_root<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    names
        .filter_map(|name| {
            let (dir, file) = match name.rsplit_once('/') {
                Some((dir, file)) => (format!("{}/", dir), file),
                None => (String::new(), name),
            };
            API_DESCRIPTORS.contains(&file).then_some(dir)
        })
        .min_by_key(|dir| dir.matches('/').count())
}

fn decode<T: DeserializeOwned>(api_file: &str, path: &str, bytes: &[u8]) -> Result<T> {
    decode_document(bytes, path).map_err(|e| Error::artifact(api_file, e.to_string()))
}

/// Descriptor of a certificate directory, YAML or JSON
fn cert_descriptor<'a>(
    files: &'a BTreeMap<String, Vec<u8>>,
    dir: &str,
    stem: &str,
) -> Option<(String, &'a Vec<u8>)> {
    ["yaml", "json"].iter().find_map(|ext| {
        let path = format!("{}/{}.{}", dir, stem, ext);
        files.get(&path).map(|bytes| (path, bytes))
    })
}

/// The PEM a descriptor entry points at: a file in the same directory, or
/// inline PEM content
fn resolve_pem(files: &BTreeMap<String, Vec<u8>>, dir: &str, reference: &str) -> Option<String> {
    if reference.trim_start().starts_with("-----BEGIN") {
        return Some(reference.to_string());
    }
    files
        .get(&format!("{}/{}", dir, reference))
        .and_then(|bytes| String::from_utf8(bytes.clone()).ok())
}

fn endpoint_certificates(
    api_file: &str,
    files: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<EndpointCertificate>> {
    let Some((path, bytes)) = cert_descriptor(files, ENDPOINT_CERT_DIR, "endpoint_certificates")
    else {
        return Ok(Vec::new());
    };
    let doc: CertificatesDocument<EndpointCertificateEntry> = decode(api_file, &path, bytes)?;

    Ok(doc
        .data
        .into_iter()
        .filter_map(|entry| match resolve_pem(files, ENDPOINT_CERT_DIR, &entry.certificate) {
            Some(pem) => Some(EndpointCertificate {
                alias: entry.alias,
                endpoint: entry.endpoint,
                pem,
            }),
            None => {
                warn!(
                    api_file = %api_file,
                    alias = %entry.alias,
                    "endpoint certificate file missing, skipping"
                );
                None
            }
        })
        .collect())
}

fn client_certificates(
    api_file: &str,
    files: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<ClientCertificate>> {
    let Some((path, bytes)) = cert_descriptor(files, CLIENT_CERT_DIR, "client_certificates") else {
        return Ok(Vec::new());
    };
    let doc: CertificatesDocument<ClientCertificateEntry> = decode(api_file, &path, bytes)?;

    Ok(doc
        .data
        .into_iter()
        .filter_map(|entry| match resolve_pem(files, CLIENT_CERT_DIR, &entry.certificate) {
            Some(pem) => Some(ClientCertificate {
                alias: entry.alias,
                tier_name: entry.tier_name,
                key_type: entry.key_type,
                pem,
            }),
            None => {
                warn!(
                    api_file = %api_file,
                    alias = %entry.alias,
                    "client certificate file missing, skipping"
                );
                None
            }
        })
        .collect())
}
