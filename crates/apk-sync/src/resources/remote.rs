//! Resource generation through a remote config deployer
//!
//! The APK-Conf and the interface definition are posted as a multipart form;
//! the deployer answers with a zip of YAML resource documents.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};
use zip::ZipArchive;

use apk_common::yaml::parse_yaml_multi;
use apk_common::{Error, Result};

use super::{supporting_resources, CertContainer, ResourceGenerator, ResourceSet};
use crate::apkconf::GeneratedConfig;

/// Multipart field carrying the APK-Conf YAML
pub const APK_CONFIGURATION_FIELD: &str = "apkConfiguration";
/// Multipart field carrying the interface definition
pub const DEFINITION_FILE_FIELD: &str = "definitionFile";

/// Generator delegating to a config deployer service
#[derive(Debug)]
pub struct RemoteResourceGenerator {
    http: reqwest::Client,
    endpoint: Url,
}

impl RemoteResourceGenerator {
    /// Generator posting to `endpoint` with the given client
    pub fn new(endpoint: &str, http: reqwest::Client) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            Error::config_for_field("dataPlane.k8sResourceEndpoint", format!("invalid URL: {}", e))
        })?;
        Ok(Self { http, endpoint })
    }

    fn request_url(&self, organization: &str) -> Url {
        let mut url = self.endpoint.clone();
        if !organization.is_empty() {
            url.query_pairs_mut().append_pair("organization", organization);
        }
        url
    }

    async fn post(
        &self,
        config: &GeneratedConfig,
        schema: Option<&str>,
    ) -> std::result::Result<Vec<u8>, String> {
        let apk_conf = serde_yaml::to_string(&config.apk_conf)
            .map_err(|e| format!("failed to serialize APK configuration: {}", e))?;

        let mut form = Form::new().part(
            APK_CONFIGURATION_FIELD,
            Part::text(apk_conf).file_name("api.apk-conf"),
        );
        if let Some(schema) = schema {
            form = form.part(
                DEFINITION_FILE_FIELD,
                Part::text(schema.to_string()).file_name("definition"),
            );
        }

        let url = self.request_url(&config.organization);
        debug!(url = %url, api = %config.api, "requesting resources from config deployer");
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("config deployer request failed: {}", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read config deployer response: {}", e))?;
        if !status.is_success() {
            return Err(format!(
                "config deployer returned {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            ));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ResourceGenerator for RemoteResourceGenerator {
    async fn generate(
        &self,
        config: &GeneratedConfig,
        schema: Option<String>,
        certs: &CertContainer,
    ) -> Result<ResourceSet> {
        let fail = |msg: String| Error::resource_generation(config.api.to_string(), msg);

        let bytes = self.post(config, schema.as_deref()).await.map_err(&fail)?;
        let mut resources = supporting_resources(config, certs)?;
        resources.extend(resources_from_zip(&bytes).map_err(&fail)?);

        debug!(
            api = %config.api,
            resources = resources.len(),
            "received resources from config deployer"
        );
        Ok(ResourceSet::new(resources))
    }
}

/// Resource objects from every YAML member of a zip
pub fn resources_from_zip(bytes: &[u8]) -> std::result::Result<Vec<Value>, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("config deployer response is not a zip: {}", e))?;

    let mut resources = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| format!("unreadable zip entry {}: {}", i, e))?;
        let name = file.name().to_string();
        if file.is_dir() || !(name.ends_with(".yaml") || name.ends_with(".yml")) {
            continue;
        }

        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| format!("failed to read {}: {}", name, e))?;
        let docs = parse_yaml_multi(&text).map_err(|e| format!("invalid YAML in {}: {}", name, e))?;
        for doc in docs {
            if doc.is_object() {
                resources.push(doc);
            } else {
                warn!(entry = %name, "ignoring non-object YAML document");
            }
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::zip_of;
    use apk_common::kube_utils::{object_kind, object_name};

    #[test]
    fn story_zip_members_become_resources() {
        let api = "apiVersion: dp.wso2.com/v1alpha3\nkind: API\nmetadata:\n  name: pets\n";
        let routes = "kind: HTTPRoute\nmetadata:\n  name: r1\n---\nkind: HTTPRoute\nmetadata:\n  name: r2\n---\n";
        let bytes = zip_of(&[
            ("pets/API.yaml", api.as_bytes()),
            ("pets/routes.yml", routes.as_bytes()),
            ("pets/README.txt", b"not yaml"),
            ("pets/list.yaml", b"- just\n- a list\n"),
        ]);

        let resources = resources_from_zip(&bytes).unwrap();
        let names: Vec<(&str, &str)> = resources
            .iter()
            .map(|r| (object_kind(r), object_name(r)))
            .collect();
        assert_eq!(
            names,
            vec![("API", "pets"), ("HTTPRoute", "r1"), ("HTTPRoute", "r2")]
        );
    }

    #[test]
    fn test_bad_responses_are_errors() {
        assert!(resources_from_zip(b"not a zip").is_err());
        let bytes = zip_of(&[("bad.yaml", b"key: [unclosed")]);
        let err = resources_from_zip(&bytes).unwrap_err();
        assert!(err.contains("bad.yaml"));
    }

    #[test]
    fn test_request_url_carries_organization() {
        let generator = RemoteResourceGenerator::new(
            "https://config-ds:9443/api/configurator/apis/generate-k8s-resources",
            reqwest::Client::new(),
        )
        .unwrap();
        let url = generator.request_url("carbon.super");
        assert_eq!(url.path(), "/api/configurator/apis/generate-k8s-resources");
        assert_eq!(url.query(), Some("organization=carbon.super"));
        assert_eq!(generator.request_url("").query(), None);
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = RemoteResourceGenerator::new("not a url", reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    /// Story: an unreachable deployer fails generation for that API only,
    /// as a resource generation error naming the API.
    #[tokio::test]
    async fn story_unreachable_deployer_is_resource_error() {
        let generator =
            RemoteResourceGenerator::new("http://127.0.0.1:9/generate", reqwest::Client::new())
                .unwrap();
        let config = crate::testutil::pizza_config();
        let certs = CertContainer::new(&Default::default(), &config.base_name);
        let err = generator.generate(&config, None, &certs).await.unwrap_err();
        match err {
            Error::ResourceGeneration { api, .. } => assert_eq!(api, "PizzaShackAPI:1.0.0"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
