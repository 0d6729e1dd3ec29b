//! Fixtures shared by the unit tests: in-memory zips and a sample API

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Certificate-shaped PEM; never parsed as X.509
pub const TEST_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIUQ2F0ZXN0\n-----END CERTIFICATE-----\n";

/// Organization used by the fixtures
pub const TEST_ORG: &str = "carbon.super";

/// A REST API exercising endpoints, security, policies and throttling
pub const PIZZA_API_YAML: &str = r#"
type: api
version: v4.3.0
data:
  id: 8f2c4b1e-0a41-4b8e-9a3c-1d2e3f4a5b6c
  name: PizzaShackAPI
  version: 1.0.0
  context: /pizzashack/1.0.0
  type: HTTP
  isDefaultVersion: true
  securityScheme: [oauth2, api_key, oauth_basic_auth_api_key_mandatory]
  apiThrottlingPolicy: 10KPerMin
  endpointConfig:
    endpoint_type: http
    production_endpoints:
      url: https://pizza.example.com/v1
    sandbox_endpoints:
      url: http://sandbox.pizza.example.com:8080/v1
    endpoint_security:
      production:
        enabled: true
        type: BASIC
        username: admin
        password: secret
  corsConfiguration:
    corsConfigurationEnabled: true
    accessControlAllowOrigins: ["*"]
    accessControlAllowMethods: [GET, POST]
  operations:
    - target: /menu
      verb: GET
      authType: Any
      throttlingPolicy: Unlimited
    - target: /order
      verb: POST
      authType: Any
      throttlingPolicy: 20KPerMin
      scopes: ["order:write"]
      operationPolicies:
        request:
          - policyName: addHeader
            policyVersion: v1
            parameters:
              headerName: x-source
              headerValue: apk
        response:
          - policyName: removeHeader
            parameters:
              headerName: x-internal
    - target: /health
      verb: GET
      authType: None
  additionalProperties:
    - name: team
      value: pizza
"#;

/// Build a zip with the given members, stored uncompressed
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Rewrite the compression method recorded for `member` in both its local
/// header and its central directory record
pub fn with_compression_method(mut zip: Vec<u8>, member: &str, method: u16) -> Vec<u8> {
    const LOCAL: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
    const CENTRAL: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
    let name = member.as_bytes();
    let field = |buf: &[u8], at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]) as usize;

    let mut patched = 0;
    let mut i = 0;
    while i + 46 <= zip.len() {
        let (method_at, name_len_at, name_at) = match &zip[i..i + 4] {
            sig if sig == LOCAL => (8, 26, 30),
            sig if sig == CENTRAL => (10, 28, 46),
            _ => {
                i += 1;
                continue;
            }
        };
        let len = field(&zip, i + name_len_at);
        let start = i + name_at;
        if len == name.len() && zip.get(start..start + len) == Some(name) {
            zip[i + method_at..i + method_at + 2].copy_from_slice(&method.to_le_bytes());
            patched += 1;
        }
        i += 4;
    }
    assert_eq!(patched, 2, "member {member} not found in zip");
    zip
}

/// Build a project zip with every member under `root/`
pub fn api_zip(root: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let named: Vec<(String, &[u8])> = entries
        .iter()
        .map(|(name, content)| (format!("{}/{}", root, name), *content))
        .collect();
    let borrowed: Vec<(&str, &[u8])> = named.iter().map(|(n, c)| (n.as_str(), *c)).collect();
    zip_of(&borrowed)
}

/// Project zip holding only the sample API definition
pub fn pizza_api_zip() -> Vec<u8> {
    api_zip(
        "PizzaShackAPI-1.0.0",
        &[
            ("api.yaml", PIZZA_API_YAML.as_bytes()),
            ("Definitions/swagger.yaml", b"openapi: 3.0.1\ninfo:\n  title: PizzaShackAPI\n"),
        ],
    )
}

/// `deployments.json` listing `(apiFile, organization, environments)` records
pub fn deployments_json(records: &[(&str, &str, &[(&str, &str)])]) -> String {
    let deployments: Vec<serde_json::Value> = records
        .iter()
        .map(|(api_file, org, envs)| {
            serde_json::json!({
                "apiFile": api_file,
                "organizationId": org,
                "environments": envs
                    .iter()
                    .map(|(name, vhost)| serde_json::json!({"name": name, "vhost": vhost}))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({
        "type": "deployments",
        "version": "v4.3.0",
        "data": {"deployments": deployments},
    })
    .to_string()
}

/// The sample API run through the config generator with the default catalog
pub fn pizza_config() -> crate::apkconf::GeneratedConfig {
    use crate::apkconf::ConfigGenerator;
    use crate::artifact::CertArtifact;
    use crate::model::ApiProject;
    use crate::ratelimit::{default_policies, RateLimitCatalog};

    let api = apk_common::yaml::decode_document::<ApiProject>(PIZZA_API_YAML.as_bytes(), "api.yaml")
        .unwrap()
        .data;
    ConfigGenerator::new(RateLimitCatalog::new(default_policies()))
        .generate(&api, &CertArtifact::default(), &[], TEST_ORG)
        .config
        .unwrap()
}

/// A deployment environment with the given name and vhost
pub fn environment(name: &str, vhost: &str) -> crate::archive::DeploymentEnvironment {
    crate::archive::DeploymentEnvironment {
        name: name.to_string(),
        vhost: vhost.to_string(),
        ..Default::default()
    }
}
