//! HTTP transport to the control plane gateway REST API

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use tracing::debug;

use apk_common::{Error, Result};

use super::{ControlPlaneTransport, FetchRequest, SyncResponse};
use crate::config::AgentConfig;

/// Path prefix of the gateway artifact API
pub const GATEWAY_API_PATH: &str = "/api/am/gateway/v2";

/// Build a reqwest client with the agent's TLS and timeout settings
pub fn build_http_client(
    timeout: Duration,
    trust_store: Option<&Path>,
    skip_ssl_verification: bool,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);

    if let Some(path) = trust_store {
        let pem = std::fs::read(path).map_err(|e| {
            Error::config_for_field(
                "agent.trustStore.location",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            Error::config_for_field(
                "agent.trustStore.location",
                format!("invalid CA bundle: {}", e),
            )
        })?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }
    if skip_ssl_verification {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| Error::internal_with_context("http_client", e.to_string()))
}

/// Control plane transport over HTTPS with basic auth
pub struct HttpControlPlaneClient {
    http: reqwest::Client,
    base: Url,
    username: String,
    password: String,
}

impl HttpControlPlaneClient {
    /// Create a transport from the agent configuration
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let cp = &config.control_plane;
        let base = Url::parse(&cp.service_url).map_err(|e| {
            Error::config_for_field("controlPlane.serviceUrl", format!("invalid URL: {}", e))
        })?;
        let http = build_http_client(
            cp.http_client.request_timeout(),
            config.agent.trust_store.location.as_deref(),
            cp.skip_ssl_verification,
        )?;
        Ok(Self {
            http,
            base,
            username: cp.username.clone(),
            password: cp.password.clone(),
        })
    }

    /// Full request URL: endpoint path, one `gatewayLabel` per label, the
    /// optional `apiId` and `type=APK` when resource types are requested
    pub fn request_url(&self, request: &FetchRequest) -> Url {
        request_url(&self.base, request)
    }
}

fn request_url(base: &Url, request: &FetchRequest) -> Url {
    let mut url = base.clone();
    let path = format!(
        "{}{}/{}",
        base.path().trim_end_matches('/'),
        GATEWAY_API_PATH,
        request.endpoint.trim_start_matches('/')
    );
    url.set_path(&path);
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        if let Some(api_id) = request.api_id.as_deref().filter(|id| !id.is_empty()) {
            query.append_pair("apiId", api_id);
        }
        for label in &request.environment_labels {
            query.append_pair("gatewayLabel", label);
        }
        if request.include_resource_types {
            query.append_pair("type", "APK");
        }
    }
    url
}

/// Map a completed HTTP exchange onto a [`SyncResponse`]
fn classify(status: StatusCode, body: Vec<u8>) -> SyncResponse {
    if status == StatusCode::OK {
        if body.is_empty() {
            SyncResponse::NotFound
        } else {
            SyncResponse::Found(body)
        }
    } else {
        let text = String::from_utf8_lossy(&body).trim().to_string();
        let message = if text.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        } else {
            text
        };
        SyncResponse::Error {
            code: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ControlPlaneTransport for HttpControlPlaneClient {
    async fn fetch(&self, request: &FetchRequest) -> SyncResponse {
        let url = self.request_url(request);
        debug!(url = %url, "requesting artifacts from control plane");

        let response = match self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/zip")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return SyncResponse::Error {
                    code: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                }
            }
        };

        let status = response.status();
        match response.bytes().await {
            Ok(body) => classify(status, body.to_vec()),
            Err(e) => SyncResponse::Error {
                code: 0,
                message: format!("failed to read response body: {}", e),
            },
        }
    }
}
