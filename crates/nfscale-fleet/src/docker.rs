//! Docker Engine backend over its HTTP API.
//!
//! ```text
//! list    GET    /containers/json?filters={"label":["<label>"]}
//! create  POST   /containers/create   → POST /containers/{id}/start
//! stop    POST   /containers/{id}/stop
//! remove  DELETE /containers/{id}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use nfscale_core::{HttpClient, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::backend::{BackendClient, BackendFuture, CreateRequest, ServiceHandle};
use crate::error::{BackendError, BackendResult};

/// A Docker daemon reachable at `host:port`.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    client: HttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateBody<'a> {
    image: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cmd: &'a [String],
    env: &'a [String],
    labels: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl DockerBackend {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(addr, timeout),
        }
    }

    pub fn addr(&self) -> &str {
        self.client.addr()
    }

    async fn list_inner(&self, label: &str) -> BackendResult<Vec<ServiceHandle>> {
        let filters = json!({ "label": [label] }).to_string();
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("filters", &filters)
            .finish();
        let path = format!("/containers/json?{query}");
        let resp = expect_success(self.client.get(&path).await?)?;
        let summaries: Vec<ContainerSummary> = resp
            .json()
            .map_err(|e| BackendError::Decode(format!("container list: {e}")))?;
        Ok(summaries
            .into_iter()
            .map(|c| ServiceHandle {
                id: c.id,
                created: c.created,
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_inner(&self, request: &CreateRequest) -> BackendResult<ServiceHandle> {
        let body = CreateBody {
            image: &request.image,
            cmd: &request.command,
            env: &request.environment,
            labels: &request.labels,
            host_config: request
                .network_mode
                .as_ref()
                .map(|mode| json!({ "NetworkMode": mode })),
        };
        let resp = expect_success(self.client.post_json("/containers/create", &body).await?)?;
        let created: CreateResponse = resp
            .json()
            .map_err(|e| BackendError::Decode(format!("create response: {e}")))?;
        for w in created.warnings.iter().flatten() {
            warn!(container = %created.id, warning = %w, "docker create warning");
        }

        let handle = ServiceHandle {
            id: created.id,
            created: now_secs(),
            labels: request.labels.clone(),
        };

        if request.detach {
            let start = self
                .client
                .post(&format!("/containers/{}/start", handle.id))
                .await
                .map_err(BackendError::from)
                .and_then(expect_success);
            if let Err(e) = start {
                // Do not leave a created-but-never-started container behind.
                if let Err(cleanup) = self.remove_inner(&handle).await {
                    warn!(container = %handle.id, error = %cleanup, "cleanup after failed start");
                }
                return Err(e);
            }
        }

        debug!(container = %handle.id, image = %request.image, "container started");
        Ok(handle)
    }

    async fn stop_inner(&self, handle: &ServiceHandle) -> BackendResult<()> {
        let resp = self
            .client
            .post(&format!("/containers/{}/stop", handle.id))
            .await?;
        // 304: already stopped.
        if resp.status.as_u16() == 304 {
            return Ok(());
        }
        expect_success(resp).map(|_| ())
    }

    async fn remove_inner(&self, handle: &ServiceHandle) -> BackendResult<()> {
        let resp = self
            .client
            .delete(&format!("/containers/{}", handle.id))
            .await?;
        expect_success(resp).map(|_| ())
    }
}

impl BackendClient for DockerBackend {
    fn list<'a>(&'a self, label: &'a str) -> BackendFuture<'a, Vec<ServiceHandle>> {
        Box::pin(self.list_inner(label))
    }

    fn create<'a>(&'a self, request: &'a CreateRequest) -> BackendFuture<'a, ServiceHandle> {
        Box::pin(self.create_inner(request))
    }

    fn stop<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()> {
        Box::pin(self.stop_inner(handle))
    }

    fn remove<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()> {
        Box::pin(self.remove_inner(handle))
    }
}

fn expect_success(resp: HttpResponse) -> BackendResult<HttpResponse> {
    if resp.is_success() {
        return Ok(resp);
    }
    let message = resp
        .json::<serde_json::Value>()
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| resp.text());
    Err(BackendError::RequestFailed {
        status: resp.status.as_u16(),
        message,
    })
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
