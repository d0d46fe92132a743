//! HTTP client for the render backend.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ComfyError, ComfyResult};
use crate::graph::RenderGraph;

/// Reference to a rendered output asset, as reported by job history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Backend folder kind ("output", "temp", ...)
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Render backend API client.
pub struct ComfyClient {
    base_url: String,
    client_id: String,
    http: Client,
}

impl ComfyClient {
    /// Create a client for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            client_id: Uuid::new_v4().to_string(),
            http: Client::new(),
        }
    }

    /// Submit a render job. Fails when the backend returns no job id.
    pub async fn queue_prompt(&self, graph: &RenderGraph) -> ComfyResult<String> {
        let payload = serde_json::json!({
            "prompt": graph.to_prompt(),
            "client_id": self.client_id,
        });

        let response = self
            .http
            .post(format!("{}/prompt", self.base_url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ComfyError::api(format!("queue returned {}: {}", status, body)));
        }

        let body: Value = response.json().await?;
        body.get("prompt_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ComfyError::queue_rejected("no prompt_id in queue response"))
    }

    /// Single non-blocking poll of job history.
    ///
    /// Returns the first output image found in any output node, or `None`
    /// when the job has not finished yet.
    pub async fn poll_output(&self, prompt_id: &str) -> ComfyResult<Option<AssetRef>> {
        let response = self
            .http
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ComfyError::api(format!(
                "history returned {}",
                response.status()
            )));
        }

        let history: Value = response.json().await?;
        let Some(entry) = history.get(prompt_id) else {
            return Ok(None);
        };

        let outputs = entry.get("outputs").and_then(|o| o.as_object());
        let Some(outputs) = outputs else {
            return Ok(None);
        };

        for node_output in outputs.values() {
            if let Some(images) = node_output.get("images").and_then(|i| i.as_array()) {
                if let Some(first) = images.first() {
                    let asset: AssetRef = serde_json::from_value(first.clone())?;
                    debug!("Job {} produced {}", prompt_id, asset.filename);
                    return Ok(Some(asset));
                }
            }
        }

        Ok(None)
    }

    /// Download the rendered bytes for an asset.
    pub async fn fetch_asset(&self, asset: &AssetRef) -> ComfyResult<Vec<u8>> {
        let url = format!(
            "{}/view?filename={}&subfolder={}&type={}",
            self.base_url,
            urlencoding::encode(&asset.filename),
            urlencoding::encode(&asset.subfolder),
            urlencoding::encode(&asset.kind),
        );

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ComfyError::api(format!(
                "view returned {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Query the backend's introspection endpoint for one node class.
    pub async fn object_info(&self, node_class: &str) -> ComfyResult<Value> {
        let response = self
            .http
            .get(format!("{}/object_info/{}", self.base_url, node_class))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ComfyError::api(format!(
                "object_info returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Ask the backend to release model memory between jobs. Best-effort;
    /// callers ignore failures.
    pub async fn free_memory(&self) -> ComfyResult<()> {
        self.http
            .post(format!("{}/free", self.base_url))
            .json(&serde_json::json!({ "unload_models": true, "free_memory": true }))
            .send()
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: Uuid::new_v4().to_string(),
            http: Client::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderGraph;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graph() -> RenderGraph {
        RenderGraph::new("model.safetensors", "a wolf at dawn")
    }

    #[tokio::test]
    async fn test_queue_prompt_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"prompt_id": "abc-123"})),
            )
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        let id = client.queue_prompt(&graph()).await.unwrap();
        assert_eq!(id, "abc-123");
    }

    #[tokio::test]
    async fn test_queue_prompt_without_id_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        match client.queue_prompt(&graph()).await {
            Err(ComfyError::QueueRejected(_)) => {}
            other => panic!("expected QueueRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_queue_prompt_sends_client_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_partial_json(serde_json::json!({"prompt": {}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"prompt_id": "x"})),
            )
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        assert!(client.queue_prompt(&graph()).await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_output_not_finished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        assert_eq!(client.poll_output("job-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_poll_output_finds_first_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "job-1": {
                    "outputs": {
                        "7": {
                            "images": [
                                {"filename": "out_00001_.png", "subfolder": "", "type": "output"}
                            ]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        let asset = client.poll_output("job-1").await.unwrap().unwrap();
        assert_eq!(asset.filename, "out_00001_.png");
        assert_eq!(asset.kind, "output");
    }

    #[tokio::test]
    async fn test_fetch_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view"))
            .and(query_param("filename", "out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
            .mount(&server)
            .await;

        let client = ComfyClient::for_base_url(server.uri());
        let asset = AssetRef {
            filename: "out.png".to_string(),
            subfolder: String::new(),
            kind: "output".to_string(),
        };
        let bytes = client.fetch_asset(&asset).await.unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4e, 0x47]);
    }
}
