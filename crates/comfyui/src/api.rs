//! HTTP client for the ComfyUI endpoints the pipeline talks to.
//!
//! Wraps workflow submission, introspection, history, file download and
//! cancellation using [`reqwest`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Talks to one executor over REST.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /prompt` after the workflow is queued.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    /// Id to poll history with.
    pub prompt_id: String,
    /// Queue position at submission time.
    pub number: i32,
}

/// Where an output file lives on the executor, as `/view` expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

impl OutputFile {
    /// A file in the root of the output folder.
    pub fn output(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            subfolder: String::new(),
            folder_type: default_folder_type(),
        }
    }
}

/// Failures talking to the executor.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx status.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// ComfyUI accepted the prompt but reported node errors.
    #[error("ComfyUI rejected the workflow: {0}")]
    Rejected(String),

    #[error("Unexpected ComfyUI response: {0}")]
    UnexpectedResponse(String),
}

impl ComfyUIApi {
    /// Client with default settings. `api_url` is e.g. `http://host:8188`.
    pub fn new(api_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(api_url: &str, timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base HTTP URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Queue a compiled workflow.
    ///
    /// Sends `POST /prompt` with the workflow and client ID. Returns the
    /// server-assigned `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let raw: Value = Self::parse_response(response).await?;
        let node_errors = raw
            .get("node_errors")
            .filter(|e| e.as_object().is_some_and(|o| !o.is_empty()));
        if let Some(errors) = node_errors {
            return Err(ComfyUIApiError::Rejected(errors.to_string()));
        }
        serde_json::from_value(raw.clone())
            .map_err(|e| ComfyUIApiError::UnexpectedResponse(format!("/prompt ({e}): {raw}")))
    }

    /// Fetch the node catalogue (`GET /object_info`).
    pub async fn get_object_info(&self) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// History entry for `prompt_id`.
    ///
    /// The returned JSON is keyed by prompt id and lists each output
    /// node's files. An unknown or still-running prompt yields `{}`.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file. `Ok(None)` when it does not exist (yet).
    pub async fn view_file(&self, file: &OutputFile) -> Result<Option<Vec<u8>>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", file.filename.as_str()),
                ("subfolder", file.subfolder.as_str()),
                ("type", file.folder_type.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(response).await?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    /// Remove a prompt from the queue (`POST /queue` with `delete`).
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Pass a 2xx response through; turn anything else into
    /// [`ComfyUIApiError::ApiError`] with the body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Output files listed for `prompt_id` in a `/history` response, in
/// output-node id order.
pub fn history_outputs(history: &Value, prompt_id: &str) -> Vec<OutputFile> {
    let Some(outputs) = history
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut nodes: Vec<(&String, &Value)> = outputs.iter().collect();
    nodes.sort_by(|a, b| {
        let key = |s: &str| s.parse::<u64>().map_err(|_| s.to_string());
        key(a.0.as_str()).cmp(&key(b.0.as_str()))
    });

    nodes
        .into_iter()
        .filter_map(|(_, node)| node.get("images").and_then(Value::as_array))
        .flatten()
        .filter_map(|image| serde_json::from_value::<OutputFile>(image.clone()).ok())
        .filter(|file| file.folder_type == "output")
        .collect()
}
