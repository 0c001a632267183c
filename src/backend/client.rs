//! HTTP implementation of the tutor backend contract.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use crate::backend::types::{
    ChatReply, ChatRequest, ErrorBody, ModelEntry, PromptBody, SaveOutcome, SavePromptRequest,
};
use crate::backend::{Backend, ExportRequest};
use crate::error::{ParleyError, Result};
use crate::session::history::ChatEntry;

/// Fallback failure message when the backend's error body is missing or
/// not parseable
const GENERIC_FAILURE: &str = "Server returned an error";

/// Extract the user-facing failure message from an error response body
fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

/// REST client for the tutor backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client against the given base URL, e.g.
    /// "http://localhost:5000"
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| ParleyError::Config(format!("invalid backend URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ParleyError::Backend(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into the uniform backend error
    async fn failure(response: reqwest::Response) -> ParleyError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("backend error {}: {}", status, body);
        ParleyError::Backend(error_message_from_body(&body))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn models(&self) -> Result<Vec<ModelEntry>> {
        debug!("fetching model catalog");
        let response = self
            .client
            .get(self.endpoint("/models"))
            .send()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let models: Vec<ModelEntry> = response
            .json()
            .await
            .map_err(|e| ParleyError::Backend(format!("malformed model catalog: {}", e)))?;
        info!("model catalog loaded ({} entries)", models.len());
        Ok(models)
    }

    async fn system_prompt(&self) -> Result<String> {
        debug!("fetching system prompt");
        let response = self
            .client
            .get(self.endpoint("/system-prompt"))
            .send()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let body: PromptBody = response
            .json()
            .await
            .map_err(|e| ParleyError::Backend(format!("malformed prompt body: {}", e)))?;
        Ok(body.prompt)
    }

    async fn save_system_prompt(&self, prompt: &str) -> Result<()> {
        debug!("saving system prompt ({} chars)", prompt.len());
        let response = self
            .client
            .post(self.endpoint("/system-prompt"))
            .json(&SavePromptRequest { prompt })
            .send()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let outcome: SaveOutcome = response
            .json()
            .await
            .map_err(|e| ParleyError::Backend(format!("malformed save outcome: {}", e)))?;
        if outcome.success {
            info!("system prompt saved");
            Ok(())
        } else {
            Err(ParleyError::Backend(
                outcome
                    .error
                    .unwrap_or_else(|| "Failed to save system prompt".to_string()),
            ))
        }
    }

    async fn chat(&self, user_input: &str, model: &str, language: &str) -> Result<String> {
        debug!("submitting chat turn (model: {}, language: {})", model, language);
        let response = self
            .client
            .post(self.endpoint("/chat"))
            .json(&ChatRequest {
                user_input,
                model,
                language,
            })
            .send()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ParleyError::Backend(format!("malformed chat reply: {}", e)))?;

        // Some backends put the failure text in `error` on a 2xx status;
        // it is displayed as the reply either way.
        match reply.response.or(reply.error) {
            Some(text) => {
                info!("chat reply received ({} chars)", text.len());
                Ok(text)
            }
            None => Err(ParleyError::Backend("empty reply from backend".to_string())),
        }
    }

    async fn export(&self, history: &[ChatEntry]) -> Result<Vec<u8>> {
        debug!("exporting {} history entries", history.len());
        let response = self
            .client
            .post(self.endpoint("/export"))
            .json(&ExportRequest { history })
            .send()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ParleyError::Backend(e.to_string()))?;
        info!("export document received ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}
