//! Ollama chat backend.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ChatRequest, ChatResponse, ReasonerClient, ReasonerError};

/// Generous per-call timeout: a full think-then-act pass on a local model
/// can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub struct OllamaReasoner {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaReasoner {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether the backend answers at all.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ReasonerClient for OllamaReasoner {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ReasonerError> {
        let url = format!("{}/api/chat", self.base_url);

        info!(
            "[>]  reasoner call [{}] ({} messages, {} tools{})",
            request.model,
            request.messages.len(),
            request.tools.len(),
            if request.format.is_some() {
                ", schema-constrained"
            } else {
                ""
            }
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ReasonerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasonerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasonerError::InvalidResponse(e.to_string()))?;

        debug!(
            "[<]  reasoner response ({} chars, {} tool calls)",
            parsed.message.content.len(),
            parsed.message.tool_calls().len()
        );
        Ok(parsed)
    }
}
