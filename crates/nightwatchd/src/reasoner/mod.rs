//! Reasoner abstraction - structured, tool-augmented generation.
//!
//! The agent never trusts the reasoner with side effects: it only ever
//! returns text or tool invocations, and every tool handler lives on this
//! side of the boundary. Production speaks the Ollama chat API; tests use
//! [`fake::FakeReasoner`].

pub mod fake;
mod gateway;
mod ollama;

pub use gateway::{NoTools, ReasonerGateway, ToolHandler, MAX_TOOL_ROUNDS};
pub use ollama::OllamaReasoner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One function invocation requested by the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One turn of conversation, in the Ollama chat shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Which tool produced this message (role `tool` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_name: None,
        }
    }

    pub fn tool_response(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// A callable the reasoner may invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDecl {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

impl ToolDecl {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// The wire form the chat API expects.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One request to the reasoner backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,

    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,

    /// Think-then-act mode
    pub think: bool,

    /// When set, the backend constrains decoding to this JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,

    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// Transport and protocol failures from the backend.
#[derive(Debug, Error)]
pub enum ReasonerError {
    /// Network-level failure - retryable
    #[error("reasoner transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status. 4xx is never retried.
    #[error("reasoner returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reasoner response was not decodable: {0}")]
    InvalidResponse(String),
}

impl ReasonerError {
    /// Whether the gateway's backoff loop should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReasonerError::Transport(_) => true,
            ReasonerError::Status { status, .. } => *status >= 500,
            ReasonerError::InvalidResponse(_) => false,
        }
    }
}

/// Minimal backend interface the gateway drives.
#[async_trait]
pub trait ReasonerClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ReasonerError>;
}
