//! Deterministic reasoner double for tests.
//!
//! Queue responses (text, tool calls or errors) that are consumed in
//! order; every request is recorded for assertions. An exhausted queue
//! returns an empty JSON object so tests fail on content, not on hangs.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ChatMessage, ChatRequest, ChatResponse, ReasonerClient, ReasonerError, ToolCall,
    ToolCallFunction,
};

enum Scripted {
    Message(ChatMessage),
    Error(ReasonerError),
}

#[derive(Default)]
pub struct FakeReasoner {
    script: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain assistant text response.
    pub fn with_text(self, text: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push(Scripted::Message(ChatMessage::assistant(text)));
        self
    }

    /// Queue an assistant response that invokes a single tool.
    pub fn with_tool_call(self, name: &str, arguments: Value) -> Self {
        self.script.lock().unwrap().push(Scripted::Message(ChatMessage {
            role: super::ChatRole::Assistant,
            content: String::new(),
            tool_calls: Some(vec![ToolCall {
                function: ToolCallFunction {
                    name: name.to_string(),
                    arguments,
                },
            }]),
            tool_name: None,
        }));
        self
    }

    /// Queue a backend failure.
    pub fn with_error(self, error: ReasonerError) -> Self {
        self.script.lock().unwrap().push(Scripted::Error(error));
        self
    }

    /// Every request the double has seen, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasonerClient for FakeReasoner {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ReasonerError> {
        self.requests.lock().unwrap().push(request.clone());

        let next = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };

        match next {
            Some(Scripted::Message(message)) => Ok(ChatResponse { message }),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(ChatResponse {
                message: ChatMessage::assistant("{}"),
            }),
        }
    }
}
