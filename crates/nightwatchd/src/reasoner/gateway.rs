//! Reasoner gateway - structured calls with tools, retry and JSON repair.
//!
//! One structured call drives the backend until it stops invoking tools,
//! then parses the final text as JSON. A malformed response earns exactly
//! one corrective, schema-constrained repair attempt; a second failure
//! propagates. Transport failures are retried with exponential backoff
//! (base 1 s, three attempts); 4xx statuses short-circuit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ChatMessage, ChatRequest, ChatResponse, ReasonerClient, ToolDecl};

/// Backoff base for transport retries.
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Transport attempts per backend call.
const MAX_ATTEMPTS: u32 = 3;

/// Upper bound on tool rounds within one structured call. The reasoner
/// deciding to inspect every container twice is fine; an unbounded loop
/// is not.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Executes the tools a structured call exposes.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, name: &str, arguments: &Value) -> Result<String>;
}

/// No tools offered; any invocation is a protocol error.
pub struct NoTools;

#[async_trait]
impl ToolHandler for NoTools {
    async fn handle(&self, name: &str, _arguments: &Value) -> Result<String> {
        Err(anyhow!("no tools are available, but {} was called", name))
    }
}

#[derive(Clone)]
pub struct ReasonerGateway {
    client: Arc<dyn ReasonerClient>,
    model: String,
    think: bool,
}

impl ReasonerGateway {
    pub fn new(client: Arc<dyn ReasonerClient>, model: &str, think: bool) -> Self {
        Self {
            client,
            model: model.to_string(),
            think,
        }
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: &[ToolDecl], format: Option<Value>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: tools.iter().map(|t| t.to_wire()).collect(),
            think: self.think,
            format,
            stream: false,
        }
    }

    /// One chat round with retry, no JSON contract. The response message is
    /// appended to `history`. Used by the orchestrator's capability picker.
    pub async fn step(
        &self,
        history: &mut Vec<ChatMessage>,
        tools: &[ToolDecl],
    ) -> Result<ChatMessage> {
        let request = self.request(history.clone(), tools, None);
        let response = self.chat_with_retry(&request).await?;
        history.push(response.message.clone());
        Ok(response.message)
    }

    /// Full structured call: seed the history, loop through tool rounds,
    /// parse the final answer as JSON, repair once on failure.
    pub async fn structured_call(
        &self,
        system: &str,
        opening: &str,
        tools: &[ToolDecl],
        handler: &dyn ToolHandler,
        schema: &Value,
        history: &mut Vec<ChatMessage>,
    ) -> Result<Value> {
        if history.is_empty() {
            history.push(ChatMessage::system(system));
        }
        history.push(ChatMessage::user(opening));

        for round in 0..MAX_TOOL_ROUNDS {
            let request = self.request(history.clone(), tools, None);
            let response = self.chat_with_retry(&request).await?;
            let message = response.message;
            history.push(message.clone());

            let calls = message.tool_calls().to_vec();
            if !calls.is_empty() {
                debug!("[*]  round {}: {} tool call(s)", round, calls.len());
                let outputs = join_all(calls.iter().map(|call| async {
                    let name = call.function.name.clone();
                    let result = handler.handle(&name, &call.function.arguments).await;
                    (name, result)
                }))
                .await;

                for (name, result) in outputs {
                    let content = match result {
                        Ok(output) => output,
                        Err(e) => format!("Error: {}", e),
                    };
                    history.push(ChatMessage::tool_response(name, content));
                }
                continue;
            }

            match parse_json_response(&message.content) {
                Ok(value) => return Ok(value),
                Err(parse_err) => {
                    warn!("[!]  unparseable reasoner output, repairing: {}", parse_err);
                    return self.repair(schema, history).await;
                }
            }
        }

        Err(anyhow!(
            "reasoner did not produce a final answer within {} tool rounds",
            MAX_TOOL_ROUNDS
        ))
    }

    /// The single repair pass: one corrective message, schema-constrained
    /// decoding, result returned verbatim. A second parse failure is the
    /// caller's problem.
    async fn repair(&self, schema: &Value, history: &mut Vec<ChatMessage>) -> Result<Value> {
        history.push(ChatMessage::user(
            "Your previous reply was not valid JSON. Respond again with ONLY a \
             JSON object conforming exactly to the required schema - no prose, \
             no code fences.",
        ));

        let request = self.request(history.clone(), &[], Some(schema.clone()));
        let response = self.chat_with_retry(&request).await?;
        history.push(response.message.clone());

        parse_json_response(&response.message.content)
            .context("reasoner output remained malformed after the repair pass")
    }

    async fn chat_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let mut attempt = 0u32;
        loop {
            match self.client.chat(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE * 2u32.pow(attempt);
                    warn!(
                        "[!]  reasoner attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Parse reasoner text as JSON, tolerating code fences and surrounding
/// prose.
pub fn parse_json_response(text: &str) -> Result<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(stripped.trim()) {
        return Ok(value);
    }
    let extracted = extract_json(stripped);
    serde_json::from_str(extracted.trim()).map_err(|e| anyhow!("invalid JSON: {}", e))
}

/// Drop a surrounding ```/```json fence, if any.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// The outermost `{…}` span, for prose-wrapped objects.
fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::fake::FakeReasoner;
    use crate::reasoner::ReasonerError;

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"ok": {"type": "boolean"}}
        })
    }

    #[test]
    fn test_parse_plain_json() {
        assert_eq!(
            parse_json_response(r#"{"ok": true}"#).unwrap()["ok"],
            true
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"ok\": true}\n```";
        assert_eq!(parse_json_response(text).unwrap()["ok"], true);
    }

    #[test]
    fn test_parse_prose_wrapped_json() {
        let text = "Here is the result: {\"ok\": false} hope that helps";
        assert_eq!(parse_json_response(text).unwrap()["ok"], false);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_json_response("certainly!").is_err());
    }

    #[tokio::test]
    async fn test_structured_call_plain_answer() {
        let fake = Arc::new(FakeReasoner::new().with_text(r#"{"ok": true}"#));
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let mut history = Vec::new();
        let value = gateway
            .structured_call("system", "opening", &[], &NoTools, &schema(), &mut history)
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        // system + opening + assistant
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_structured_call_runs_tools_then_answers() {
        struct Echo;
        #[async_trait]
        impl ToolHandler for Echo {
            async fn handle(&self, name: &str, arguments: &Value) -> Result<String> {
                Ok(format!("{}:{}", name, arguments["x"]))
            }
        }

        let fake = Arc::new(
            FakeReasoner::new()
                .with_tool_call("probe", serde_json::json!({"x": 1}))
                .with_text(r#"{"ok": true}"#),
        );
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let tools = [ToolDecl::new("probe", "probe", serde_json::json!({}))];
        let mut history = Vec::new();
        let value = gateway
            .structured_call("system", "opening", &tools, &Echo, &schema(), &mut history)
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        // The tool response landed in the history before the final answer.
        assert!(history
            .iter()
            .any(|m| m.tool_name.as_deref() == Some("probe") && m.content == "probe:1"));
    }

    #[tokio::test]
    async fn test_repair_pass_is_schema_constrained() {
        let fake = Arc::new(
            FakeReasoner::new()
                .with_text("sure thing, here you go!")
                .with_text(r#"{"ok": true}"#),
        );
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let mut history = Vec::new();
        let value = gateway
            .structured_call("system", "opening", &[], &NoTools, &schema(), &mut history)
            .await
            .unwrap();
        assert_eq!(value["ok"], true);

        let requests = fake.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].format.is_none());
        // The retry asked for schema-constrained decoding.
        assert_eq!(requests[1].format.as_ref().unwrap(), &schema());
    }

    #[tokio::test]
    async fn test_repair_failure_propagates() {
        let fake = Arc::new(
            FakeReasoner::new()
                .with_text("not json")
                .with_text("still not json"),
        );
        let gateway = ReasonerGateway::new(fake, "test-model", false);

        let mut history = Vec::new();
        let result = gateway
            .structured_call("system", "opening", &[], &NoTools, &schema(), &mut history)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retried_with_backoff() {
        let fake = Arc::new(
            FakeReasoner::new()
                .with_error(ReasonerError::Transport("reset".into()))
                .with_error(ReasonerError::Transport("reset".into()))
                .with_text(r#"{"ok": true}"#),
        );
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let mut history = vec![ChatMessage::system("s")];
        let message = gateway.step(&mut history, &[]).await.unwrap();
        assert_eq!(message.content, r#"{"ok": true}"#);
        assert_eq!(fake.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_propagates() {
        let fake = Arc::new(
            FakeReasoner::new()
                .with_error(ReasonerError::Transport("reset".into()))
                .with_error(ReasonerError::Transport("reset".into()))
                .with_error(ReasonerError::Transport("reset".into())),
        );
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let mut history = vec![ChatMessage::system("s")];
        assert!(gateway.step(&mut history, &[]).await.is_err());
        assert_eq!(fake.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let fake = Arc::new(
            FakeReasoner::new()
                .with_error(ReasonerError::Status {
                    status: 400,
                    body: "bad request".into(),
                })
                .with_text(r#"{"ok": true}"#),
        );
        let gateway = ReasonerGateway::new(fake.clone(), "test-model", false);

        let mut history = vec![ChatMessage::system("s")];
        assert!(gateway.step(&mut history, &[]).await.is_err());
        assert_eq!(fake.requests().len(), 1);
    }
}
