//! Wire translation and HTTP plumbing shared by the `anthropic` and `openai`
//! reference adapters, both of which talk to an OpenAI-compatible Chat
//! Completions surface — directly modeled on the teacher's
//! `clients/common.rs::send_with_native_tools`, which documents itself as
//! "Compatible with OpenAI, Anthropic Claude (via its OpenAI-compatible
//! endpoint), xAI Grok, and Google Gemini."
//!
//! The translation functions ([`to_wire_messages`], [`to_wire_tools`],
//! [`parse_assistant_message`]) are pure and unit-tested without any network
//! access; `OpenAiCompatProvider::send`/`stream` are the only pieces that
//! touch `reqwest`, matching spec.md §1's exclusion of concrete provider
//! SDKs from the engine core — this adapter is a reference, not a dependency
//! of anything else in the crate.

use crate::error::EngineError;
use crate::message::{new_id, AssistantContentBlock, AssistantMessage, Message, ToolUse};
use crate::provider::{Provider, ProviderOptions};
use crate::tool::Tool;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lazy_static::lazy_static;
use serde_json::{json, Value};
use std::time::Duration;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling, tuned the way
    /// the teacher's `SHARED_HTTP_CLIENT` is.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared HTTP client");
}

fn last_message_id(messages: &[Message]) -> String {
    messages.iter().rev().find_map(|m| m.id().map(str::to_string)).unwrap_or_default()
}

/// Translates engine messages into the wire shape documented by the
/// teacher's message-serialisation table: `SystemMessage` bodies are
/// concatenated into one leading system message (spec.md §4.2: "SystemMessage
/// bodies are concatenated with newline separators into a single system
/// field"), `ToolMessage` results become individual `{"role":"tool", ...}`
/// entries, and `AssistantMessage` content blocks become either plain text or
/// a `tool_calls` array.
pub fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::new();
    let system_bodies: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::System(s) => Some(s.content.as_str()),
            _ => None,
        })
        .collect();
    if !system_bodies.is_empty() {
        wire.push(json!({"role": "system", "content": system_bodies.join("\n")}));
    }

    for message in messages {
        match message {
            Message::System(_) => {}
            Message::User(u) => wire.push(json!({"role": "user", "content": u.content})),
            Message::App(_) => {
                // AppMessages are never sent to a provider (spec.md §3).
            }
            Message::Tool(t) => {
                for result in &t.content {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": result.tool_use_id,
                        "content": result.result,
                    }));
                }
            }
            Message::Assistant(a) => {
                if !a.is_aggregate {
                    continue;
                }
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for block in &a.content {
                    match block {
                        AssistantContentBlock::Text { text: t } => text.push_str(t),
                        AssistantContentBlock::Thinking { .. } => {}
                        AssistantContentBlock::ToolUse(tu) => {
                            tool_calls.push(json!({
                                "id": tu.id,
                                "type": "function",
                                "function": {
                                    "name": tu.name,
                                    "arguments": serde_json::to_string(&Value::Object(tu.params.clone()))
                                        .unwrap_or_else(|_| "{}".to_string()),
                                },
                            }));
                        }
                    }
                }
                if tool_calls.is_empty() {
                    wire.push(json!({"role": "assistant", "content": text}));
                } else {
                    wire.push(json!({"role": "assistant", "content": Value::Null, "tool_calls": tool_calls}));
                }
            }
        }
    }
    wire
}

pub fn to_wire_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

/// Parses a `choices[0].message` object into one aggregate
/// `AssistantMessage`, merging each tool's static `metadata` into the
/// resulting `ToolUse.metadata` (spec.md §4.2: "Merges the static
/// `Tool.metadata` into each outgoing `ToolUse` event").
pub fn parse_assistant_message(parsed: &Value, parent_id: String, tools: &[Tool]) -> Result<AssistantMessage, EngineError> {
    let choice_msg = parsed
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| EngineError::validation("provider response had no choices[0].message"))?;

    let mut content = Vec::new();
    if let Some(text) = choice_msg.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            content.push(AssistantContentBlock::Text { text: text.to_string() });
        }
    }

    if let Some(tool_calls) = choice_msg.get("tool_calls").and_then(|tc| tc.as_array()) {
        for tc in tool_calls {
            let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let func = tc.get("function");
            let name = func.and_then(|f| f.get("name")).and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let args_str = func.and_then(|f| f.get("arguments")).and_then(|v| v.as_str()).unwrap_or("{}");
            let params = match serde_json::from_str::<Value>(args_str) {
                Ok(Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            let mut metadata = std::collections::HashMap::new();
            if let Some(tool) = tools.iter().find(|t| t.name == name) {
                for (k, v) in tool.metadata.iter() {
                    metadata.insert(k.clone(), v.clone());
                }
            }
            content.push(AssistantContentBlock::ToolUse(ToolUse { id, name, params, metadata }));
        }
    }

    Ok(AssistantMessage { id: new_id(), parent_id, content, is_aggregate: true })
}

/// Builds one `ToolUse` block from a buffered streaming tool-call fragment
/// (`id`/`name` set on first sight, `arguments` accumulated across chunks and
/// joined just before the block is flushed), merging the matching tool's
/// static `metadata` the same way [`parse_assistant_message`] does.
fn build_streamed_tool_use(id: String, name: String, arg_parts: &[String], tools: &[Tool]) -> ToolUse {
    let params = match serde_json::from_str::<Value>(&arg_parts.concat()) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    let mut metadata = std::collections::HashMap::new();
    if let Some(tool) = tools.iter().find(|t| t.name == name) {
        for (k, v) in tool.metadata.iter() {
            metadata.insert(k.clone(), v.clone());
        }
    }
    ToolUse { id, name, params, metadata }
}

/// Parses one SSE `data: ...` line into its JSON payload. Returns `None` for
/// the `[DONE]` sentinel, a blank line, or any line that isn't a `data:`
/// field (SSE permits `event:`/`id:`/comment lines, all ignored here since
/// the chat-completions stream never emits them).
fn parse_sse_data_line(line: &str) -> Option<Value> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    serde_json::from_str(data).ok()
}

pub struct OpenAiCompatProvider {
    pub provider_name: &'static str,
    pub base_url: String,
    api_key: String,
}

impl OpenAiCompatProvider {
    pub fn new(provider_name: &'static str, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { provider_name, base_url: base_url.into(), api_key: api_key.into() }
    }

    async fn call(&self, model: &str, messages: &[Message], tools: &[Tool]) -> Result<AssistantMessage, EngineError> {
        let body = json!({
            "model": model,
            "messages": to_wire_messages(messages),
            "tools": to_wire_tools(tools),
        });
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let resp = SHARED_HTTP_CLIENT
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::provider(self.provider_name, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| EngineError::provider(self.provider_name, e))?;
        if !status.is_success() {
            if log::log_enabled!(log::Level::Error) {
                log::error!(
                    "agentengine::providers::openai_compat::OpenAiCompatProvider::call(...): {} returned HTTP {status} from {url}: {text}",
                    self.provider_name
                );
            }
            return Err(EngineError::provider(
                self.provider_name,
                std::io::Error::other(format!("HTTP {status} — {text}")),
            ));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| EngineError::provider(self.provider_name, e))?;
        parse_assistant_message(&parsed, last_message_id(messages), tools)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn count_tokens(&self, _model: &str, messages: &[Message], _tools: &[Tool], _opts: &ProviderOptions) -> Result<usize, EngineError> {
        // No tokenizer dependency is pulled in (out of scope per spec.md
        // §1's "concrete remote provider SDKs ... their ... token counters");
        // this is a rough word-count estimate, not a real cost figure.
        let words: usize = messages
            .iter()
            .map(|m| match m {
                Message::User(u) => u.content.split_whitespace().count(),
                Message::System(s) => s.content.split_whitespace().count(),
                _ => 0,
            })
            .sum();
        Ok(words)
    }

    async fn send(&self, model: &str, messages: &[Message], tools: &[Tool], _opts: &ProviderOptions) -> Result<AssistantMessage, EngineError> {
        self.call(model, messages, tools).await
    }

    /// Requests `"stream": true` and reads the response as Server-Sent
    /// Events, buffering text and per-index tool-call-argument fragments the
    /// way the teacher's ground-truth Python adapter does
    /// (`examples/original_source/libs/big-talk/src/big_talk/llm/openai_provider.py:36-129`):
    /// a completed text run or tool-call block is flushed (yielded as a delta)
    /// as soon as a different content kind or a different tool-call index
    /// begins, and whatever remains is flushed at stream end — followed by
    /// one final aggregate carrying everything that was flushed.
    fn stream(
        &self,
        model: String,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        _opts: ProviderOptions,
    ) -> BoxStream<'static, Result<AssistantMessage, EngineError>> {
        let provider_name = self.provider_name;
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let parent_id = last_message_id(&messages);
        let body = json!({
            "model": model,
            "messages": to_wire_messages(&messages),
            "tools": to_wire_tools(&tools),
            "stream": true,
        });

        let stream = try_stream! {
            let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
            let resp = SHARED_HTTP_CLIENT
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| EngineError::provider(provider_name, e))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                if log::log_enabled!(log::Level::Error) {
                    log::error!(
                        "agentengine::providers::openai_compat::OpenAiCompatProvider::stream(...): {provider_name} returned HTTP {status} from {url}: {text}"
                    );
                }
                Err(EngineError::provider(provider_name, std::io::Error::other(format!("HTTP {status} — {text}"))))?;
            } else {
                let message_id = new_id();
                let mut text_buffer = String::new();
                let mut current_tool_index: Option<u64> = None;
                let mut current_tool_id = String::new();
                let mut current_tool_name = String::new();
                let mut current_tool_args: Vec<String> = Vec::new();
                let mut blocks: Vec<AssistantContentBlock> = Vec::new();
                let mut sse_buffer = String::new();

                let mut bytes = resp.bytes_stream();
                while let Some(chunk) = bytes.next().await {
                    let chunk = chunk.map_err(|e| EngineError::provider(provider_name, e))?;
                    sse_buffer.push_str(&String::from_utf8_lossy(&chunk));

                    while let Some(pos) = sse_buffer.find("\n\n") {
                        let event: String = sse_buffer.drain(..pos + 2).collect();

                        for line in event.lines() {
                            let Some(parsed) = parse_sse_data_line(line) else { continue };
                            let Some(delta) = parsed.get("choices").and_then(|c| c.get(0)).and_then(|c| c.get("delta")) else { continue };

                            if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
                                text_buffer.push_str(content);
                            }

                            let Some(tool_calls) = delta.get("tool_calls").and_then(|tc| tc.as_array()) else { continue };

                            if !text_buffer.is_empty() {
                                let block = AssistantContentBlock::Text { text: std::mem::take(&mut text_buffer) };
                                blocks.push(block.clone());
                                yield AssistantMessage { id: message_id.clone(), parent_id: parent_id.clone(), content: vec![block], is_aggregate: false };
                            }

                            for tc in tool_calls {
                                let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                                if current_tool_index.is_some_and(|prev| prev != idx) {
                                    let prev_block = AssistantContentBlock::ToolUse(build_streamed_tool_use(
                                        std::mem::take(&mut current_tool_id),
                                        std::mem::take(&mut current_tool_name),
                                        &current_tool_args,
                                        &tools,
                                    ));
                                    blocks.push(prev_block.clone());
                                    yield AssistantMessage { id: message_id.clone(), parent_id: parent_id.clone(), content: vec![prev_block], is_aggregate: false };
                                    current_tool_args.clear();
                                }
                                current_tool_index = Some(idx);
                                if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                                    current_tool_id = id.to_string();
                                }
                                if let Some(name) = tc.get("function").and_then(|f| f.get("name")).and_then(|v| v.as_str()) {
                                    current_tool_name = name.to_string();
                                }
                                if let Some(args) = tc.get("function").and_then(|f| f.get("arguments")).and_then(|v| v.as_str()) {
                                    current_tool_args.push(args.to_string());
                                }
                            }
                        }
                    }
                }

                if !text_buffer.is_empty() {
                    let block = AssistantContentBlock::Text { text: std::mem::take(&mut text_buffer) };
                    blocks.push(block.clone());
                    yield AssistantMessage { id: message_id.clone(), parent_id: parent_id.clone(), content: vec![block], is_aggregate: false };
                }

                if current_tool_index.is_some() {
                    let last_block = AssistantContentBlock::ToolUse(build_streamed_tool_use(current_tool_id, current_tool_name, &current_tool_args, &tools));
                    blocks.push(last_block.clone());
                    yield AssistantMessage { id: message_id.clone(), parent_id: parent_id.clone(), content: vec![last_block], is_aggregate: false };
                }

                yield AssistantMessage { id: message_id, parent_id, content: blocks, is_aggregate: true };
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SystemMessage, ToolMessage, UserMessage};

    #[test]
    fn system_messages_are_concatenated_with_newlines() {
        let messages = vec![
            Message::System(SystemMessage::new("a")),
            Message::System(SystemMessage::new("b")),
            Message::User(UserMessage::new("hi")),
        ];
        let wire = to_wire_messages(&messages);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "a\nb");
    }

    #[test]
    fn tool_message_results_become_individual_tool_entries() {
        let messages = vec![Message::Tool(ToolMessage {
            id: "tm1".into(),
            parent_id: "a1".into(),
            content: vec![
                crate::message::ToolResult::success("t1", "5"),
                crate::message::ToolResult::success("t2", "6"),
            ],
        })];
        let wire = to_wire_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "t1");
    }

    #[test]
    fn parse_assistant_message_extracts_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "t1",
                        "function": {"name": "add", "arguments": "{\"a\":1,\"b\":2}"}
                    }]
                }
            }]
        });
        let assistant = parse_assistant_message(&response, "u1".to_string(), &[]).unwrap();
        assert_eq!(assistant.parent_id, "u1");
        let tool_uses = assistant.tool_uses();
        assert_eq!(tool_uses.len(), 1);
        assert_eq!(tool_uses[0].name, "add");
    }

    // The tests below exercise `OpenAiCompatProvider::send`/`stream` against a
    // local mock transport (`wiremock`), per SPEC_FULL.md's test plan — no
    // live network call is made.

    #[tokio::test]
    async fn send_parses_a_non_streaming_response_from_a_mock_transport() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hi there", "tool_calls": null}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("mock-http", server.uri(), "test-key");
        let messages = vec![Message::User(crate::message::UserMessage::new("hello"))];
        let assistant = provider.send("m", &messages, &[], &ProviderOptions::new()).await.unwrap();

        assert!(matches!(&assistant.content[0], AssistantContentBlock::Text { text } if text == "hi there"));
    }

    #[tokio::test]
    async fn send_surfaces_a_non_success_status_as_a_provider_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("mock-http", server.uri(), "test-key");
        let messages = vec![Message::User(crate::message::UserMessage::new("hello"))];
        let err = provider.send("m", &messages, &[], &ProviderOptions::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider { .. }));
    }

    /// Mirrors the teacher's ground-truth buffering algorithm end to end: a
    /// text fragment followed by a two-chunk tool-call argument, delivered as
    /// raw SSE bytes from a mock transport, must flush the text as one delta,
    /// the assembled tool call as a second delta, then one aggregate carrying
    /// both blocks.
    #[tokio::test]
    async fn stream_buffers_text_then_a_fragmented_tool_call_before_the_aggregate() {
        let server = wiremock::MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"looking it up\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"t1\",\"function\":{\"name\":\"add\",\"arguments\":\"{\\\"a\\\":\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"1}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("mock-http", server.uri(), "test-key");
        let messages = vec![Message::User(crate::message::UserMessage::new("hello"))];
        let mut events = provider.stream("m".to_string(), messages, vec![], ProviderOptions::new());

        let first = events.next().await.unwrap().unwrap();
        assert!(!first.is_aggregate);
        assert!(matches!(&first.content[0], AssistantContentBlock::Text { text } if text == "looking it up"));

        let second = events.next().await.unwrap().unwrap();
        assert!(!second.is_aggregate);
        match &second.content[0] {
            AssistantContentBlock::ToolUse(tu) => {
                assert_eq!(tu.name, "add");
                assert_eq!(tu.params.get("a").and_then(|v| v.as_i64()), Some(1));
            }
            other => panic!("expected a ToolUse delta, got {other:?}"),
        }

        let aggregate = events.next().await.unwrap().unwrap();
        assert!(aggregate.is_aggregate);
        assert_eq!(aggregate.content.len(), 2);
        assert!(events.next().await.is_none());
    }
}
