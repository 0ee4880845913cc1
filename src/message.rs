//! The tagged-variant message model (spec.md §3).
//!
//! Every message is one variant of [`Message`], discriminated by `role` the
//! way the teacher's `clients::common` translates each `Role` variant into a
//! distinct wire shape; here the discriminator lives in the Rust type system
//! instead of a separate `role` field plus a content union, which is the
//! idiomatic shape for a small closed tagged union. `serde`'s adjacently
//! tagged representation (`#[serde(tag = "role", ...)]`) reproduces the
//! `role` discriminator on the wire for anything that round-trips this type
//! through JSON (`AppMessage` payloads, test fixtures).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque message id. UUIDv4, never parsed or compared structurally by the
/// engine beyond equality (spec.md §3: "ids are opaque strings (UUIDs)").
pub type MessageId = String;

pub fn new_id() -> MessageId {
    Uuid::new_v4().to_string()
}

/// A single message in conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role")]
#[serde(rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    System(SystemMessage),
    Tool(ToolMessage),
    Assistant(AssistantMessage),
    App(AppMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: MessageId,
    pub content: String,
}

impl UserMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self { id: new_id(), content: content.into() }
    }
}

/// No `id`: multiple `SystemMessage`s in one call are concatenated by
/// provider adapters into a single system field (spec.md §4.2), so a system
/// message is never a `ToolMessage.parent_id`/`AssistantMessage.parent_id`
/// target and needs no identity of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: String,
}

impl SystemMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMessage {
    pub id: MessageId,
    pub parent_id: MessageId,
    pub content: Vec<ToolResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: MessageId,
    pub parent_id: MessageId,
    pub content: Vec<AssistantContentBlock>,
    pub is_aggregate: bool,
}

impl AssistantMessage {
    /// Every `ToolUse` block in this message, in order. Empty for a pure-text
    /// aggregate or for any delta.
    pub fn tool_uses(&self) -> Vec<&ToolUse> {
        self.content
            .iter()
            .filter_map(|b| match b {
                AssistantContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// A free-form event injected by middleware. Yielded to the caller and
/// appended to working history, but never sent to a provider — the loop
/// (spec.md §4.4 step 2) treats `role == "app"` as a terminal case that
/// skips tool-use scanning entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMessage {
    pub id: MessageId,
    pub parent_id: Option<MessageId>,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub content: Value,
}

impl AppMessage {
    pub fn new(msg_type: impl Into<String>, content: Value, parent_id: Option<MessageId>) -> Self {
        Self { id: new_id(), parent_id, msg_type: msg_type.into(), content }
    }
}

/// A tagged variant within an [`AssistantMessage`]'s `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum AssistantContentBlock {
    Text { text: String },
    Thinking { thinking: String, signature: String },
    ToolUse(ToolUse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    /// Mapping(string → any); the engine never interprets these, only
    /// forwards them to `tool.func` (spec.md §9: "the engine sees `params`
    /// as an opaque string-keyed mapping").
    pub params: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub result: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_use_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self { tool_use_id: tool_use_id.into(), result: result.into(), is_error: false }
    }

    pub fn failure(tool_use_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self { tool_use_id: tool_use_id.into(), result: result.into(), is_error: true }
    }
}

/// Serializes a tool's return value per spec.md §4.5 step 2: a string passes
/// through as-is; `null` becomes the literal `"null"`; anything else is
/// JSON-encoded, falling back to `{:?}` if encoding somehow fails (it
/// practically never does for `serde_json::Value`, but the fallback keeps
/// the contract total).
pub fn serialize_tool_return(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

impl Message {
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::User(m) => Some(&m.id),
            Message::System(_) => None,
            Message::Tool(m) => Some(&m.id),
            Message::Assistant(m) => Some(&m.id),
            Message::App(m) => Some(&m.id),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::User(_) => "user",
            Message::System(_) => "system",
            Message::Tool(_) => "tool",
            Message::Assistant(_) => "assistant",
            Message::App(_) => "app",
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_tool_return_string_passthrough() {
        assert_eq!(serialize_tool_return(&Value::String("5".into())), "5");
    }

    #[test]
    fn serialize_tool_return_null() {
        assert_eq!(serialize_tool_return(&Value::Null), "null");
    }

    #[test]
    fn serialize_tool_return_json_encodes_other_values() {
        let v = serde_json::json!({"a": 1});
        assert_eq!(serialize_tool_return(&v), r#"{"a":1}"#);
    }

    #[test]
    fn tool_uses_filters_non_tool_blocks() {
        let msg = AssistantMessage {
            id: "a1".into(),
            parent_id: "u1".into(),
            is_aggregate: true,
            content: vec![
                AssistantContentBlock::Text { text: "hi".into() },
                AssistantContentBlock::ToolUse(ToolUse {
                    id: "t1".into(),
                    name: "add".into(),
                    params: serde_json::Map::new(),
                    metadata: HashMap::new(),
                }),
            ],
        };
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.tool_uses()[0].id, "t1");
    }
}
