//! A deterministic, scriptable provider adapter used by tests and the
//! literal S1–S6 scenarios in spec.md §8.
//!
//! Each call to `stream`/`send` pops one scripted turn (an ordered list of
//! content blocks) and wraps it as a single aggregate `AssistantMessage`. No
//! network I/O, no wire translation — this adapter exists purely to drive
//! the conversation loop with known inputs, the way the teacher's test
//! suites use `MockProtocol` in `tool_protocol.rs`.

use crate::error::EngineError;
use crate::message::{new_id, AssistantContentBlock, AssistantMessage, Message};
use crate::provider::{Provider, ProviderOptions};
use crate::tool::Tool;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn last_message_id(messages: &[Message]) -> String {
    messages.iter().rev().find_map(|m| m.id().map(str::to_string)).unwrap_or_default()
}

/// One scripted provider turn: the content blocks of the aggregate message
/// `MockProvider` will produce for the Nth call, plus the deltas (if any)
/// `stream()` should yield before that aggregate (spec.md §4.2: deltas
/// followed by exactly one aggregate).
#[derive(Clone)]
pub struct MockTurn {
    pub deltas: Vec<Vec<AssistantContentBlock>>,
    pub content: Vec<AssistantContentBlock>,
}

impl MockTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self { deltas: Vec::new(), content: vec![AssistantContentBlock::Text { text: text.into() }] }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, params: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            deltas: Vec::new(),
            content: vec![AssistantContentBlock::ToolUse(crate::message::ToolUse {
                id: id.into(),
                name: name.into(),
                params,
                metadata: Default::default(),
            })],
        }
    }

    /// A turn that streams one content block per delta before yielding the
    /// aggregate — drives `is_aggregate = false` through the whole pipeline
    /// (`Provider::stream` → stream-iteration → the conversation loop's delta
    /// arm in `pipeline::streaming`), mirroring the teacher's ground-truth
    /// buffering adapter (`examples/original_source/libs/big-talk/src/big_talk/llm/openai_provider.py`),
    /// which yields a delta per flushed text/tool-call fragment, then the
    /// aggregate of everything it buffered.
    pub fn delta_then_aggregate(deltas: Vec<Vec<AssistantContentBlock>>, aggregate: Vec<AssistantContentBlock>) -> Self {
        Self { deltas, content: aggregate }
    }
}

pub struct MockProvider {
    turns: Mutex<VecDeque<MockTurn>>,
    /// When the script is exhausted, repeat the last turn instead of
    /// panicking — used by S6 (max-iterations cap), where the mock calls the
    /// same tool forever and the loop, not the script, bounds iteration
    /// count.
    repeat_last: bool,
    call_count: AtomicUsize,
    close_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            repeat_last: false,
            call_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn repeating(turn: MockTurn) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from([turn])),
            repeat_last: true,
            call_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    fn next_turn(&self) -> Option<MockTurn> {
        let mut turns = self.turns.lock().unwrap();
        if self.repeat_last {
            turns.front().cloned()
        } else {
            turns.pop_front()
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn count_tokens(&self, _model: &str, messages: &[Message], _tools: &[Tool], _opts: &ProviderOptions) -> Result<usize, EngineError> {
        Ok(messages.len())
    }

    async fn send(&self, _model: &str, messages: &[Message], _tools: &[Tool], _opts: &ProviderOptions) -> Result<AssistantMessage, EngineError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let turn = self
            .next_turn()
            .ok_or_else(|| EngineError::validation("mock provider script exhausted"))?;
        Ok(AssistantMessage {
            id: new_id(),
            parent_id: last_message_id(messages),
            content: turn.content,
            is_aggregate: true,
        })
    }

    fn stream(
        &self,
        _model: String,
        messages: Vec<Message>,
        _tools: Vec<Tool>,
        _opts: ProviderOptions,
    ) -> BoxStream<'static, Result<AssistantMessage, EngineError>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let turn = self.next_turn();
        let parent_id = last_message_id(&messages);
        let id = new_id();

        let turn = match turn {
            Some(t) => t,
            None => {
                return Box::pin(futures_util::stream::once(async move {
                    Err(EngineError::validation("mock provider script exhausted"))
                }))
            }
        };

        let mut items: Vec<Result<AssistantMessage, EngineError>> = turn
            .deltas
            .into_iter()
            .map(|content| Ok(AssistantMessage { id: id.clone(), parent_id: parent_id.clone(), content, is_aggregate: false }))
            .collect();
        items.push(Ok(AssistantMessage { id, parent_id, content: turn.content, is_aggregate: true }));
        Box::pin(futures_util::stream::iter(items))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
