//! The streaming pipeline: drives the conversation loop, wiring the
//! stream-iteration and tool-execution pipelines together (spec.md §4.3,
//! §4.4).

use crate::error::EngineError;
use crate::message::{new_id, Message, ToolMessage, ToolResult, ToolUse};
use crate::middleware::{Handler, MiddlewareStack};
use crate::pipeline::stream_iteration::{StreamIterationContext, StreamIterationResult};
use crate::pipeline::tool_execution::ToolExecutionContext;
use crate::pipeline::ProviderResolver;
use crate::tool::{Tool, ToolTask};
use async_stream::try_stream;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct StreamContext {
    pub model: String,
    pub tools: Vec<Tool>,
    pub messages: Vec<Message>,
    pub max_iterations: usize,
    pub iteration: usize,
    pub provider_resolver: ProviderResolver,
    pub stream_iteration_handler: Handler<StreamIterationContext, StreamIterationResult>,
    pub tool_execution_handler: Handler<ToolExecutionContext, Vec<ToolTask>>,
}

pub type StreamResult = BoxStream<'static, Result<Message, EngineError>>;

/// Validates the "at least one UserMessage" invariant (spec.md §3) up front:
/// a validation failure is raised synchronously, before any iteration begins
/// (spec.md §7 — "no iteration begins").
pub fn validate_input(messages: &[Message]) -> Result<(), EngineError> {
    if messages.iter().any(|m| matches!(m, Message::User(_))) {
        Ok(())
    } else {
        Err(EngineError::validation("at least one UserMessage is required"))
    }
}

/// Builds the terminal handler of the streaming stack: the conversation loop
/// itself, as a lazy sequence of [`Message`].
pub fn terminal_handler() -> Handler<StreamContext, StreamResult> {
    Arc::new(|ctx: StreamContext| Box::pin(async move { Box::pin(run(ctx)) as StreamResult }))
}

fn run(ctx: StreamContext) -> impl futures_util::Stream<Item = Result<Message, EngineError>> {
    try_stream! {
        let mut history = ctx.messages.clone();

        for iteration in 0..ctx.max_iterations {
            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "agentengine::pipeline::streaming::run(...): entering iteration {iteration}/{} with {} messages in history",
                    ctx.max_iterations,
                    history.len()
                );
            }

            let si_ctx = StreamIterationContext {
                model: ctx.model.clone(),
                tools: ctx.tools.clone(),
                messages: history.clone(),
                iteration,
                provider_resolver: ctx.provider_resolver.clone(),
            };
            let mut events = (ctx.stream_iteration_handler)(si_ctx).await;

            // (parent_id, tool_use) pairs recorded in the order encountered
            // this iteration, across every aggregate the pipeline yielded.
            let mut pending_tool_uses: Vec<(String, ToolUse)> = Vec::new();

            while let Some(event) = events.next().await {
                let message = event?;
                match &message {
                    Message::App(_) => {
                        history.push(message.clone());
                        yield message;
                    }
                    Message::Assistant(assistant) if assistant.is_aggregate => {
                        for tool_use in assistant.tool_uses() {
                            pending_tool_uses.push((assistant.id.clone(), tool_use.clone()));
                        }
                        history.push(message.clone());
                        yield message;
                    }
                    _ => {
                        // Delta assistant messages (and any other shape a
                        // middleware chooses to emit) are yielded but never
                        // appended to history or scanned for tool uses.
                        yield message;
                    }
                }
            }

            if pending_tool_uses.is_empty() {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("agentengine::pipeline::streaming::run(...): iteration {iteration} produced no tool uses, exiting loop");
                }
                break;
            }

            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "agentengine::pipeline::streaming::run(...): iteration {iteration} dispatching {} tool use(s)",
                    pending_tool_uses.len()
                );
            }

            let tool_uses: Vec<ToolUse> = pending_tool_uses.iter().map(|(_, tu)| tu.clone()).collect();
            let te_ctx = ToolExecutionContext {
                tool_uses,
                tools: ctx.tools.clone(),
                messages: history.clone(),
                iteration,
            };
            let tasks = (ctx.tool_execution_handler)(te_ctx).await;
            let results: Vec<ToolResult> = futures_util::future::join_all(tasks).await;

            let mut order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Vec<ToolResult>> = HashMap::new();
            for ((parent_id, _tool_use), result) in pending_tool_uses.into_iter().zip(results.into_iter()) {
                if !groups.contains_key(&parent_id) {
                    order.push(parent_id.clone());
                }
                groups.entry(parent_id).or_default().push(result);
            }

            for parent_id in order {
                let content = groups.remove(&parent_id).unwrap_or_default();
                let tool_message = ToolMessage { id: new_id(), parent_id, content };
                history.push(Message::Tool(tool_message.clone()));
                yield Message::Tool(tool_message);
            }

            if log::log_enabled!(log::Level::Debug) {
                log::debug!("agentengine::pipeline::streaming::run(...): leaving iteration {iteration}, history now has {} messages", history.len());
            }
        }
    }
}

pub fn default_stack() -> MiddlewareStack<StreamContext, StreamResult> {
    MiddlewareStack::new()
}
