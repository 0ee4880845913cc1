//! The tool-execution pipeline: resolves tool calls in parallel, producing
//! tool results (spec.md §4.3, §4.5).
//!
//! The terminal handler returns tasks, not results, "unstarted-from-the-
//! middleware's-view" so that middleware can wrap, substitute, or cancel any
//! task individually before the conversation loop awaits them jointly
//! (spec.md §4.5). A Rust future is lazy until polled, so a freshly built
//! `BoxFuture` genuinely hasn't run anything yet when it's handed back here —
//! no extra "unstarted" wrapper type is needed.

use crate::message::{serialize_tool_return, ToolResult, ToolUse};
use crate::middleware::{Handler, MiddlewareStack};
use crate::tool::{Tool, ToolTask};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct ToolExecutionContext {
    pub tool_uses: Vec<ToolUse>,
    pub tools: Vec<Tool>,
    pub messages: Vec<crate::message::Message>,
    pub iteration: usize,
}

pub fn terminal_handler() -> Handler<ToolExecutionContext, Vec<ToolTask>> {
    Arc::new(|ctx: ToolExecutionContext| {
        Box::pin(async move {
            let tool_map: HashMap<String, Tool> =
                ctx.tools.into_iter().map(|t| (t.name.clone(), t)).collect();
            let mut tasks: Vec<ToolTask> = Vec::with_capacity(ctx.tool_uses.len());
            for mut tool_use in ctx.tool_uses.into_iter() {
                match tool_map.get(&tool_use.name) {
                    None => {
                        let name = tool_use.name.clone();
                        let id = tool_use.id.clone();
                        if log::log_enabled!(log::Level::Warn) {
                            log::warn!("agentengine::pipeline::tool_execution::terminal_handler(...): tool {name:?} not found in this call's tool set");
                        }
                        tasks.push(Box::pin(
                            async move { ToolResult::failure(id, format!("Tool {name} not found")) },
                        ));
                    }
                    Some(tool) => {
                        // Runtime metadata (already present on tool_use, e.g. set by
                        // execute_tool's caller) wins on key conflict.
                        for (k, v) in tool.metadata.iter() {
                            tool_use.metadata.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                        let func = tool.func.clone();
                        let id = tool_use.id.clone();
                        let params = Value::Object(tool_use.params.clone());
                        tasks.push(Box::pin(async move {
                            match func.call(params).await {
                                Ok(v) => ToolResult::success(id, serialize_tool_return(&v)),
                                Err(e) => {
                                    if log::log_enabled!(log::Level::Warn) {
                                        log::warn!("agentengine::pipeline::tool_execution::terminal_handler(...): tool invocation failed: {e}");
                                    }
                                    ToolResult::failure(id, e)
                                }
                            }
                        }));
                    }
                }
            }
            tasks
        })
    })
}

pub fn default_stack() -> MiddlewareStack<ToolExecutionContext, Vec<ToolTask>> {
    MiddlewareStack::new()
}
