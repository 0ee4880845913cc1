//! The engine facade: registry, public `stream`/`send`/`execute_tool` entry
//! points (spec.md §6).

use crate::error::EngineError;
use crate::message::{new_id, Message, ToolUse};
use crate::middleware::MiddlewareStack;
use crate::pipeline::stream_iteration::{self, StreamIterationContext, StreamIterationResult};
use crate::pipeline::streaming::{self, StreamContext, StreamResult};
use crate::pipeline::tool_execution::{self, ToolExecutionContext};
use crate::pipeline::ProviderResolver;
use crate::provider::ProviderFactory;
use crate::provider::ProviderRegistry;
use crate::tool::{Tool, ToolTask};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The provider-agnostic conversational-agent engine.
///
/// Instance-scoped: the only state carried between calls is the provider
/// cache (spec.md §6: "Persisted state: none" beyond that). Construct one,
/// register providers and middleware at startup, then call [`Engine::stream`]
/// or [`Engine::send`] per conversation turn.
pub struct Engine {
    registry: Arc<ProviderRegistry>,
    streaming: MiddlewareStack<StreamContext, StreamResult>,
    stream_iteration: MiddlewareStack<StreamIterationContext, StreamIterationResult>,
    tool_execution: MiddlewareStack<ToolExecutionContext, Vec<ToolTask>>,
    default_max_iterations: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ProviderRegistry::new()),
            streaming: streaming::default_stack(),
            stream_iteration: stream_iteration::default_stack(),
            tool_execution: tool_execution::default_stack(),
            default_max_iterations: 10,
        }
    }

    pub fn with_config(config: &crate::config::EngineConfig) -> Self {
        let mut engine = Self::new();
        engine.default_max_iterations = config.max_iterations;
        engine
    }

    /// Registers `anthropic`/`openai` reference-adapter factories, reading
    /// credentials from the environment lazily — they remain un-instantiated
    /// until first use (spec.md §4.1). Failure to find credentials at
    /// registration time is not an error; it only surfaces when the factory
    /// actually runs.
    pub async fn with_default_providers() -> Result<Self, EngineError> {
        let engine = Self::new();
        engine
            .add_provider("anthropic", crate::providers::anthropic::factory_from_env(), false)
            .await?;
        engine
            .add_provider("openai", crate::providers::openai::factory_from_env(), false)
            .await?;
        Ok(engine)
    }

    pub async fn add_provider(&self, name: &str, factory: ProviderFactory, override_existing: bool) -> Result<(), EngineError> {
        self.registry.add_provider(name, factory, override_existing).await
    }

    pub fn streaming(&self) -> &MiddlewareStack<StreamContext, StreamResult> {
        &self.streaming
    }

    pub fn streaming_mut(&mut self) -> &mut MiddlewareStack<StreamContext, StreamResult> {
        &mut self.streaming
    }

    pub fn stream_iteration(&self) -> &MiddlewareStack<StreamIterationContext, StreamIterationResult> {
        &self.stream_iteration
    }

    pub fn stream_iteration_mut(&mut self) -> &mut MiddlewareStack<StreamIterationContext, StreamIterationResult> {
        &mut self.stream_iteration
    }

    pub fn tool_execution(&self) -> &MiddlewareStack<ToolExecutionContext, Vec<ToolTask>> {
        &self.tool_execution
    }

    pub fn tool_execution_mut(&mut self) -> &mut MiddlewareStack<ToolExecutionContext, Vec<ToolTask>> {
        &mut self.tool_execution
    }

    fn provider_resolver(&self) -> ProviderResolver {
        let registry = self.registry.clone();
        Arc::new(move |model_id: String| {
            let registry = registry.clone();
            Box::pin(async move { registry.get_provider(&model_id).await })
        })
    }

    /// Returns a lazy sequence of every event the conversation loop produces.
    pub async fn stream(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        max_iterations: Option<usize>,
    ) -> Result<StreamResult, EngineError> {
        streaming::validate_input(&messages)?;
        let ctx = StreamContext {
            model: model.to_string(),
            tools,
            messages,
            max_iterations: max_iterations.unwrap_or(self.default_max_iterations),
            iteration: 0,
            provider_resolver: self.provider_resolver(),
            stream_iteration_handler: self.stream_iteration.build(stream_iteration::terminal_handler()),
            tool_execution_handler: self.tool_execution.build(tool_execution::terminal_handler()),
        };
        let handler = self.streaming.build(streaming::terminal_handler());
        Ok(handler(ctx).await)
    }

    /// Drains [`Engine::stream`] and returns only the portion appended to
    /// history (the original inputs are not echoed), per spec.md §6.
    pub async fn send(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        max_iterations: Option<usize>,
    ) -> Result<Vec<Message>, EngineError> {
        let mut stream = self.stream(model, messages, tools, max_iterations).await?;
        let mut out = Vec::new();
        while let Some(event) = stream.next().await {
            out.push(event?);
        }
        Ok(out)
    }

    /// Runs a single tool invocation through the `tool_execution` middleware
    /// stack (spec.md §4.7), so the same interception points used by the
    /// conversation loop apply here too.
    pub async fn execute_tool(
        &self,
        tool: Tool,
        params: Value,
        messages: Vec<Message>,
        metadata: HashMap<String, Value>,
    ) -> Result<Value, EngineError> {
        let params_map = match params {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let tool_use = ToolUse { id: new_id(), name: tool.name.clone(), params: params_map, metadata };
        let ctx = ToolExecutionContext {
            tool_uses: vec![tool_use],
            tools: vec![tool.clone()],
            messages,
            iteration: 0,
        };
        let handler = self.tool_execution.build(tool_execution::terminal_handler());
        let mut tasks = handler(ctx).await;
        let task = tasks.pop().ok_or_else(|| EngineError::validation("execute_tool produced no task"))?;
        let result = task.await;
        if result.is_error {
            Err(EngineError::ToolExecution { tool: tool.name, message: result.result })
        } else {
            Ok(serde_json::from_str(&result.result).unwrap_or(Value::String(result.result)))
        }
    }

    /// Closes all cached providers, aggregating failures.
    pub async fn close(&self) -> Result<(), EngineError> {
        self.registry.close().await
    }
}
