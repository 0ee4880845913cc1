//! Callable tools (spec.md §3's `Tool` value object, §4.5's invocation
//! contract).
//!
//! `func` is held by reference (`Arc<dyn ToolFn>`) and invoked by the
//! tool-execution terminal handler, directly modeled on the teacher's
//! `AsyncToolFunction` alias in `tool_adapters.rs` — generalized to
//! async-only. A synchronous caller-provided closure is wrapped with
//! [`Tool::from_sync_fn`], which off-loads it to `tokio::task::spawn_blocking`
//! (the documented choice for spec.md §5's "SHOULD schedule sync tools on a
//! worker pool" guidance).

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A tool's callable body. `params` is the opaque mapping extracted from the
/// model's `ToolUse` block; the return value is serialized per
/// [`crate::message::serialize_tool_return`] by the caller of `call`.
#[async_trait]
pub trait ToolFn: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, String>;
}

struct AsyncFnTool<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolFn for AsyncFnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn call(&self, params: Value) -> Result<Value, String> {
        (self.f)(params).await
    }
}

struct SyncFnTool<F> {
    f: Arc<F>,
}

#[async_trait]
impl<F> ToolFn for SyncFnTool<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    async fn call(&self, params: Value) -> Result<Value, String> {
        let f = self.f.clone();
        tokio::task::spawn_blocking(move || f(params))
            .await
            .map_err(|e| format!("tool panicked: {e}"))?
    }
}

/// A boxed future producing one [`crate::message::ToolResult`], returned
/// unstarted by the tool-execution terminal handler so middleware can wrap,
/// substitute, or cancel it before the loop awaits it (spec.md §4.5).
pub type ToolTask = BoxFuture<'static, crate::message::ToolResult>;

#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped object, as produced by [`crate::schema`].
    pub parameters: Value,
    pub func: Arc<dyn ToolFn>,
    pub metadata: HashMap<String, Value>,
    /// Names of parameters [`crate::schema::ToolSchemaBuilder`] omitted from
    /// `parameters` via a hidden default (see
    /// [`crate::schema::ToolSchemaBuilder::hidden_param_names`]). A
    /// tool-execution middleware reads this to know which params to inject
    /// into `tool_use.params` before invocation — the model never supplies
    /// them, since they're absent from the schema it saw.
    pub hidden_params: Vec<String>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("metadata", &self.metadata)
            .field("hidden_params", &self.hidden_params)
            .finish_non_exhaustive()
    }
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: Arc<dyn ToolFn>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func,
            metadata: HashMap::new(),
            hidden_params: Vec::new(),
        }
    }

    /// Build a tool from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, description: impl Into<String>, parameters: Value, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::new(name, description, parameters, Arc::new(AsyncFnTool { f }))
    }

    /// Build a tool from a synchronous closure; invocation is offloaded to
    /// `spawn_blocking` (see module docs).
    pub fn from_sync_fn<F>(name: impl Into<String>, description: impl Into<String>, parameters: Value, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::new(name, description, parameters, Arc::new(SyncFnTool { f: Arc::new(f) }))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records which of this tool's parameters were hidden from its schema
    /// (typically `builder.hidden_param_names()`), so a tool-execution
    /// middleware can inject them by name before invocation.
    pub fn with_hidden_params(mut self, names: Vec<String>) -> Self {
        self.hidden_params = names;
        self
    }
}
