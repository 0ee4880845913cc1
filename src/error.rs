//! Error taxonomy for the engine.
//!
//! Mirrors the table in the design's error-handling section: validation
//! failures are synchronous and block an iteration from ever starting,
//! provider failures propagate through the event stream and end the current
//! call, tool failures never reach this type (they are captured as
//! `ToolResult { is_error: true }` by the tool-execution pipeline), and
//! shutdown failures are aggregated from concurrent `Provider::close` calls.
//!
//! Grounded in the teacher's mix of `Box<dyn Error>` and small `enum ...
//! impl Display` error types (`tool_protocol::ToolError`), tightened with
//! `thiserror` the way several sibling agent crates in the example pack do.

use thiserror::Error;

/// Errors raised by the engine, as distinct from a tool's own captured
/// failures (see [`crate::message::ToolResult`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A request was malformed before any provider call was attempted:
    /// a missing user message, an unparsable model id, an unknown
    /// provider, or a duplicate `add_provider` call without `override`.
    #[error("validation error: {0}")]
    Validation(String),

    /// The underlying provider raised while streaming or sending.
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `execute_tool` raised because the single tool invocation it drove
    /// through the tool-execution pipeline resulted in `is_error = true`.
    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// One or more cached providers failed to close.
    #[error("{} provider(s) failed to close", .0.len())]
    Shutdown(Vec<EngineError>),

    /// A tool's parameter type could not be reflected into a schema. Raised
    /// at tool-registration time, never at invocation time.
    #[error("tool schema error: {0}")]
    Schema(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn provider(provider: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::Provider {
            provider: provider.into(),
            source: Box::new(source),
        }
    }
}
