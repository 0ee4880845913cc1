//! A provider-agnostic, middleware-driven conversational-agent engine.
//!
//! The engine multiplexes one API surface over several remote language-model
//! services, runs an automated tool-use loop (model → tool invocation → tool
//! results → model, repeated until convergence), and streams incremental
//! results to the caller while giving operators programmatic interception
//! points at every stage via three composable middleware stacks.
//!
//! ```rust,no_run
//! use agentengine::{Engine, Message, UserMessage};
//! use agentengine::providers::mock::{MockProvider, MockTurn};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new();
//! engine
//!     .add_provider("mock", Arc::new(|| Ok(Arc::new(MockProvider::new(vec![MockTurn::text("hi")])) as _)), false)
//!     .await?;
//! let events = engine
//!     .send("mock/m", vec![Message::User(UserMessage::new("hello"))], vec![], None)
//!     .await?;
//! assert_eq!(events.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod middleware;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod schema;
pub mod tool;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use message::{
    new_id, AppMessage, AssistantContentBlock, AssistantMessage, Message, MessageId, SystemMessage, ToolMessage,
    ToolResult, ToolUse, UserMessage,
};
pub use middleware::{Handler, MiddlewareStack, Next};
pub use provider::{parse_model, Provider, ProviderFactory, ProviderOptions, ProviderRegistry};
pub use schema::{ParamType, SchemaError, ToolParams, ToolSchemaBuilder};
pub use tool::{Tool, ToolFn, ToolTask};
