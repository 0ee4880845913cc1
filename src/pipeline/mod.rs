//! The three concrete middleware stacks (spec.md §4.3) and their terminal
//! handlers: [`stream_iteration`] (one provider round-trip), [`tool_execution`]
//! (parallel tool resolution), and [`streaming`] (the conversation loop that
//! wires the other two together).

pub mod stream_iteration;
pub mod streaming;
pub mod tool_execution;

use crate::error::EngineError;
use crate::provider::Provider;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Resolves a (possibly middleware-mutated) model id into its provider and
/// bare model name, reusing [`crate::provider::ProviderRegistry::get_provider`].
/// Threaded through contexts instead of a registry reference directly so the
/// stream-iteration terminal handler re-resolves per iteration, picking up a
/// middleware's mutation of `ctx.model` (property 10 in spec.md §8).
pub type ProviderResolver =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<(Arc<dyn Provider>, String), EngineError>> + Send + Sync>;
