//! The stream-iteration pipeline: one round-trip to a provider, yielding
//! deltas and one aggregate (spec.md §4.3).
//!
//! `R` is widened from the spec's literal "lazy sequence of AssistantMessage"
//! to a sequence of [`Message`] so that a stream-iteration middleware can
//! interleave its own `AppMessage`s into the per-iteration event stream —
//! the loop's step 2 (spec.md §4.4) explicitly branches on `role == "app"`
//! for events coming out of this pipeline, which only makes sense if the
//! pipeline's result type admits that variant.

use crate::message::Message;
use crate::middleware::{Handler, MiddlewareStack};
use crate::pipeline::ProviderResolver;
use crate::tool::Tool;
use crate::error::EngineError;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct StreamIterationContext {
    pub model: String,
    pub tools: Vec<Tool>,
    pub messages: Vec<Message>,
    pub iteration: usize,
    pub provider_resolver: ProviderResolver,
}

pub type StreamIterationResult = BoxStream<'static, Result<Message, EngineError>>;

/// Resolves the provider for `ctx.model`, then forwards to
/// `Provider::stream`, mapping each yielded `AssistantMessage` into
/// `Message::Assistant`.
pub fn terminal_handler() -> Handler<StreamIterationContext, StreamIterationResult> {
    Arc::new(|ctx: StreamIterationContext| {
        Box::pin(async move {
            let resolved = (ctx.provider_resolver)(ctx.model.clone()).await;
            let (provider, model_name) = match resolved {
                Ok(pair) => pair,
                Err(e) => return Box::pin(futures_util::stream::once(async move { Err(e) })) as StreamIterationResult,
            };
            let inner = provider.stream(model_name, ctx.messages, ctx.tools, Default::default());
            let mapped = inner.map(|item| item.map(Message::Assistant));
            Box::pin(mapped) as StreamIterationResult
        })
    })
}

pub fn default_stack() -> MiddlewareStack<StreamIterationContext, StreamIterationResult> {
    MiddlewareStack::new()
}
