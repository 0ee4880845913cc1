//! Reference `anthropic` provider adapter.
//!
//! Talks to an OpenAI-compatible Chat Completions surface (the shape
//! Anthropic's own compatibility endpoint exposes) rather than a vendored
//! Anthropic SDK — concrete provider SDKs are explicitly out of scope
//! (spec.md §1). See [`crate::providers::openai_compat`] for the shared wire
//! translation this adapter reuses.

use crate::error::EngineError;
use crate::provider::{Provider, ProviderFactory};
use crate::providers::openai_compat::OpenAiCompatProvider;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// A factory that reads `ANTHROPIC_API_KEY` (and optionally
/// `ANTHROPIC_BASE_URL`) lazily, the first time the `anthropic` provider is
/// actually used (spec.md §4.1: "remain un-instantiated until first use").
/// Missing credentials surface as a validation failure from the factory
/// call, not at registration time.
pub fn factory_from_env() -> ProviderFactory {
    Arc::new(|| {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| EngineError::validation("ANTHROPIC_API_KEY is not set"))?;
        let base_url = std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Arc::new(OpenAiCompatProvider::new("anthropic", base_url, api_key)) as Arc<dyn Provider>)
    })
}
