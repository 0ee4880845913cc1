//! Reference `openai` provider adapter.
//!
//! See [`crate::providers::openai_compat`] for the shared wire translation;
//! this module only supplies OpenAI's default base URL and credential
//! environment variable.

use crate::error::EngineError;
use crate::provider::{Provider, ProviderFactory};
use crate::providers::openai_compat::OpenAiCompatProvider;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub fn factory_from_env() -> ProviderFactory {
    Arc::new(|| {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EngineError::validation("OPENAI_API_KEY is not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Arc::new(OpenAiCompatProvider::new("openai", base_url, api_key)) as Arc<dyn Provider>)
    })
}
