//! Provider registry and capability (spec.md §4.1, §4.2).
//!
//! Grounded in the teacher's `ClientWrapper` trait (`client_wrapper.rs`) for
//! the capability shape, and in the double-check-locking guidance of
//! spec.md §5 for the registry; the teacher itself has no registry (callers
//! construct one `ClientWrapper` directly), so the registry's locking
//! strategy is pack-sourced judgement rather than a direct port: a single
//! `tokio::sync::Mutex` around the whole map, because instantiation must be
//! serialized end-to-end per provider name, not merely read-locked the way
//! the teacher guards `tool_registry`/`thought_chain` with `Arc<RwLock<_>>`.

use crate::error::EngineError;
use crate::message::{AssistantMessage, Message};
use crate::tool::Tool;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Free-form per-call options (the `...opts` of spec.md §6).
pub type ProviderOptions = HashMap<String, serde_json::Value>;

/// A remote LLM back end accessed through an adapter.
///
/// Implementations MUST be safe for concurrent use (spec.md §5: "Providers
/// themselves are reused across calls; they must be safe for concurrent
/// use").
#[async_trait]
pub trait Provider: Send + Sync {
    /// Cost estimate; does not call the remote service in most adapters.
    async fn count_tokens(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Tool],
        opts: &ProviderOptions,
    ) -> Result<usize, EngineError>;

    /// A non-streaming call producing a single aggregate assistant message.
    async fn send(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Tool],
        opts: &ProviderOptions,
    ) -> Result<AssistantMessage, EngineError>;

    /// Yields zero or more deltas (`is_aggregate = false`) followed by
    /// exactly one aggregate (`is_aggregate = true`). Implementations that
    /// receive their content in fragments (SSE chunks, scripted test deltas)
    /// must buffer and flush per spec.md §4.2: a completed run of text or a
    /// completed tool-call block is flushed as soon as a different content
    /// kind — or a different tool-call index — begins, and whatever remains
    /// is flushed once the underlying transport ends, immediately followed by
    /// the aggregate.
    fn stream(
        &self,
        model: String,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        opts: ProviderOptions,
    ) -> BoxStream<'static, Result<AssistantMessage, EngineError>>;

    /// Releases any held resources (HTTP connections, etc). Default is a
    /// no-op, matching providers with nothing to tear down.
    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Splits a composite model id on the first `/` (spec.md §4.1). Both parts
/// must be non-empty.
pub fn parse_model(model_id: &str) -> Result<(String, String), EngineError> {
    match model_id.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok((provider.to_string(), model.to_string()))
        }
        _ => Err(EngineError::validation(format!(
            "invalid model id {model_id:?}: expected \"<provider>/<model>\""
        ))),
    }
}

/// Zero-argument factory producing a fresh provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn Provider>, EngineError> + Send + Sync>;

enum ProviderSlot {
    Uninit(ProviderFactory),
    Cached(Arc<dyn Provider>),
}

/// Maps provider names to cached instances or factories, with lazy,
/// at-most-once instantiation (spec.md §4.1).
pub struct ProviderRegistry {
    slots: Mutex<HashMap<String, ProviderSlot>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// An empty registry. `anthropic`/`openai` default factories (spec.md
    /// §4.1: "pre-registered but remain un-instantiated until first use")
    /// are wired in by [`crate::engine::Engine::new`], not here, so this
    /// type stays usable standalone in tests without pulling in the
    /// reference adapters' env-var requirements.
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Registers a factory under `name`. Without `override_existing`, a name
    /// already present fails validation. With it, the factory is replaced
    /// and any cached instance for that name is evicted.
    pub async fn add_provider(
        &self,
        name: impl Into<String>,
        factory: ProviderFactory,
        override_existing: bool,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("agentengine::provider::ProviderRegistry::add_provider(...): registering {name:?} (override_existing={override_existing})");
        }
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&name) && !override_existing {
            return Err(EngineError::validation(format!(
                "provider {name:?} is already registered; pass override=true to replace it"
            )));
        }
        slots.insert(name, ProviderSlot::Uninit(factory));
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("agentengine::provider::ProviderRegistry::add_provider(...): registered, {} name(s) now known", slots.len());
        }
        Ok(())
    }

    /// Resolves `model_id` into `(provider, model_name)`, instantiating the
    /// provider on first use and caching it (double-check locking: the
    /// whole map is held for the duration of the check-and-maybe-instantiate
    /// section, so a factory runs at most once even under concurrent
    /// callers).
    pub async fn get_provider(&self, model_id: &str) -> Result<(Arc<dyn Provider>, String), EngineError> {
        let (provider_name, model_name) = parse_model(model_id)?;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("agentengine::provider::ProviderRegistry::get_provider(...): resolving {model_id:?}");
        }
        let mut slots = self.slots.lock().await;
        match slots.get(&provider_name) {
            None => Err(EngineError::validation(format!("provider {provider_name:?} is not supported"))),
            Some(ProviderSlot::Cached(p)) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("agentengine::provider::ProviderRegistry::get_provider(...): {provider_name:?} served from cache");
                }
                Ok((p.clone(), model_name))
            }
            Some(ProviderSlot::Uninit(_)) => {
                let factory = match slots.remove(&provider_name) {
                    Some(ProviderSlot::Uninit(f)) => f,
                    _ => unreachable!(),
                };
                let provider = match factory() {
                    Ok(p) => p,
                    Err(e) => {
                        // Leave the factory in place so a later call (e.g. once
                        // credentials are set) can retry, instead of silently
                        // evicting the provider name from the registry.
                        slots.insert(provider_name, ProviderSlot::Uninit(factory));
                        return Err(e);
                    }
                };
                slots.insert(provider_name.clone(), ProviderSlot::Cached(provider.clone()));
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("agentengine::provider::ProviderRegistry::get_provider(...): {provider_name:?} instantiated and cached");
                }
                Ok((provider, model_name))
            }
        }
    }

    /// Closes every cached provider concurrently, aggregating failures.
    pub async fn close(&self) -> Result<(), EngineError> {
        let cached: Vec<Arc<dyn Provider>> = {
            let slots = self.slots.lock().await;
            slots
                .values()
                .filter_map(|slot| match slot {
                    ProviderSlot::Cached(p) => Some(p.clone()),
                    ProviderSlot::Uninit(_) => None,
                })
                .collect()
        };
        let results = futures_util::future::join_all(cached.iter().map(|p| p.close())).await;
        let failures: Vec<EngineError> = results.into_iter().filter_map(|r| r.err()).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Shutdown(failures))
        }
    }
}
