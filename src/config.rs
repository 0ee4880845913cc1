//! Global configuration for the engine.
//!
//! Intentionally minimal, matching the teacher's `CloudLLMConfig`: a plain
//! struct with a `Default` impl, constructed however the caller likes. No
//! TOML/YAML/env-file parsing dependency is introduced.
//!
//! # Example
//!
//! ```rust
//! use agentengine::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.max_iterations, 10);
//! ```

use std::time::Duration;

/// Global configuration for engine behavior that isn't per-call.
///
/// `max_iterations` is the default used by [`crate::engine::Engine::send`] and
/// [`crate::engine::Engine::stream`] when a caller asks for the conversation
/// loop's default cap rather than supplying one explicitly; `http_timeout` and
/// `http_pool_idle_timeout` tune the shared HTTP client reference adapters use.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on conversation-loop iterations (spec.md §4.4's
    /// `max_iterations`) when a caller doesn't override it per call.
    pub max_iterations: usize,
    /// Request timeout for the shared HTTP client used by reference adapters.
    pub http_timeout: Duration,
    /// Idle-connection timeout for the shared HTTP client's connection pool.
    pub http_pool_idle_timeout: Duration,
}

impl Default for EngineConfig {
    /// `max_iterations = 10`, `http_timeout = 60s`, `http_pool_idle_timeout = 90s`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use agentengine::EngineConfig;
    ///
    /// let config = EngineConfig::default();
    /// assert_eq!(config.max_iterations, 10);
    /// ```
    fn default() -> Self {
        Self {
            max_iterations: 10,
            http_timeout: Duration::from_secs(60),
            http_pool_idle_timeout: Duration::from_secs(90),
        }
    }
}
