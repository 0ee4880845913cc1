//! Provider adapters: translate engine messages to/from provider wire
//! messages and stream events (spec.md §4.2).
//!
//! `mock` is a deterministic, scriptable adapter used by tests and the
//! literal S1–S6 scenarios in spec.md §8. `anthropic` and `openai` are
//! reference adapters grounded in the teacher's `clients/common.rs` wire
//! translation, talking to a generic JSON HTTP shape rather than a vendored
//! SDK (out of scope per spec.md §1).

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod openai_compat;
