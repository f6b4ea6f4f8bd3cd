//! # keyprobe core
//!
//! Provider adapters for keyprobe.
//!
//! This crate wraps the OpenAI, Anthropic and Gemini HTTP APIs behind the
//! [`LlmProvider`] trait:
//! - listing the models an API key can see
//! - validating a key without raising
//! - streaming a chat reply as a sequence of text fragments

pub mod ai;

// Re-export commonly used types
pub use keyprobe_shared::*;

pub use ai::providers::{BoxedProvider, ProviderFactory};
pub use ai::streaming::{ChatStream, StreamUtils};
pub use ai::LlmProvider;
