//! # keyprobe shared
//!
//! Shared types, configuration and errors for keyprobe.
//! This crate provides the foundation types used by the provider adapters and the CLI.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use types::*;
