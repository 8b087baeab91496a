//! Shared, dependency-light types used by both the engine and the CLI.
//!
//! This crate mirrors the role the original client-core crate played: a
//! small home for config shapes that need to be loaded before the engine
//! starts, kept free of the engine's heavier dependency surface.

pub mod config;

pub use config::{load_queue_config, ConfigError, QueueRecord};
