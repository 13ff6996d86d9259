//! Mulberry Core Library
//!
//! This library provides core functionality for the Mulberry load balancer including:
//! - Configuration model and defaults
//! - Configuration loading (TOML file or command-line node list)
//! - Configuration validation

pub mod config;

// Re-export commonly used types
pub use config::model::{Config, ConfigError, GlobalSettings, SelectionMode};
