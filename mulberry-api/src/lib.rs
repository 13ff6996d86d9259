//! Mulberry Server Library
//!
//! This library wires the node pool, health checker and relay into an axum server

pub mod app;
pub mod args;

// Re-export the main server function
pub use app::{create_app, init_tracing, start_server, AppState};
pub use args::Args;
