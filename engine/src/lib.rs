//! Dealcoach Engine Library
//!
//! This library provides the core functionality of the dealcoach engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// LLM backend abstraction layer
pub mod llm;

/// Session agent module: turn processing, parsing, and deal memory
pub mod agent;

/// Finalization pipeline module
pub mod finalize;

/// Session-addressed service facade
pub mod service;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
