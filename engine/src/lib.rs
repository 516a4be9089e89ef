//! Framewright Engine Library
//!
//! This library provides the core functionality of the Framewright engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Feature map, curriculum and selection
pub mod features;

/// Reconnection, credit metering and screen monitoring around the actuator
pub mod actuator;

/// JSON-lines bridge to the external automation process
pub mod bridge;

/// Exploration and hands-on session controllers
pub mod session;

/// Production job pipeline
pub mod production;

/// Agent wiring the controllers together
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
