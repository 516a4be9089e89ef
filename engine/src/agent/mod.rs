//! Agent
//!
//! Top-level entry point used by the CLI: one agent per actuator, guarding
//! every actuator-driving operation against reentrancy and the kill switch.

pub mod core;

pub use self::core::{Agent, AgentDeps, AutoOutcome};
