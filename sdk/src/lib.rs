//! Framewright SDK
//!
//! Shared library providing the collaborator traits and types the engine is
//! wired against: the actuator, the judge, the knowledge repository and the
//! approval gate.

/// Actuator trait, outcomes and screen events
pub mod actuator;

/// Approval gate trait
pub mod approval;

/// Error types and handling
pub mod errors;

/// Judge trait and raw verdicts
pub mod judge;

/// Knowledge repository trait
pub mod knowledge;

// Re-export commonly used types
pub use actuator::{Actuator, ActuatorError, ActuatorErrorKind, ScreenEvent, TaskOutcome};
pub use approval::{ApprovalGate, ApprovalRequest};
pub use errors::{EngineError, ErrorExt};
pub use judge::{ChecklistItem, ChecklistStatus, Judge, JudgeContext, JudgeVerdict, Recommendation};
pub use knowledge::{KnowledgeEntry, KnowledgeFilter, KnowledgeRepository, NewKnowledge};
