//! Core types shared across the booking agent.
//!
//! This crate carries the domain vocabulary every other crate speaks:
//! conversation turns, the booking slot set, detected scenarios, and the
//! function-call envelope through which the orchestrator touches backend
//! state. It has no I/O and no async surface.

pub mod conversation;
pub mod error;
pub mod function;
pub mod response;
pub mod scenario;
pub mod slots;

pub use conversation::{Role, Turn};
pub use error::CoreError;
pub use function::{FunctionCall, FunctionName, FunctionOutcome};
pub use response::AgentReply;
pub use scenario::Scenario;
pub use slots::SlotSet;
