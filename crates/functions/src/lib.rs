//! Backend function layer.
//!
//! Maps symbolic function names to HTTP routes on the domain backend,
//! publishes the matching tool definitions for the LLM, and executes calls
//! sequentially while normalizing every failure into the
//! [`booking_agent_core::FunctionOutcome`] envelope.

pub mod definitions;
pub mod executor;
pub mod payload;
pub mod registry;

pub use definitions::tool_definitions;
pub use executor::{CurrentDateTime, FunctionRunner, HttpFunctionExecutor};
pub use registry::{HttpMethod, Route};
