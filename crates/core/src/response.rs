//! Per-turn agent reply.

use crate::function::FunctionCall;
use crate::scenario::Scenario;
use crate::slots::SlotSet;
use serde::{Deserialize, Serialize};

/// Everything the inbound API returns for one processed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    /// User-facing assistant text.
    pub response: String,
    /// Slot state after this turn's merge.
    pub slots: SlotSet,
    /// Backend functions executed during this turn, in order.
    pub function_calls: Vec<FunctionCall>,
    /// Human-handoff flag.
    pub needs_human: bool,
    /// Scenario detected for this turn.
    pub scenario: Scenario,
    /// Set once a booking completed; the session's slots were reset.
    pub session_completed: bool,
}

impl AgentReply {
    /// Plain text reply with no side effects.
    pub fn text(response: impl Into<String>, slots: SlotSet, scenario: Scenario) -> Self {
        Self {
            response: response.into(),
            slots,
            function_calls: Vec::new(),
            needs_human: false,
            scenario,
            session_completed: false,
        }
    }
}
