//! Backend function calls and their result envelope.
//!
//! Function calls are the only channel through which the orchestrator
//! touches appointment state. Results use a single tagged envelope with a
//! lazily-decoded JSON payload rather than a typed struct per endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend functions this agent can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionName {
    ListProcedures,
    ListUnits,
    ValidateProcedure,
    ValidateUnit,
    CheckAvailability,
    CheckDuplicate,
    CreateAppointment,
}

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::ListProcedures => "list_procedures",
            FunctionName::ListUnits => "list_units",
            FunctionName::ValidateProcedure => "validate_procedure",
            FunctionName::ValidateUnit => "validate_unit",
            FunctionName::CheckAvailability => "check_availability",
            FunctionName::CheckDuplicate => "check_duplicate",
            FunctionName::CreateAppointment => "create_appointment",
        }
    }

    /// Resolve a wire name as returned by the LLM tool-call API.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "list_procedures" => FunctionName::ListProcedures,
            "list_units" => FunctionName::ListUnits,
            "validate_procedure" => FunctionName::ValidateProcedure,
            "validate_unit" => FunctionName::ValidateUnit,
            "check_availability" => FunctionName::CheckAvailability,
            "check_duplicate" => FunctionName::CheckDuplicate,
            "create_appointment" => FunctionName::CreateAppointment,
            _ => return None,
        })
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invocation request: symbolic name plus a JSON argument object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: FunctionName,
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    pub fn new(name: FunctionName, arguments: serde_json::Value) -> Self {
        Self { name, arguments }
    }

    /// Call with no arguments.
    pub fn bare(name: FunctionName) -> Self {
        Self::new(name, serde_json::json!({}))
    }

    /// String argument lookup, trimmed, empty treated as absent.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Normalized result of executing a [`FunctionCall`].
///
/// Transport failures, non-2xx responses and application-level rejections
/// all land here as `success: false` with an error message; executing a
/// call never raises to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionOutcome {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }

    /// Field lookup inside the data payload.
    pub fn data_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_round_trip() {
        for name in [
            FunctionName::ListProcedures,
            FunctionName::ListUnits,
            FunctionName::ValidateProcedure,
            FunctionName::ValidateUnit,
            FunctionName::CheckAvailability,
            FunctionName::CheckDuplicate,
            FunctionName::CreateAppointment,
        ] {
            assert_eq!(FunctionName::parse(name.as_str()), Some(name));
        }
        assert_eq!(FunctionName::parse("drop_tables"), None);
    }

    #[test]
    fn str_arg_skips_blank_values() {
        let call = FunctionCall::new(
            FunctionName::CheckAvailability,
            json!({"unit": "Downtown", "date": "  ", "n": 3}),
        );
        assert_eq!(call.str_arg("unit"), Some("Downtown"));
        assert_eq!(call.str_arg("date"), None);
        assert_eq!(call.str_arg("n"), None);
    }

    #[test]
    fn failure_carries_message_and_null_data() {
        let outcome = FunctionOutcome::failure("backend unreachable");
        assert!(!outcome.success);
        assert!(outcome.data.is_null());
        assert_eq!(outcome.error.as_deref(), Some("backend unreachable"));
    }
}
