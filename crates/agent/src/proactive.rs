//! Proactivity engine.
//!
//! Deterministic rules deciding which backend calls MUST run this turn,
//! before and instead of any LLM planning. A non-empty result skips the
//! text-generation step entirely; the executor and synthesizer run on the
//! forced calls alone.

use booking_agent_core::{FunctionCall, FunctionName, Scenario, SlotSet};
use serde_json::json;

/// Combined "YYYY-MM-DDTHH:MM:SS" for the duplicate check and booking.
fn combine_datetime(date: &str, time: &str) -> String {
    format!("{}T{}:00", date, time)
}

/// Forced calls for one turn. Side-effect-free and order-preserving:
/// validations come before availability and duplicate checks.
pub fn forced_calls(scenario: Scenario, slots: &SlotSet) -> Vec<FunctionCall> {
    let mut calls = Vec::new();

    match scenario {
        // Always present the catalog so the model never greets with an
        // open-ended question.
        Scenario::Greeting => {
            calls.push(FunctionCall::bare(FunctionName::ListProcedures));
        }

        // Confirmation re-validates unconditionally. Validation flags from
        // earlier turns are stale by definition here: the user may have
        // corrected a field since they were set.
        Scenario::Confirmation => {
            if let Some(procedure) = slots.procedure.as_deref() {
                calls.push(FunctionCall::new(
                    FunctionName::ValidateProcedure,
                    json!({"name": procedure}),
                ));
            }
            if let Some(unit) = slots.unit.as_deref() {
                calls.push(FunctionCall::new(
                    FunctionName::ValidateUnit,
                    json!({"name": unit}),
                ));
            }
            if let (Some(unit), Some(date), Some(time)) = (
                slots.unit.as_deref(),
                slots.date.as_deref(),
                slots.time.as_deref(),
            ) {
                let mut availability = json!({"unit": unit, "date": date});
                if let Some(procedure) = slots.procedure.as_deref() {
                    availability["procedure"] = json!(procedure);
                }
                calls.push(FunctionCall::new(
                    FunctionName::CheckAvailability,
                    availability,
                ));
                if let Some(name) = slots.name.as_deref() {
                    calls.push(FunctionCall::new(
                        FunctionName::CheckDuplicate,
                        json!({
                            "name": name,
                            "unit": unit,
                            "datetime": combine_datetime(date, time),
                        }),
                    ));
                }
            }
        }

        Scenario::Scheduling => {
            if slots.booking_complete() {
                // booking_complete guarantees the five fields below
                let name = slots.name.as_deref().unwrap_or_default();
                let procedure = slots.procedure.as_deref().unwrap_or_default();
                let unit = slots.unit.as_deref().unwrap_or_default();
                let date = slots.date.as_deref().unwrap_or_default();
                let time = slots.time.as_deref().unwrap_or_default();

                let mut arguments = json!({
                    "name": name,
                    "procedure": procedure,
                    "unit": unit,
                    "datetime": combine_datetime(date, time),
                });
                // email is omitted entirely rather than sent empty
                if let Some(email) = slots.email.as_deref() {
                    arguments["email"] = json!(email);
                }
                calls.push(FunctionCall::new(FunctionName::CreateAppointment, arguments));
            }
        }

        // Present the unit options before the model has to ask for one.
        Scenario::DataCollection => {
            if slots.name.is_some() && slots.procedure.is_some() && slots.unit.is_none() {
                calls.push(FunctionCall::bare(FunctionName::ListUnits));
            }
        }

        Scenario::InitialMessage | Scenario::Faq | Scenario::ErrorHandling => {}
    }

    calls
}
