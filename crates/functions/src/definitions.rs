//! Tool definitions published to the LLM.

use booking_agent_llm::{ToolBuilder, ToolDefinition};

/// The seven backend functions, described as JSON-schema tools.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolBuilder::new(
            "list_procedures",
            "List all procedures that can be booked.",
        )
        .build(),
        ToolBuilder::new("list_units", "List all units where appointments can be booked.").build(),
        ToolBuilder::new(
            "validate_procedure",
            "Check whether a procedure exists in the catalog.",
        )
        .string("name", "Procedure name exactly as the patient said it", true)
        .build(),
        ToolBuilder::new("validate_unit", "Check whether a unit exists.")
            .string("name", "Unit name exactly as the patient said it", true)
            .build(),
        ToolBuilder::new(
            "check_availability",
            "List available time slots at a unit on a given date.",
        )
        .string("unit", "Unit name", true)
        .string("date", "Date in YYYY-MM-DD", true)
        .string("procedure", "Procedure name", false)
        .build(),
        ToolBuilder::new(
            "check_duplicate",
            "Check whether the patient already has a booking at this exact date and time.",
        )
        .string("name", "Patient name", true)
        .string("unit", "Unit name", true)
        .string("datetime", "Combined date and time, YYYY-MM-DDTHH:MM:SS", true)
        .build(),
        ToolBuilder::new(
            "create_appointment",
            "Create the appointment once every field is confirmed by the patient.",
        )
        .string("name", "Patient name", true)
        .string("procedure", "Procedure name", true)
        .string("unit", "Unit name", true)
        .string("datetime", "Combined date and time, YYYY-MM-DDTHH:MM:SS", true)
        .string("email", "Contact email, omit when not provided", false)
        .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_agent_core::FunctionName;

    #[test]
    fn every_definition_resolves_to_a_known_function() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 7);
        for definition in &definitions {
            assert!(
                FunctionName::parse(&definition.name).is_some(),
                "unmapped tool {}",
                definition.name
            );
        }
    }
}
