//! System prompt assembly for the main conversational LLM call.

use crate::preload::Catalogs;
use booking_agent_core::{Scenario, SlotSet};
use booking_agent_rag::RagContext;

const BASE_PROMPT: &str = "\
You are a friendly, efficient appointment booking assistant for a clinic. \
Keep replies short and conversational. Collect exactly these fields before \
booking: patient name, procedure, unit, date and time (email is optional). \
Never invent procedures, units, availability or policies.";

fn scenario_guidance(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::Greeting => {
            "The patient just arrived. Greet them warmly and offer to book an appointment."
        }
        Scenario::InitialMessage => {
            "The patient opened with concrete details. Acknowledge what they gave you and ask only for what is still missing."
        }
        Scenario::DataCollection => {
            "You are mid-collection. Ask for the missing fields, at most two at a time."
        }
        Scenario::Confirmation => {
            "All fields are collected. Recap them in one compact summary and ask the patient to confirm before booking."
        }
        Scenario::Scheduling => {
            "The patient confirmed. Report the booking result you were given; do not re-ask anything."
        }
        Scenario::Faq => {
            "The patient asked a general question. Answer from the FAQ context below only, then steer back to booking."
        }
        Scenario::ErrorHandling => {
            "Something went wrong this turn. Apologize briefly and offer to retry or rephrase."
        }
    }
}

/// Inputs for one turn's system prompt.
pub struct PromptInputs<'a> {
    pub scenario: Scenario,
    pub slots: &'a SlotSet,
    pub catalogs: &'a Catalogs,
    pub rag: &'a RagContext,
    /// Notes from slot validation; empty when everything checked out.
    pub validation_context: &'a str,
    /// "YYYY-MM-DDTHH:MM:SS".
    pub current_datetime: &'a str,
    /// True when the backend clock was unreachable.
    pub degraded_clock: bool,
}

pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    prompt.push_str(&format!(
        "\n\nCurrent date and time: {}{}",
        inputs.current_datetime,
        if inputs.degraded_clock {
            " (local clock, backend time unavailable)"
        } else {
            ""
        }
    ));

    if !inputs.catalogs.procedures.is_empty() {
        prompt.push_str(&format!(
            "\nProcedures offered: {}",
            inputs.catalogs.procedures.join(", ")
        ));
    }
    if !inputs.catalogs.units.is_empty() {
        prompt.push_str(&format!("\nUnits: {}", inputs.catalogs.units.join(", ")));
    }

    if !inputs.validation_context.is_empty() {
        prompt.push_str(&format!(
            "\n\nValidation notes:\n{}",
            inputs.validation_context
        ));
    }

    prompt.push_str(&format!("\n\nThis turn: {}", scenario_guidance(inputs.scenario)));

    let collected = collected_lines(inputs.slots);
    if !collected.is_empty() {
        prompt.push_str(&format!(
            "\n\nAlready collected (do NOT ask for these again):\n{}",
            collected.join("\n")
        ));
    }
    let missing = inputs.slots.missing_fields();
    if !missing.is_empty() {
        prompt.push_str(&format!("\nStill missing: {}", missing.join(", ")));
    }

    if let Some(preferences) = &inputs.rag.preferences {
        let mut lines = Vec::new();
        if let Some(unit) = &preferences.preferred_unit {
            lines.push(format!("usually books at {}", unit));
        }
        if let Some(hour) = &preferences.preferred_hour {
            lines.push(format!("usually books around {}", hour));
        }
        if !preferences.procedures.is_empty() {
            lines.push(format!("past procedures: {}", preferences.procedures.join(", ")));
        }
        if !lines.is_empty() {
            prompt.push_str(&format!(
                "\n\nReturning patient history (use to suggest, never to assume): {}",
                lines.join("; ")
            ));
        }
    }

    if !inputs.rag.faq.is_empty() {
        prompt.push_str(
            "\n\nFAQ context (answer general questions ONLY from these; if the answer is not here, say you don't know):",
        );
        for faq in &inputs.rag.faq {
            prompt.push_str(&format!("\nQ: {}\nA: {}", faq.question, faq.answer));
        }
    }

    prompt
}

fn collected_lines(slots: &SlotSet) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(name) = &slots.name {
        lines.push(format!("- name: {}", name));
    }
    if let Some(procedure) = &slots.procedure {
        lines.push(format!("- procedure: {}", procedure));
    }
    if let Some(unit) = &slots.unit {
        lines.push(format!("- unit: {}", unit));
    }
    if let Some(date) = &slots.date {
        lines.push(format!("- date: {}", date));
    }
    if let Some(time) = &slots.time {
        lines.push(format!("- time: {}", time));
    }
    if let Some(email) = &slots.email {
        lines.push(format!("- email: {}", email));
    }
    lines
}
