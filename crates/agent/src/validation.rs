//! Slot validation against the preloaded catalogs.
//!
//! Matching is lenient (case-insensitive, substring either way): "cleaning"
//! should hit "Dental Cleaning". A match normalizes the slot to the
//! catalog's canonical spelling and sets the validated flag; a miss clears
//! the flag and contributes a line to the validation context the prompt
//! builder surfaces to the model.

use crate::preload::Catalogs;
use booking_agent_core::slots::{SlotPatch, SlotSet};
use chrono::NaiveDate;

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub patch: SlotPatch,
    /// Human-readable notes for the prompt; empty when everything checks
    /// out.
    pub context_text: String,
}

pub struct ValidationService;

impl ValidationService {
    /// Check procedure and unit against the catalogs and the date against
    /// the calendar. `current_date` is "YYYY-MM-DD".
    pub fn validate(slots: &SlotSet, catalogs: &Catalogs, current_date: &str) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut notes: Vec<String> = Vec::new();

        if let Some(procedure) = slots.procedure.as_deref() {
            match find_match(procedure, &catalogs.procedures) {
                Some(canonical) => {
                    if canonical != procedure {
                        outcome.patch.procedure = Some(canonical.to_string());
                    }
                    outcome.patch.procedure_validated = Some(true);
                }
                None if catalogs.procedures.is_empty() => {}
                None => {
                    outcome.patch.procedure_validated = Some(false);
                    notes.push(format!(
                        "The stated procedure \"{}\" is not in the catalog.",
                        procedure
                    ));
                }
            }
        }

        if let Some(unit) = slots.unit.as_deref() {
            match find_match(unit, &catalogs.units) {
                Some(canonical) => {
                    if canonical != unit {
                        outcome.patch.unit = Some(canonical.to_string());
                    }
                    outcome.patch.unit_validated = Some(true);
                }
                None if catalogs.units.is_empty() => {}
                None => {
                    outcome.patch.unit_validated = Some(false);
                    notes.push(format!("The stated unit \"{}\" is not in the catalog.", unit));
                }
            }
        }

        if let Some(date) = slots.date.as_deref() {
            match check_date(date, current_date) {
                DateCheck::Valid => outcome.patch.date_validated = Some(true),
                DateCheck::Past => {
                    outcome.patch.date_validated = Some(false);
                    notes.push(format!("The requested date {} is in the past.", date));
                }
                DateCheck::Malformed => {
                    outcome.patch.date_validated = Some(false);
                    notes.push(format!(
                        "The requested date \"{}\" is not a valid YYYY-MM-DD date.",
                        date
                    ));
                }
            }
        }

        outcome.context_text = notes.join("\n");
        outcome
    }
}

/// Case-insensitive exact match first, then substring in either direction.
fn find_match<'a>(value: &str, catalog: &'a [String]) -> Option<&'a str> {
    let lowered = value.to_lowercase();
    if let Some(exact) = catalog.iter().find(|c| c.to_lowercase() == lowered) {
        return Some(exact.as_str());
    }
    catalog
        .iter()
        .find(|c| {
            let candidate = c.to_lowercase();
            candidate.contains(&lowered) || lowered.contains(&candidate)
        })
        .map(|c| c.as_str())
}

enum DateCheck {
    Valid,
    Past,
    Malformed,
}

fn check_date(date: &str, current_date: &str) -> DateCheck {
    let parsed = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return DateCheck::Malformed,
    };
    match NaiveDate::parse_from_str(current_date, "%Y-%m-%d") {
        Ok(today) if parsed < today => DateCheck::Past,
        _ => DateCheck::Valid,
    }
}
