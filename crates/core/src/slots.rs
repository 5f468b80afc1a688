//! Booking slot set.
//!
//! Every slot is an explicit `Option<String>`: `None` means "not yet known".
//! Empty or whitespace-only strings are rejected at the patch boundary so a
//! low-information extraction can never blank a field that was already
//! captured. Validation flags travel separately from values because a value
//! can be re-stated by the user without having been re-checked against the
//! backend catalogs.

use serde::{Deserialize, Serialize};

/// The five booking fields plus contact email, with per-field validation
/// markers for the fields the backend can confirm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotSet {
    pub name: Option<String>,
    pub procedure: Option<String>,
    pub unit: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub email: Option<String>,
    pub procedure_validated: bool,
    pub unit_validated: bool,
    pub date_validated: bool,
}

/// A partial update to a [`SlotSet`].
///
/// `None` means "leave the field alone"; for the boolean flags a `Some`
/// carries the new flag value so validation can both set and clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotPatch {
    pub name: Option<String>,
    pub procedure: Option<String>,
    pub unit: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub email: Option<String>,
    pub procedure_validated: Option<bool>,
    pub unit_validated: Option<bool>,
    pub date_validated: Option<bool>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SlotPatch {
    /// True when no field of the patch carries an update.
    pub fn is_empty(&self) -> bool {
        self == &SlotPatch::default()
    }
}

impl SlotSet {
    /// Apply a patch: non-empty values win, absent values leave the stored
    /// slot untouched. A value update for procedure/unit/date clears the
    /// corresponding validation flag unless the patch re-asserts it.
    pub fn apply(&mut self, patch: &SlotPatch) {
        if let Some(v) = non_empty(&patch.name) {
            self.name = Some(v);
        }
        if let Some(v) = non_empty(&patch.procedure) {
            if self.procedure.as_deref() != Some(v.as_str()) {
                self.procedure_validated = false;
            }
            self.procedure = Some(v);
        }
        if let Some(v) = non_empty(&patch.unit) {
            if self.unit.as_deref() != Some(v.as_str()) {
                self.unit_validated = false;
            }
            self.unit = Some(v);
        }
        if let Some(v) = non_empty(&patch.date) {
            if self.date.as_deref() != Some(v.as_str()) {
                self.date_validated = false;
            }
            self.date = Some(v);
        }
        if let Some(v) = non_empty(&patch.time) {
            self.time = Some(v);
        }
        if let Some(v) = non_empty(&patch.email) {
            self.email = Some(v);
        }
        if let Some(b) = patch.procedure_validated {
            self.procedure_validated = b;
        }
        if let Some(b) = patch.unit_validated {
            self.unit_validated = b;
        }
        if let Some(b) = patch.date_validated {
            self.date_validated = b;
        }
    }

    /// All five booking fields captured (email is optional for booking).
    pub fn booking_complete(&self) -> bool {
        self.name.is_some()
            && self.procedure.is_some()
            && self.unit.is_some()
            && self.date.is_some()
            && self.time.is_some()
    }

    /// Human-readable labels of the booking fields still missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.procedure.is_none() {
            missing.push("procedure");
        }
        if self.unit.is_none() {
            missing.push("unit");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.time.is_none() {
            missing.push("time");
        }
        missing
    }

    /// Wipe all fields and flags. Used after a completed booking so the
    /// next conversation in the same session starts clean.
    pub fn reset(&mut self) {
        *self = SlotSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> SlotSet {
        SlotSet {
            name: Some("Alice Moore".into()),
            procedure: Some("Dental cleaning".into()),
            unit: Some("Downtown clinic".into()),
            date: Some("2026-09-01".into()),
            time: Some("14:00".into()),
            email: Some("alice@example.com".into()),
            procedure_validated: true,
            unit_validated: true,
            date_validated: false,
        }
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut slots = full();
        slots.apply(&SlotPatch::default());
        assert_eq!(slots, full());
    }

    #[test]
    fn blank_values_never_clear_fields() {
        let mut slots = full();
        slots.apply(&SlotPatch {
            name: Some("   ".into()),
            procedure: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(slots.name.as_deref(), Some("Alice Moore"));
        assert_eq!(slots.procedure.as_deref(), Some("Dental cleaning"));
        // unchanged value keeps its validation flag
        assert!(slots.procedure_validated);
    }

    #[test]
    fn changed_value_drops_validation_flag() {
        let mut slots = full();
        slots.apply(&SlotPatch {
            procedure: Some("Root canal".into()),
            ..Default::default()
        });
        assert_eq!(slots.procedure.as_deref(), Some("Root canal"));
        assert!(!slots.procedure_validated);
        assert!(slots.unit_validated);
    }

    #[test]
    fn patch_can_set_and_clear_flags() {
        let mut slots = full();
        slots.apply(&SlotPatch {
            unit_validated: Some(false),
            date_validated: Some(true),
            ..Default::default()
        });
        assert!(!slots.unit_validated);
        assert!(slots.date_validated);
    }

    #[test]
    fn completeness_ignores_email() {
        let mut slots = full();
        slots.email = None;
        assert!(slots.booking_complete());
        slots.time = None;
        assert!(!slots.booking_complete());
        assert_eq!(slots.missing_fields(), vec!["time"]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut slots = full();
        slots.reset();
        assert_eq!(slots, SlotSet::default());
    }
}
