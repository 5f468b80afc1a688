//! Detected conversation scenarios.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The conversational state driving prompt selection and proactive calls
/// for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Greeting,
    InitialMessage,
    DataCollection,
    Confirmation,
    Scheduling,
    Faq,
    ErrorHandling,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Greeting => "greeting",
            Scenario::InitialMessage => "initial-message",
            Scenario::DataCollection => "data-collection",
            Scenario::Confirmation => "confirmation",
            Scenario::Scheduling => "scheduling",
            Scenario::Faq => "faq",
            Scenario::ErrorHandling => "error-handling",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Scenario::DataCollection).unwrap();
        assert_eq!(json, "\"data-collection\"");
        let back: Scenario = serde_json::from_str("\"initial-message\"").unwrap();
        assert_eq!(back, Scenario::InitialMessage);
    }
}
