//! Lenient decoding of backend payloads.
//!
//! The backend's listing and availability payloads vary in wrapping; these
//! helpers accept the known shapes and return plain strings, which is all
//! the synthesizer and catalogs ever need.

use serde_json::Value;

/// Displayable names out of a listing payload: a bare array of strings, an
/// array of objects with a `name`, or an object wrapping such an array
/// under a known key.
pub fn names(data: &Value) -> Vec<String> {
    let array = if let Some(array) = data.as_array() {
        Some(array)
    } else {
        ["procedures", "units", "items", "options"]
            .iter()
            .find_map(|key| data.get(key).and_then(Value::as_array))
    };

    array
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Available times out of an availability payload: `available_times` or
/// `times` string arrays, or a `slots` array of `{time, available}`
/// objects where anything not explicitly unavailable counts.
pub fn available_times(data: &Value) -> Vec<String> {
    if let Some(times) = ["available_times", "times"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_array))
    {
        return times
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    data.get("slots")
        .and_then(Value::as_array)
        .map(|slots| {
            slots
                .iter()
                .filter_map(|slot| {
                    let available = slot.get("available").and_then(Value::as_bool).unwrap_or(true);
                    if !available {
                        return None;
                    }
                    slot.get("time").and_then(Value::as_str).map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}
