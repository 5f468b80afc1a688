//! Alternative time-slot suggestions.

/// "HH:MM" to minutes from midnight.
fn to_minutes(time: &str) -> Option<i32> {
    let (h, m) = time.split_once(':')?;
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    if (0..24).contains(&hours) && (0..60).contains(&minutes) {
        Some(hours * 60 + minutes)
    } else {
        None
    }
}

/// Rank available times by absolute minute distance from the requested
/// time, ties broken by the earlier time. Duplicates are dropped; at most
/// `max` suggestions come back. Unparseable entries are skipped.
pub fn closest_times(available: &[String], requested: &str, max: usize) -> Vec<String> {
    let target = match to_minutes(requested) {
        Some(t) => t,
        None => return Vec::new(),
    };

    let mut candidates: Vec<(i32, i32, &str)> = available
        .iter()
        .filter_map(|time| {
            let minutes = to_minutes(time)?;
            Some(((minutes - target).abs(), minutes, time.as_str()))
        })
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut out: Vec<String> = Vec::with_capacity(max);
    for (_, _, time) in candidates {
        if out.iter().any(|t| t == time) {
            continue;
        }
        out.push(time.to_string());
        if out.len() == max {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn ranks_by_minute_distance() {
        let available = times(&["09:00", "09:30", "14:00"]);
        let suggestions = closest_times(&available, "13:45", 3);
        assert_eq!(suggestions, times(&["14:00", "09:30", "09:00"]));
    }

    #[test]
    fn ties_break_toward_the_earlier_time() {
        let available = times(&["10:00", "12:00"]);
        let suggestions = closest_times(&available, "11:00", 2);
        assert_eq!(suggestions, times(&["10:00", "12:00"]));
    }

    #[test]
    fn caps_and_dedupes() {
        let available = times(&["09:00", "09:00", "10:00", "11:00", "12:00"]);
        let suggestions = closest_times(&available, "09:10", 3);
        assert_eq!(suggestions, times(&["09:00", "10:00", "11:00"]));
    }

    #[test]
    fn invalid_input_is_skipped_or_empty() {
        let available = times(&["garbage", "10:00"]);
        assert_eq!(closest_times(&available, "09:00", 3), times(&["10:00"]));
        assert!(closest_times(&available, "not-a-time", 3).is_empty());
    }
}
