//! Topic naming and MQTT-style filter matching
//!
//! Valves publish on `sensors/valves/<valve_id>`. Filters use `/` separated
//! levels where `+` matches exactly one level and a trailing `#` matches any
//! remainder (including none).

/// Prefix shared by all valve topics
pub const VALVE_TOPIC_PREFIX: &str = "sensors/valves/";

/// Filter covering every valve topic
pub const ALL_VALVES_FILTER: &str = "sensors/valves/+";

/// Topic a valve publishes on
pub fn valve_topic(valve_id: &str) -> String {
    format!("{}{}", VALVE_TOPIC_PREFIX, valve_id)
}

/// Valve id named by a valve topic, if `topic` is one
pub fn device_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(VALVE_TOPIC_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Check whether `topic` matches `filter`
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// A filter is valid when `#` only appears as the whole last level and `+`
/// only as a whole level
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(i, level)| {
        if level.contains('#') {
            *level == "#" && i == levels.len() - 1
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}
