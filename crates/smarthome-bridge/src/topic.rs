//! Topic parsing and filter matching.
//!
//! Device topics look like `devices/{device}/data`,
//! `devices/{device}/rfid/check` and `devices/{device}/status/{output}`.

/// The device segment of a device topic (the second segment).
///
/// ```
/// use smarthome_bridge::topic::device_segment;
///
/// assert_eq!(device_segment("devices/esp32_main/rfid/check"), Some("esp32_main"));
/// assert_eq!(device_segment("devices//data"), None);
/// assert_eq!(device_segment("devices"), None);
/// ```
pub fn device_segment(topic: &str) -> Option<&str> {
    topic.split('/').nth(1).filter(|s| !s.is_empty())
}

/// The output segment of a status topic (`door` in `devices/x/status/door`).
pub fn status_output(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    parts.nth(2).filter(|s| *s == "status")?;
    let rest: Vec<&str> = parts.collect();
    match rest.as_slice() {
        [output] if !output.is_empty() => Some(output),
        _ => None,
    }
}

/// Whether `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level
/// and everything below it.
///
/// ```
/// use smarthome_bridge::topic::topic_matches;
///
/// assert!(topic_matches("devices/+/data", "devices/esp32_main/data"));
/// assert!(topic_matches("devices/+/status/#", "devices/esp32_main/status/door"));
/// assert!(!topic_matches("devices/+/data", "devices/a/b/data"));
/// ```
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Check that a subscription filter is well formed.
pub fn validate_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("filter cannot be empty");
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err("'#' must be the whole last level");
        }
        if level.contains('+') && *level != "+" {
            return Err("'+' must occupy a whole level");
        }
    }

    Ok(())
}
