//! Topic name and filter rules
//!
//! - `/` separates levels
//! - `+` matches exactly one level and must occupy the whole level
//! - `#` matches the remaining levels (including none) and must be last
//! - Topic names never contain wildcards
//! - Topics starting with `$` are not matched by a leading wildcard

/// Level separator
pub const LEVEL_SEPARATOR: char = '/';
/// Single-level wildcard
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
/// Multi-level wildcard
pub const MULTI_LEVEL_WILDCARD: &str = "#";

const MAX_TOPIC_LEN: usize = 65535;

/// Validate a topic name (used when publishing)
pub fn validate_topic_name(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err("topic name exceeds maximum length");
    }
    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }
    if topic.contains(['+', '#']) {
        return Err("topic name cannot contain wildcards");
    }
    Ok(())
}

/// Validate a topic name, limiting the number of levels (0 = unlimited)
pub fn validate_topic_name_with_max_levels(
    topic: &str,
    max_topic_levels: usize,
) -> Result<(), &'static str> {
    validate_topic_name(topic)?;
    if exceeds_levels(topic, max_topic_levels) {
        return Err("topic exceeds maximum allowed levels");
    }
    Ok(())
}

/// Validate a topic filter (used when subscribing)
pub fn validate_topic_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty");
    }
    if filter.len() > MAX_TOPIC_LEN {
        return Err("topic filter exceeds maximum length");
    }
    if filter.contains('\0') {
        return Err("topic filter cannot contain null character");
    }

    let mut levels = filter.split(LEVEL_SEPARATOR).peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') {
            if level != MULTI_LEVEL_WILDCARD {
                return Err("multi-level wildcard must occupy entire level");
            }
            if levels.peek().is_some() {
                return Err("multi-level wildcard must be last level");
            }
        }
        if level.contains('+') && level != SINGLE_LEVEL_WILDCARD {
            return Err("single-level wildcard must occupy entire level");
        }
    }
    Ok(())
}

/// Validate a topic filter, limiting the number of levels (0 = unlimited)
pub fn validate_topic_filter_with_max_levels(
    filter: &str,
    max_topic_levels: usize,
) -> Result<(), &'static str> {
    validate_topic_filter(filter)?;
    if exceeds_levels(filter, max_topic_levels) {
        return Err("topic filter exceeds maximum allowed levels");
    }
    Ok(())
}

fn exceeds_levels(topic: &str, max_topic_levels: usize) -> bool {
    max_topic_levels > 0 && topic.split(LEVEL_SEPARATOR).count() > max_topic_levels
}

/// Check if a topic filter matches a topic name
///
/// Walks both strings level by level without collecting them.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split(LEVEL_SEPARATOR);
    let mut filter_levels = filter.split(LEVEL_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
