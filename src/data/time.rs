//! Relative timestamps for feed cards

use chrono::{DateTime, Utc};

/// Render `created_at` relative to `now`
///
/// Anything older than a week falls back to the calendar date
/// ("March 4"). Timestamps in the future read as "just now".
pub fn format_time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }

    let days = hours / 24;
    if days < 7 {
        return plural(days, "day");
    }

    created_at.format("%B %-d").to_string()
}

fn plural(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("{value} {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}
