//! Formatting helpers shared by the report views.

use chrono::{DateTime, Utc};

/// Collapse line breaks and whitespace runs so a value renders on one line.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max` characters of `text`.
pub fn take_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Shorten `text` to at most `limit` characters, ending in "..." when cut.
pub fn ellipsize(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    format!("{}...", take_chars(text, limit.saturating_sub(3)))
}

/// Format an integer with comma thousands separators (e.g., "146,897").
pub fn format_thousands(value: impl Into<i128>) -> String {
    let value: i128 = value.into();
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Round a percentage to one decimal place.
pub fn round_percentage(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Format an elapsed interval as `HHhMMmSSs`, or `--h--m--s` when either
/// end is unknown.
pub fn format_elapsed(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => {
            let secs = end.signed_duration_since(start).num_seconds().max(0);
            format!(
                "{:02}h{:02}m{:02}s",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        _ => "--h--m--s".to_string(),
    }
}
