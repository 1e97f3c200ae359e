use chrono::{DateTime, Local};

pub const DEFAULT_LABEL: &str = "recording";

/// Make a user label safe to use as a file name prefix.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{label}_{YYYYMMDD_HHMMSS}_seg{NNN}.{ext}`, stamped with the session start.
pub fn segment_file_name(
    label: &str,
    session_start: DateTime<Local>,
    number: u32,
    extension: &str,
) -> String {
    format!(
        "{}_{}_seg{:03}.{}",
        label,
        session_start.format("%Y%m%d_%H%M%S"),
        number,
        extension
    )
}
