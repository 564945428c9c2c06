//! Log formatting utilities

use std::time::Duration;

use crate::types::ClientId;

/// Format bytes in human-readable form (B, KB, MB, GB)
#[inline]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

    UNITS
        .iter()
        .find(|(size, _)| bytes >= *size)
        .map(|(size, unit)| format!("{:.2} {}", bytes as f64 / *size as f64, unit))
        .unwrap_or_else(|| format!("{} B", bytes))
}

/// First 8 characters of a client's id, enough to follow one session in logs
#[inline]
pub fn short_id(id: &ClientId) -> String {
    let mut s = id.as_uuid().simple().to_string();
    s.truncate(8);
    s
}

/// Format a session length as seconds with millisecond precision
#[inline]
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}
