//! Timezone labels attached to schedules.
//!
//! Only `UTC` and fixed offsets are understood (`+08:00`, `UTC+8`, `UTC-05:30`,
//! `GMT+2`). Anything else falls back to UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// Label used when a schedule carries none.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Parse a timezone label into a fixed offset.
pub fn parse_offset(label: &str) -> Option<FixedOffset> {
    let label = label.trim();
    let upper = label.to_ascii_uppercase();
    if upper.is_empty() || upper == "UTC" || upper == "GMT" || upper == "Z" {
        return Some(Utc.fix());
    }

    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    let (sign, body) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };

    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if body.len() == 4 => (body[..2].parse().ok()?, body[2..].parse().ok()?),
        None => (body.parse::<i32>().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Resolve a label, warning and falling back to UTC when it is not understood.
pub fn resolve_offset(label: &str) -> FixedOffset {
    match parse_offset(label) {
        Some(offset) => offset,
        None => {
            tracing::warn!("🌐 Unknown timezone '{}', falling back to UTC", label);
            Utc.fix()
        }
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp. RFC 3339 strings keep their own offset; naive
/// timestamps are read as wall-clock time in `offset`.
pub fn parse_datetime(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    })
}
