//! Axis, timestamp and duration labels

use chrono::{DateTime, Datelike, FixedOffset, TimeZone};

// Axis label granularity thresholds
const TWO_HOURS_MS: f64 = 2.0 * 3_600_000.0;
const TWO_DAYS_MS: f64 = 2.0 * 86_400_000.0;
const FOUR_MONTHS_MS: f64 = 120.0 * 86_400_000.0;
const THREE_YEARS_MS: f64 = 3.0 * 365.0 * 86_400_000.0;

fn local(tz: &FixedOffset, ms: f64) -> Option<DateTime<FixedOffset>> {
    if !ms.is_finite() {
        return None;
    }
    tz.timestamp_millis_opt(ms.round() as i64).single()
}

/// Label for an x tick at `ms`, coarser as the visible range grows
pub fn axis_label(tz: &FixedOffset, ms: f64, view_min: f64, view_max: f64) -> String {
    let Some(at) = local(tz, ms) else {
        return String::new();
    };
    let range = view_max - view_min;

    let pattern = if range <= TWO_HOURS_MS {
        "%H:%M:%S"
    } else if range <= TWO_DAYS_MS {
        "%d %b %H:%M"
    } else if range <= FOUR_MONTHS_MS {
        let crosses_years = match (local(tz, view_min), local(tz, view_max)) {
            (Some(from), Some(to)) => from.year() != to.year(),
            _ => false,
        };
        if crosses_years {
            "%d %b %Y"
        } else {
            "%d %b"
        }
    } else if range <= THREE_YEARS_MS {
        "%b %Y"
    } else {
        "%Y"
    };

    at.format(pattern).to_string()
}

/// `dd.mm.yy hh:mm:ss`
pub fn full_timestamp(tz: &FixedOffset, ms: f64) -> String {
    local(tz, ms)
        .map(|at| at.format("%d.%m.%y %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Whole seconds as `Xh Ym`, `Ym Zs` or `Zs`
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.floor().max(0.0) as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
