//! Aggregation bucket sizing
//!
//! The bucket is the smallest "nice" duration that keeps the number of
//! points for the visible range inside a band that depends on the plot width.

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Candidate bucket sizes in milliseconds, ascending
pub const NICE_STEPS_MS: [i64; 13] = [
    SECOND,
    5 * SECOND,
    10 * SECOND,
    30 * SECOND,
    MINUTE,
    5 * MINUTE,
    15 * MINUTE,
    HOUR,
    6 * HOUR,
    12 * HOUR,
    DAY,
    7 * DAY,
    30 * DAY,
];

/// Desired number of points for a plot `width_px` wide (120..=260)
pub fn target_points(width_px: f64) -> i64 {
    ((width_px / 4.0).floor() as i64).clamp(120, 260)
}

/// Smallest nice step at least `range_ms / target_points`
pub fn nice_bucket_ms(range_ms: f64, width_px: f64) -> i64 {
    let ideal = range_ms / target_points(width_px).max(1) as f64;

    NICE_STEPS_MS
        .iter()
        .copied()
        .find(|&step| step as f64 >= ideal)
        .unwrap_or(NICE_STEPS_MS[NICE_STEPS_MS.len() - 1])
}

/// Maximum rows requested for a plot `width_px` wide (160..=500)
pub fn point_limit(width_px: f64) -> i64 {
    ((width_px / 3.0).floor() as i64).clamp(160, 500)
}
