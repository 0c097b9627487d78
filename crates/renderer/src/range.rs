//! Data domain selection: explicit bounds, presets and the default window

use pulse_config::ChartSettings;
use pulse_shared::{TimeRange, DAY_MS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangePreset {
    #[serde(rename = "7d")]
    Days7,
    #[default]
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "custom")]
    Custom,
}

impl RangePreset {
    pub fn days(&self) -> Option<i64> {
        match self {
            RangePreset::Days7 => Some(7),
            RangePreset::Days30 => Some(30),
            RangePreset::Days90 => Some(90),
            RangePreset::Custom => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "7d" => Some(RangePreset::Days7),
            "30d" => Some(RangePreset::Days30),
            "90d" => Some(RangePreset::Days90),
            "custom" => Some(RangePreset::Custom),
            _ => None,
        }
    }
}

/// `now` rounded down to a multiple of `snap_ms`
pub fn snap_down(now_ms: i64, snap_ms: u64) -> i64 {
    let snap = snap_ms.max(1) as i64;
    now_ms.div_euclid(snap) * snap
}

/// Range inputs; unset bounds fall back to the default window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeSelection {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub preset: RangePreset,
}

impl RangeSelection {
    /// Manual edit of the bounds
    pub fn set_custom(&mut self, from: Option<i64>, to: Option<i64>) {
        self.from = from;
        self.to = to;
        self.preset = RangePreset::Custom;
    }

    /// Presets with a length fill both bounds ending now; `custom` keeps them
    pub fn apply_preset(&mut self, preset: RangePreset, now_ms: i64, snap_ms: u64) {
        self.preset = preset;
        if let Some(days) = preset.days() {
            let range = TimeRange::days_until(snap_down(now_ms, snap_ms), days);
            self.from = Some(range.start);
            self.to = Some(range.end);
        }
    }

    /// Data domain for a refresh at `now_ms`
    pub fn resolve(&self, now_ms: i64, settings: &ChartSettings) -> TimeRange {
        let default_window = TimeRange::days_until(
            snap_down(now_ms, settings.snap_ms),
            i64::from(settings.default_days),
        );
        TimeRange::new(
            self.from.unwrap_or(default_window.start),
            self.to.unwrap_or(default_window.end),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_012_345;

    #[test]
    fn test_snap_down() {
        assert_eq!(snap_down(NOW, 60_000), 1_699_999_980_000);
        assert_eq!(snap_down(NOW, 0), NOW);
    }

    #[test]
    fn test_default_window() {
        let settings = ChartSettings::default();
        let range = RangeSelection::default().resolve(NOW, &settings);
        assert_eq!(range.end, 1_699_999_980_000);
        assert_eq!(range.duration(), 30 * DAY_MS);
    }

    #[test]
    fn test_partial_custom_range() {
        let settings = ChartSettings::default();
        let mut selection = RangeSelection::default();
        selection.set_custom(Some(1_000), None);
        assert_eq!(selection.preset, RangePreset::Custom);

        let range = selection.resolve(NOW, &settings);
        assert_eq!(range.start, 1_000);
        assert_eq!(range.end, 1_699_999_980_000);
    }

    #[test]
    fn test_presets() {
        let mut selection = RangeSelection::default();
        selection.apply_preset(RangePreset::Days7, NOW, 60_000);
        assert_eq!(selection.to, Some(1_699_999_980_000));
        assert_eq!(selection.from, Some(1_699_999_980_000 - 7 * DAY_MS));

        selection.apply_preset(RangePreset::Custom, NOW + DAY_MS, 60_000);
        assert_eq!(selection.to, Some(1_699_999_980_000));
        assert_eq!(RangePreset::parse("90d"), Some(RangePreset::Days90));
        assert_eq!(RangePreset::parse("1y"), None);
    }
}
