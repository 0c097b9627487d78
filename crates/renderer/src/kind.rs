//! Series kinds shown by the profile chart

use crate::format::format_duration;
use crate::series::{total, SeriesPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Messages,
    /// Voice time in seconds
    Voice,
    /// Activity time in seconds
    Activities,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Messages, ChartKind::Voice, ChartKind::Activities];

    /// Backend request kind that produces this series
    pub fn request_kind(&self) -> &'static str {
        match self {
            ChartKind::Messages => "messages_series",
            ChartKind::Voice => "voice_series",
            ChartKind::Activities => "activities_series",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Messages => "messages",
            ChartKind::Voice => "voice",
            ChartKind::Activities => "activities",
        }
    }

    /// Host selector value; unknown values fall back to messages
    pub fn from_selector(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "voice" => ChartKind::Voice,
            "activities" | "activity" => ChartKind::Activities,
            _ => ChartKind::Messages,
        }
    }

    pub fn counts_messages(&self) -> bool {
        matches!(self, ChartKind::Messages)
    }

    /// Y axis label for `value`
    pub fn axis_value(&self, value: f64) -> String {
        if self.counts_messages() {
            format!("{}", value.round())
        } else {
            format_duration(value)
        }
    }

    /// Tooltip value line
    pub fn value_line(&self, value: f64) -> String {
        if self.counts_messages() {
            format!("Messages: {}", value.round())
        } else {
            format!("Time: {}", format_duration(value))
        }
    }

    /// "For period: …" line over the whole loaded series
    pub fn summary(&self, points: &[SeriesPoint]) -> String {
        let sum = total(points);
        if self.counts_messages() {
            format!("For period: {} messages", sum.round())
        } else {
            format!("For period: {}", format_duration(sum))
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
