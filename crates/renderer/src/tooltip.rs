//! Tooltip content and placement for the hovered point

use crate::format::full_timestamp;
use crate::kind::ChartKind;
use crate::series::SeriesPoint;
use chrono::FixedOffset;
use serde::Serialize;

const MARGIN: f64 = 12.0;
const OFFSET: f64 = 14.0;
const MIN_MAX_HEIGHT: f64 = 140.0;

/// Size assumed before the host has measured the tooltip
pub const DEFAULT_TOOLTIP_SIZE: (f64, f64) = (260.0, 140.0);

/// Kind-specific detail under the value line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Preview {
    Message {
        guild: String,
        channel: String,
        text: String,
        /// Link hint shown when the sample has a URL
        link: Option<String>,
    },
    Voice {
        guild: String,
        channel: String,
    },
    Activity {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipContent {
    pub time_line: String,
    pub value_line: String,
    pub preview: Preview,
}

impl TooltipContent {
    pub fn for_point(kind: ChartKind, point: &SeriesPoint, tz: &FixedOffset) -> Self {
        let time_line = match point.bucket {
            Some(bucket) => format!(
                "{} — {}",
                full_timestamp(tz, bucket.start),
                full_timestamp(tz, bucket.end)
            ),
            None => full_timestamp(tz, point.ts),
        };

        Self {
            time_line,
            value_line: kind.value_line(point.y),
            preview: preview_for(kind, point),
        }
    }

    /// Plain-text rendering, one line per entry
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.time_line.clone(), self.value_line.clone()];
        match &self.preview {
            Preview::Message {
                guild,
                channel,
                text,
                link,
            } => {
                lines.push(format!("{guild} · #{channel}"));
                lines.push(text.clone());
                if link.is_some() {
                    lines.push("Open in Discord".to_string());
                }
            }
            Preview::Voice { guild, channel } => lines.push(format!("{guild} · {channel}")),
            Preview::Activity { name } => lines.push(name.clone()),
        }
        lines
    }
}

fn meta_or(point: &SeriesPoint, keys: &[&str], fallback: &str) -> String {
    keys.iter()
        .find_map(|key| point.meta_text(key))
        .unwrap_or_else(|| fallback.to_string())
}

fn preview_for(kind: ChartKind, point: &SeriesPoint) -> Preview {
    match kind {
        ChartKind::Messages => Preview::Message {
            guild: meta_or(point, &["guild_name"], "Server"),
            channel: meta_or(point, &["channel_name"], "channel"),
            text: point
                .sample_content
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or("(no preview)")
                .to_string(),
            link: point.sample_url.clone(),
        },
        ChartKind::Voice => Preview::Voice {
            guild: meta_or(point, &["guild_id", "guild"], "Server"),
            channel: meta_or(point, &["channel_id", "channel"], "Voice"),
        },
        ChartKind::Activities => Preview::Activity {
            name: meta_or(point, &["name", "activity"], "Activity"),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TooltipPlacement {
    pub left: f64,
    pub top: f64,
    pub max_height: f64,
}

/// Places a `tip` sized box next to `anchor`, inside a `host` sized area
///
/// The box goes below-right of the anchor and flips to the other side when
/// it would cross the margin.
pub fn place_tooltip(host: (f64, f64), anchor: (f64, f64), tip: (f64, f64)) -> TooltipPlacement {
    let (host_w, host_h) = host;
    let (x, y) = anchor;
    let max_height = (host_h - 2.0 * MARGIN).max(MIN_MAX_HEIGHT);
    let tip_w = if tip.0 > 0.0 { tip.0 } else { DEFAULT_TOOLTIP_SIZE.0 };
    let tip_h = if tip.1 > 0.0 { tip.1 } else { DEFAULT_TOOLTIP_SIZE.1 }.min(max_height);

    let mut left = x + OFFSET;
    if left + tip_w > host_w - MARGIN {
        left = x - OFFSET - tip_w;
    }
    let mut top = y + OFFSET;
    if top + tip_h > host_h - MARGIN {
        top = y - OFFSET - tip_h;
    }

    let left = left.min(host_w - MARGIN - tip_w).max(MARGIN);
    let top = top.min(host_h - MARGIN - tip_h).max(MARGIN);

    TooltipPlacement {
        left,
        top,
        max_height,
    }
}

/// Visible tooltip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub content: TooltipContent,
    pub placement: TooltipPlacement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::BucketSpan;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_message_content() {
        let mut point = SeriesPoint::new(1_700_000_000_000.0, 1.0);
        point.bucket = Some(BucketSpan {
            start: 1_700_000_000_000.0,
            end: 1_700_000_060_000.0,
        });
        point.sample_content = Some("  hi there ".to_string());
        point.sample_url = Some("https://discord.com/channels/1/2/3".to_string());
        point.meta = Some(json!({"guild_name": "Pulse"}));

        let content = TooltipContent::for_point(ChartKind::Messages, &point, &utc());
        assert_eq!(content.time_line, "14.11.23 22:13:20 — 14.11.23 22:14:20");
        assert_eq!(content.value_line, "Messages: 1");
        assert_eq!(
            content.preview,
            Preview::Message {
                guild: "Pulse".to_string(),
                channel: "channel".to_string(),
                text: "hi there".to_string(),
                link: Some("https://discord.com/channels/1/2/3".to_string()),
            }
        );
        assert_eq!(content.lines().last().map(String::as_str), Some("Open in Discord"));
    }

    #[test]
    fn test_preview_defaults() {
        let point = SeriesPoint::new(1_700_000_000_000.0, 90.0);
        let message = TooltipContent::for_point(ChartKind::Messages, &point, &utc());
        assert!(matches!(message.preview, Preview::Message { ref text, .. } if text == "(no preview)"));
        assert_eq!(message.time_line, "14.11.23 22:13:20");

        let voice = TooltipContent::for_point(ChartKind::Voice, &point, &utc());
        assert_eq!(voice.value_line, "Time: 1m 30s");
        assert_eq!(
            voice.preview,
            Preview::Voice {
                guild: "Server".to_string(),
                channel: "Voice".to_string()
            }
        );

        let mut named = point.clone();
        named.meta = Some(json!({"activity": "Chess"}));
        let activity = TooltipContent::for_point(ChartKind::Activities, &named, &utc());
        assert_eq!(activity.preview, Preview::Activity { name: "Chess".to_string() });
    }

    #[test]
    fn test_placement_below_right() {
        let placement = place_tooltip((800.0, 400.0), (100.0, 100.0), (260.0, 140.0));
        assert_eq!(placement.left, 114.0);
        assert_eq!(placement.top, 114.0);
        assert_eq!(placement.max_height, 376.0);
    }

    #[test]
    fn test_placement_flips_near_edges() {
        let placement = place_tooltip((800.0, 400.0), (700.0, 350.0), (260.0, 140.0));
        assert_eq!(placement.left, 700.0 - 14.0 - 260.0);
        assert_eq!(placement.top, 350.0 - 14.0 - 140.0);
    }

    #[test]
    fn test_placement_clamped_in_small_host() {
        let placement = place_tooltip((200.0, 100.0), (10.0, 10.0), (0.0, 0.0));
        assert_eq!(placement.left, 12.0);
        assert_eq!(placement.top, 12.0);
        assert_eq!(placement.max_height, 140.0);
    }
}
