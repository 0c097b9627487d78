//! Full-frame chart drawing

use crate::format::axis_label;
use crate::kind::ChartKind;
use crate::layout::{x_tick_count, PlotLayout};
use crate::series::SeriesPoint;
use crate::surface::{Surface, TextAlign, TextBaseline, TextStyle};
use crate::theme::Theme;
use chrono::FixedOffset;

const GRID_LINES: usize = 4;
const TICK_LENGTH: f64 = 6.0;
const MARKER_RADIUS: f64 = 4.0;
const HOVER_RADIUS: f64 = 6.0;

pub const NO_DATA_TEXT: &str = "No data for selected range";

/// Everything needed to draw one frame
pub struct Frame<'a> {
    pub layout: PlotLayout,
    pub kind: ChartKind,
    /// Points inside the view, in time order
    pub visible: &'a [SeriesPoint],
    pub hover: Option<usize>,
    pub theme: &'a Theme,
    pub tz: &'a FixedOffset,
    pub dpr: f64,
}

/// Clears `surface` and draws the frame
pub fn draw_chart<S: Surface + ?Sized>(surface: &mut S, frame: &Frame<'_>) {
    let layout = &frame.layout;
    let theme = frame.theme;

    surface.begin_frame(layout.width, layout.height, frame.dpr);
    surface.fill_rect(0.0, 0.0, layout.width, layout.height, theme.background.opaque());
    surface.stroke_rect(0.5, 0.5, layout.width - 1.0, layout.height - 1.0, theme.border.opaque());

    draw_grid(surface, frame);
    draw_time_axis(surface, frame);

    if frame.visible.is_empty() {
        surface.text(
            NO_DATA_TEXT,
            (layout.width / 2.0, layout.height / 2.0),
            TextStyle {
                size_px: 14.0,
                align: TextAlign::Center,
                baseline: TextBaseline::Middle,
                color: theme.secondary.opaque(),
            },
        );
        return;
    }

    let points: Vec<(f64, f64)> = frame.visible.iter().map(|p| layout.project(p)).collect();
    surface.polyline(&points, 2.0, theme.primary.with_alpha(0.9));

    for (index, &center) in points.iter().enumerate() {
        let radius = if frame.hover == Some(index) {
            HOVER_RADIUS
        } else {
            MARKER_RADIUS
        };
        surface.circle(center, radius, theme.primary.opaque());
    }
}

fn draw_grid<S: Surface + ?Sized>(surface: &mut S, frame: &Frame<'_>) {
    let layout = &frame.layout;
    let label = TextStyle {
        size_px: 12.0,
        align: TextAlign::Right,
        baseline: TextBaseline::Middle,
        color: frame.theme.secondary.opaque(),
    };

    for i in 0..=GRID_LINES {
        let t = i as f64 / GRID_LINES as f64;
        let y = layout.top + layout.plot_height * t;
        let alpha = if i == GRID_LINES { 0.7 } else { 0.35 };
        surface.line(
            (layout.left, y),
            (layout.right(), y),
            1.0,
            frame.theme.secondary.with_alpha(alpha),
        );

        let value = layout.y_max * (1.0 - t);
        surface.text(&frame.kind.axis_value(value), (layout.left - 10.0, y), label);
    }
}

fn draw_time_axis<S: Surface + ?Sized>(surface: &mut S, frame: &Frame<'_>) {
    let layout = &frame.layout;
    let range = layout.view_max - layout.view_min;
    if range <= 0.0 {
        return;
    }

    let ticks = x_tick_count(range);
    let bottom = layout.bottom();
    let color = frame.theme.secondary.opaque();

    for i in 0..=ticks {
        let t = i as f64 / ticks as f64;
        let x = layout.left + layout.plot_width * t;
        surface.line((x, bottom), (x, bottom + TICK_LENGTH), 1.0, color);

        let (align, label_x) = if i == 0 {
            (TextAlign::Left, x + 2.0)
        } else if i == ticks {
            (TextAlign::Right, x - 2.0)
        } else {
            (TextAlign::Center, x)
        };
        let ms = layout.view_min + range * t;
        surface.text(
            &axis_label(frame.tz, ms, layout.view_min, layout.view_max),
            (label_x, bottom + 10.0),
            TextStyle {
                size_px: 12.0,
                align,
                baseline: TextBaseline::Top,
                color,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::y_max_for;
    use crate::surface::{DrawCommand, DrawList};
    use crate::viewport::Viewport;

    const HOUR: f64 = 3_600_000.0;
    const T: f64 = 1_700_000_000_000.0;

    fn draw(points: &[SeriesPoint], hover: Option<usize>) -> DrawList {
        let mut viewport = Viewport::new();
        viewport.set_domain(T, T + 10.0 * HOUR);
        let layout = PlotLayout::new(888.0, 458.0, &viewport, y_max_for(points));
        let theme = Theme::default();
        let tz = FixedOffset::east_opt(0).unwrap();
        let mut list = DrawList::new(888.0, 458.0);
        draw_chart(
            &mut list,
            &Frame {
                layout,
                kind: ChartKind::Messages,
                visible: points,
                hover,
                theme: &theme,
                tz: &tz,
                dpr: 2.0,
            },
        );
        list
    }

    #[test]
    fn test_empty_frame_shows_placeholder() {
        let list = draw(&[], None);
        assert!(list.contains_text(NO_DATA_TEXT));
        assert!(list.marker_radii().is_empty());
        assert!(matches!(list.commands()[0], DrawCommand::Clear { dpr, .. } if dpr == 2.0));
    }

    #[test]
    fn test_series_and_hover_marker() {
        let points = vec![
            SeriesPoint::new(T + HOUR, 2.0),
            SeriesPoint::new(T + 2.0 * HOUR, 8.0),
            SeriesPoint::new(T + 3.0 * HOUR, 4.0),
        ];
        let list = draw(&points, Some(1));
        assert!(!list.contains_text(NO_DATA_TEXT));
        assert_eq!(list.marker_radii(), vec![4.0, 6.0, 4.0]);

        // y axis tops out at 8 * 1.15
        assert!(list.contains_text("9"));
        assert!(list.contains_text("0"));
    }

    #[test]
    fn test_axis_ticks_and_labels() {
        let list = draw(&[], None);
        let ticks = list
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { from, to, .. } if to.1 - from.1 == TICK_LENGTH))
            .count();
        assert_eq!(ticks, 5);
        assert!(list.contains_text("14 Nov 22:13"));
    }
}
