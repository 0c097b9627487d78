//! Plot geometry: padding, scales and tick counts

use crate::series::SeriesPoint;
use crate::viewport::Viewport;

const PAD_LEFT: f64 = 70.0;
const PAD_RIGHT: f64 = 18.0;
const PAD_TOP: f64 = 16.0;
const PAD_BOTTOM: f64 = 42.0;

/// Headroom above the tallest visible point
const Y_HEADROOM: f64 = 1.15;

/// Below this size in either direction nothing is drawn
pub const MIN_VISIBLE_PX: f64 = 10.0;

const DAY_MS: f64 = 86_400_000.0;

pub fn is_drawable(width: f64, height: f64) -> bool {
    width >= MIN_VISIBLE_PX && height >= MIN_VISIBLE_PX
}

/// Top of the y scale for the visible points
pub fn y_max_for(visible: &[SeriesPoint]) -> f64 {
    visible.iter().map(|p| p.y).fold(1.0, f64::max) * Y_HEADROOM
}

/// Number of x ticks for a visible range
pub fn x_tick_count(range_ms: f64) -> usize {
    if range_ms > 3.0 * 365.0 * DAY_MS {
        6
    } else if range_ms > 120.0 * DAY_MS {
        5
    } else {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotLayout {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    pub view_min: f64,
    pub view_max: f64,
    pub y_max: f64,
}

impl PlotLayout {
    pub fn new(width: f64, height: f64, viewport: &Viewport, y_max: f64) -> Self {
        Self {
            width,
            height,
            left: PAD_LEFT,
            top: PAD_TOP,
            plot_width: (width - PAD_LEFT - PAD_RIGHT).max(1.0),
            plot_height: (height - PAD_TOP - PAD_BOTTOM).max(1.0),
            view_min: viewport.view_min(),
            view_max: viewport.view_max(),
            y_max: if y_max > 0.0 { y_max } else { 1.0 },
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.plot_height
    }

    pub fn right(&self) -> f64 {
        self.left + self.plot_width
    }

    pub fn x_of(&self, ts: f64) -> f64 {
        let span = self.view_max - self.view_min;
        if span <= 0.0 {
            return self.left;
        }
        self.left + (ts - self.view_min) / span * self.plot_width
    }

    pub fn y_of(&self, value: f64) -> f64 {
        self.top + self.plot_height - (value / self.y_max) * self.plot_height
    }

    /// Position of `point` in surface pixels
    pub fn project(&self, point: &SeriesPoint) -> (f64, f64) {
        (self.x_of(point.ts), self.y_of(point.y))
    }
}
