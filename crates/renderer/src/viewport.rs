//! Visible time window over the loaded data domain
//!
//! All times are epoch milliseconds as `f64`; zooming produces fractional
//! bounds and queries round them when they leave the chart.

/// Where a drag started
#[derive(Debug, Clone, Copy, PartialEq)]
struct DragAnchor {
    x: f64,
    view_min: f64,
    view_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    data_min: f64,
    data_max: f64,
    view_min: f64,
    view_max: f64,
    /// False until the first domain is set and after kind/range changes
    view_valid: bool,
    drag: Option<DragAnchor>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            data_min: 0.0,
            data_max: 0.0,
            view_min: 0.0,
            view_max: 0.0,
            view_valid: false,
            drag: None,
        }
    }

    pub fn data_min(&self) -> f64 {
        self.data_min
    }

    pub fn data_max(&self) -> f64 {
        self.data_max
    }

    pub fn view_min(&self) -> f64 {
        self.view_min
    }

    pub fn view_max(&self) -> f64 {
        self.view_max
    }

    pub fn domain_span(&self) -> f64 {
        (self.data_max - self.data_min).max(0.0)
    }

    pub fn span(&self) -> f64 {
        (self.view_max - self.view_min).max(0.0)
    }

    pub fn contains(&self, ts: f64) -> bool {
        ts >= self.view_min && ts <= self.view_max
    }

    /// Sets the data domain, resetting the view when it is unset or no
    /// longer fits inside the domain
    pub fn set_domain(&mut self, min: f64, max: f64) {
        self.data_min = min;
        self.data_max = max;
        if !self.view_valid || self.view_min < min || self.view_max > max {
            self.reset();
        }
    }

    /// Shows the whole domain
    pub fn reset(&mut self) {
        self.view_min = self.data_min;
        self.view_max = self.data_max;
        self.view_valid = true;
    }

    /// Forgets the view so the next domain update shows everything
    pub fn invalidate(&mut self) {
        self.view_valid = false;
        self.drag = None;
    }

    pub fn can_pan(&self) -> bool {
        self.span() < self.domain_span()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Starts a drag at pixel `x`; refused when the whole domain is visible
    pub fn begin_drag(&mut self, x: f64) -> bool {
        if !self.can_pan() {
            return false;
        }
        self.drag = Some(DragAnchor {
            x,
            view_min: self.view_min,
            view_max: self.view_max,
        });
        true
    }

    /// Translates the view by the drag delta; returns whether it moved
    pub fn drag_to(&mut self, x: f64, width_px: f64) -> bool {
        let Some(anchor) = self.drag else {
            return false;
        };
        if width_px <= 0.0 {
            return false;
        }
        let range = anchor.view_max - anchor.view_min;
        let dt = -((x - anchor.x) / width_px) * range;
        let (min, max) = self.clamp_to_domain(anchor.view_min + dt, anchor.view_max + dt);
        let moved = min != self.view_min || max != self.view_max;
        self.view_min = min;
        self.view_max = max;
        moved
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Rescales the view around `fraction` (0..=1 across the plot) for a
    /// wheel movement of `delta_y`; returns whether the view changed
    pub fn zoom_at(&mut self, fraction: f64, delta_y: f64, sensitivity: f64, min_range: f64) -> bool {
        let max_range = self.domain_span();
        let range = self.span();
        if max_range <= 0.0 || range <= 0.0 || !delta_y.is_finite() {
            return false;
        }

        let fraction = fraction.clamp(0.0, 1.0);
        let zoom = (-delta_y * sensitivity).exp();
        let new_range = (range / zoom).min(max_range).max(min_range.min(max_range));

        let anchor = self.view_min + fraction * range;
        let (min, max) = self.clamp_to_domain(
            anchor - fraction * new_range,
            anchor + (1.0 - fraction) * new_range,
        );
        let changed = min != self.view_min || max != self.view_max;
        self.view_min = min;
        self.view_max = max;
        changed
    }

    /// Shifts `[min, max]` back inside the domain, keeping its width
    fn clamp_to_domain(&self, mut min: f64, mut max: f64) -> (f64, f64) {
        if max - min >= self.domain_span() {
            return (self.data_min, self.data_max);
        }
        if min < self.data_min {
            max += self.data_min - min;
            min = self.data_min;
        }
        if max > self.data_max {
            min -= max - self.data_max;
            max = self.data_max;
        }
        (min.max(self.data_min), max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 86_400_000.0;

    fn ninety_days() -> Viewport {
        let mut viewport = Viewport::new();
        viewport.set_domain(0.0, 90.0 * DAY);
        viewport
    }

    #[test]
    fn test_first_domain_shows_everything() {
        let viewport = ninety_days();
        assert_eq!(viewport.view_min(), 0.0);
        assert_eq!(viewport.view_max(), 90.0 * DAY);
        assert!(!viewport.can_pan());
    }

    #[test]
    fn test_view_kept_while_inside_new_domain() {
        let mut viewport = ninety_days();
        viewport.zoom_at(0.5, -600.0, 0.0012, 10_000.0);
        let (min, max) = (viewport.view_min(), viewport.view_max());

        viewport.set_domain(-DAY, 91.0 * DAY);
        assert_eq!((viewport.view_min(), viewport.view_max()), (min, max));

        viewport.set_domain(min + 1.0, 90.0 * DAY);
        assert_eq!(viewport.view_min(), min + 1.0);
        assert_eq!(viewport.view_max(), 90.0 * DAY);

        viewport.invalidate();
        viewport.set_domain(0.0, 10.0 * DAY);
        assert_eq!(viewport.span(), 10.0 * DAY);
    }

    #[test]
    fn test_zoom_keeps_cursor_time_fixed() {
        let mut viewport = ninety_days();
        let fraction = 0.25;
        let anchor = viewport.view_min() + fraction * viewport.span();

        assert!(viewport.zoom_at(fraction, -500.0, 0.0012, 10_000.0));

        let expected = 90.0 * DAY / (500.0f64 * 0.0012).exp();
        assert!((viewport.span() - expected).abs() < 1.0);
        let anchor_after = viewport.view_min() + fraction * viewport.span();
        assert!((anchor_after - anchor).abs() < 1.0);
    }

    #[test]
    fn test_zoom_limits() {
        let mut viewport = ninety_days();
        viewport.zoom_at(0.5, -100_000.0, 0.0012, 10_000.0);
        assert!((viewport.span() - 10_000.0).abs() < 1e-6);

        viewport.zoom_at(0.9, 100_000.0, 0.0012, 10_000.0);
        assert_eq!(viewport.view_min(), 0.0);
        assert_eq!(viewport.view_max(), 90.0 * DAY);

        // Zooming out at full extent changes nothing
        assert!(!viewport.zoom_at(0.5, 500.0, 0.0012, 10_000.0));
    }

    #[test]
    fn test_zoom_on_domain_narrower_than_minimum() {
        let mut viewport = Viewport::new();
        viewport.set_domain(0.0, 4_000.0);
        viewport.zoom_at(0.5, -1_000.0, 0.0012, 10_000.0);
        assert_eq!(viewport.view_min(), 0.0);
        assert_eq!(viewport.view_max(), 4_000.0);
    }

    #[test]
    fn test_drag_translates_and_clamps() {
        let mut viewport = ninety_days();
        assert!(!viewport.begin_drag(100.0));

        viewport.zoom_at(0.5, -1_000.0, 0.0012, 10_000.0);
        let span = viewport.span();
        let start_min = viewport.view_min();
        assert!(viewport.begin_drag(400.0));

        // Dragging right by a tenth of the width moves back in time
        viewport.drag_to(480.0, 800.0);
        assert!((viewport.view_min() - (start_min - span / 10.0)).abs() < 1e-3);
        assert!((viewport.span() - span).abs() < 1e-3);

        viewport.drag_to(400.0 + 100_000.0, 800.0);
        assert_eq!(viewport.view_min(), 0.0);
        assert!((viewport.span() - span).abs() < 1e-3);

        viewport.drag_to(400.0 - 100_000.0, 800.0);
        assert_eq!(viewport.view_max(), 90.0 * DAY);

        viewport.end_drag();
        assert!(!viewport.drag_to(0.0, 800.0));
    }
}
