//! Interactive profile activity chart
//!
//! [`ProfileChart`] owns the chart state and a [`Surface`] and reacts to host
//! input (pointer, wheel, range and kind controls). Renders and fetches run on
//! delayed tasks keyed by purpose: scheduling a purpose again re-arms its
//! timer, so bursts of input collapse into one render or one fetch.
//!
//! Every refresh takes a new sequence number and only the response carrying
//! the latest number is applied.

use crate::bucket::{nice_bucket_ms, point_limit};
use crate::hit_test::nearest_point;
use crate::kind::ChartKind;
use crate::layout::{is_drawable, y_max_for, PlotLayout, MIN_VISIBLE_PX};
use crate::range::{RangePreset, RangeSelection};
use crate::render::{draw_chart, Frame};
use crate::series::{normalize_rows, SeriesPoint};
use crate::source::{SeriesQuery, SeriesSource};
use crate::surface::Surface;
use crate::theme::Theme;
use crate::tooltip::{place_tooltip, Tooltip, TooltipContent, DEFAULT_TOOLTIP_SIZE};
use crate::viewport::Viewport;
use chrono::{FixedOffset, Local};
use parking_lot::Mutex;
use pulse_config::{ChartSettings, PulseConfig};
use pulse_shared::{Clock, PulseError, PulseResult};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Width used for bucket sizing before the surface has been laid out
const FALLBACK_WIDTH_PX: f64 = 600.0;

/// Presentation options for a chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub settings: ChartSettings,
    pub theme: Theme,
    /// Offset used for axis and tooltip times
    pub utc_offset: FixedOffset,
    /// Tooltip box size used for placement
    pub tooltip_size: (f64, f64),
}

impl ChartOptions {
    pub fn new(settings: ChartSettings) -> Self {
        Self {
            settings,
            theme: Theme::default(),
            utc_offset: *Local::now().offset(),
            tooltip_size: DEFAULT_TOOLTIP_SIZE,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self::new(ChartSettings::default())
    }
}

impl From<&PulseConfig> for ChartOptions {
    fn from(config: &PulseConfig) -> Self {
        Self::new(config.chart)
    }
}

/// Counters for fetches and frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartStats {
    pub fetches: u64,
    pub applied: u64,
    pub discarded: u64,
    pub failed: u64,
    pub frames: u64,
}

/// Read-only view of the chart state
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot {
    pub kind: ChartKind,
    pub range: RangeSelection,
    pub domain: (f64, f64),
    pub view: (f64, f64),
    /// Bucket of the loaded (or loading) series
    pub bucket_ms: Option<i64>,
    pub series: Vec<SeriesPoint>,
    pub hover: Option<usize>,
    pub tooltip: Option<Tooltip>,
    pub summary: String,
    pub dragging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerPurpose {
    Render,
    Refresh,
    RefetchCheck,
    TooltipHide,
}

/// Armed delayed tasks, at most one per purpose
#[derive(Default)]
struct Timers {
    armed: HashMap<TimerPurpose, (u64, JoinHandle<()>)>,
    next_id: u64,
}

impl Timers {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn arm(&mut self, purpose: TimerPurpose, id: u64, handle: JoinHandle<()>) {
        if let Some((_, previous)) = self.armed.insert(purpose, (id, handle)) {
            previous.abort();
        }
    }

    /// Called by a firing timer; false when it was superseded
    fn disarm(&mut self, purpose: TimerPurpose, id: u64) -> bool {
        match self.armed.get(&purpose) {
            Some((armed_id, _)) if *armed_id == id => {
                self.armed.remove(&purpose);
                true
            }
            _ => false,
        }
    }

    fn cancel(&mut self, purpose: TimerPurpose) {
        if let Some((_, handle)) = self.armed.remove(&purpose) {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}

struct ChartState<S> {
    surface: S,
    kind: ChartKind,
    range: RangeSelection,
    viewport: Viewport,
    series: Vec<SeriesPoint>,
    bucket_ms: Option<i64>,
    y_max: f64,
    /// Index into the visible points
    hover: Option<usize>,
    tooltip: Option<Tooltip>,
    pointer_on_tooltip: bool,
    summary: String,
    sequence: u64,
    stats: ChartStats,
    timers: Timers,
}

impl<S: Surface> ChartState<S> {
    fn visible(&self) -> Vec<SeriesPoint> {
        self.series
            .iter()
            .filter(|p| self.viewport.contains(p.ts))
            .cloned()
            .collect()
    }

    fn layout(&self) -> PlotLayout {
        let (width, height) = self.surface.size();
        PlotLayout::new(width, height, &self.viewport, self.y_max)
    }
}

struct ChartShared<S> {
    state: Mutex<ChartState<S>>,
    source: Arc<dyn SeriesSource>,
    clock: Arc<dyn Clock>,
    options: ChartOptions,
    runtime: Handle,
}

impl<S: Surface + Send + 'static> ChartShared<S> {
    fn settings(&self) -> &ChartSettings {
        &self.options.settings
    }

    /// Re-arms the `purpose` timer to fire after `delay_ms`
    fn schedule(self: &Arc<Self>, state: &mut ChartState<S>, purpose: TimerPurpose, delay_ms: u64) {
        let id = state.timers.next_id();
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(shared) = weak.upgrade() {
                shared.fire(purpose, id).await;
            }
        });
        state.timers.arm(purpose, id, handle);
    }

    async fn fire(self: Arc<Self>, purpose: TimerPurpose, id: u64) {
        {
            let mut state = self.state.lock();
            if !state.timers.disarm(purpose, id) {
                return;
            }
            match purpose {
                TimerPurpose::Render => {
                    self.render(&mut state);
                    return;
                }
                TimerPurpose::RefetchCheck => {
                    self.refetch_if_bucket_changed(&mut state);
                    return;
                }
                TimerPurpose::TooltipHide => {
                    if !state.pointer_on_tooltip {
                        state.tooltip = None;
                    }
                    return;
                }
                TimerPurpose::Refresh => {}
            }
        }
        self.refresh().await;
    }

    async fn refresh(self: &Arc<Self>) {
        let (sequence, kind, query) = {
            let mut state = self.state.lock();
            state.sequence += 1;
            let sequence = state.sequence;

            let domain = state.range.resolve(self.clock.now_ms(), self.settings());
            if domain.end <= domain.start {
                log::warn!(
                    "Ignoring empty chart range {}..{}",
                    domain.start,
                    domain.end
                );
                state.series.clear();
                state.bucket_ms = None;
                self.render(&mut state);
                return;
            }
            state.viewport.set_domain(domain.start as f64, domain.end as f64);

            let (width, _) = state.surface.size();
            let width = if width > 0.0 {
                width.max(MIN_VISIBLE_PX)
            } else {
                FALLBACK_WIDTH_PX
            };
            let bucket_ms = nice_bucket_ms(state.viewport.span(), width);
            state.bucket_ms = Some(bucket_ms);
            state.stats.fetches += 1;

            let query = SeriesQuery {
                from: state.viewport.view_min().round() as i64,
                to: state.viewport.view_max().round() as i64,
                bucket_ms,
                limit: point_limit(width),
            };
            (sequence, state.kind, query)
        };

        log::debug!(
            "Fetching {} #{}: {}..{} every {}ms",
            kind,
            sequence,
            query.from,
            query.to,
            query.bucket_ms
        );
        let result = self.source.fetch_series(kind.request_kind(), &query).await;

        let mut state = self.state.lock();
        if sequence != state.sequence {
            log::debug!("Discarding superseded {} response #{}", kind, sequence);
            state.stats.discarded += 1;
            return;
        }
        match result {
            Ok(rows) => {
                state.series = normalize_rows(&rows);
                state.stats.applied += 1;
            }
            Err(e) => {
                log::warn!("Failed to load {} series: {}", kind, e);
                state.series.clear();
                state.stats.failed += 1;
            }
        }
        self.render(&mut state);
    }

    fn refetch_if_bucket_changed(self: &Arc<Self>, state: &mut ChartState<S>) {
        let (width, _) = state.surface.size();
        if width < MIN_VISIBLE_PX {
            return;
        }
        let desired = nice_bucket_ms(state.viewport.span(), width);
        if state.bucket_ms != Some(desired) {
            log::debug!(
                "Bucket changes from {:?} to {}ms, refetching",
                state.bucket_ms,
                desired
            );
            self.schedule(state, TimerPurpose::Refresh, 0);
        }
    }

    /// Recomputes scale and summary, then redraws; drops the hover
    fn render(&self, state: &mut ChartState<S>) {
        let visible = state.visible();
        state.y_max = y_max_for(&visible);
        state.summary = state.kind.summary(&state.series);
        state.hover = None;
        if !state.pointer_on_tooltip {
            state.tooltip = None;
        }
        self.draw(state, &visible);
    }

    fn draw(&self, state: &mut ChartState<S>, visible: &[SeriesPoint]) {
        let (width, height) = state.surface.size();
        if !is_drawable(width, height) {
            return;
        }
        let layout = state.layout();
        let frame = Frame {
            layout,
            kind: state.kind,
            visible,
            hover: state.hover,
            theme: &self.options.theme,
            tz: &self.options.utc_offset,
            dpr: state.surface.device_pixel_ratio(),
        };
        draw_chart(&mut state.surface, &frame);
        state.stats.frames += 1;
    }

    fn viewport_changed(self: &Arc<Self>, state: &mut ChartState<S>) {
        let settings = *self.settings();
        self.schedule(state, TimerPurpose::Render, settings.render_debounce_ms);
        self.schedule(state, TimerPurpose::RefetchCheck, settings.refetch_debounce_ms);
    }

    fn hover_at(self: &Arc<Self>, state: &mut ChartState<S>, x: f64, y: f64) {
        let (width, height) = state.surface.size();
        if !is_drawable(width, height) || state.pointer_on_tooltip {
            return;
        }
        let settings = *self.settings();
        let visible = state.visible();
        let previous = state.hover;

        let nearest = if visible.is_empty() {
            None
        } else {
            nearest_point(&state.layout(), &visible, x, y, settings.hover_radius_px)
        };

        match nearest {
            Some(index) => {
                state.hover = Some(index);
                state.tooltip = Some(Tooltip {
                    content: TooltipContent::for_point(
                        state.kind,
                        &visible[index],
                        &self.options.utc_offset,
                    ),
                    placement: place_tooltip((width, height), (x, y), self.options.tooltip_size),
                });
                state.timers.cancel(TimerPurpose::TooltipHide);
            }
            None => {
                state.hover = None;
                let delay = if visible.is_empty() {
                    settings.tooltip_hide_from_canvas_ms
                } else {
                    settings.tooltip_hide_ms
                };
                self.schedule(state, TimerPurpose::TooltipHide, delay);
            }
        }

        if state.hover != previous {
            self.draw(state, &visible);
        }
    }
}

/// Interactive chart over a [`SeriesSource`]
///
/// Must be created inside a tokio runtime; its timers run on that runtime.
pub struct ProfileChart<S: Surface + Send + 'static> {
    shared: Arc<ChartShared<S>>,
}

impl<S: Surface + Send + 'static> ProfileChart<S> {
    pub fn new(
        surface: S,
        source: Arc<dyn SeriesSource>,
        clock: Arc<dyn Clock>,
        options: ChartOptions,
    ) -> PulseResult<Self> {
        let runtime = Handle::try_current().map_err(|e| PulseError::Internal {
            message: format!("profile chart needs a tokio runtime: {}", e),
        })?;
        let state = ChartState {
            surface,
            kind: ChartKind::default(),
            range: RangeSelection::default(),
            viewport: Viewport::new(),
            series: Vec::new(),
            bucket_ms: None,
            y_max: 1.0,
            hover: None,
            tooltip: None,
            pointer_on_tooltip: false,
            summary: ChartKind::default().summary(&[]),
            sequence: 0,
            stats: ChartStats::default(),
            timers: Timers::default(),
        };

        Ok(Self {
            shared: Arc::new(ChartShared {
                state: Mutex::new(state),
                source,
                clock,
                options,
                runtime,
            }),
        })
    }

    /// Loads the initial series
    pub fn start(&self) {
        self.refresh();
    }

    pub fn refresh(&self) {
        let mut state = self.shared.state.lock();
        self.shared.schedule(&mut state, TimerPurpose::Refresh, 0);
    }

    pub fn set_kind(&self, kind: ChartKind) {
        let mut state = self.shared.state.lock();
        state.kind = kind;
        state.viewport.invalidate();
        state.hover = None;
        state.tooltip = None;
        self.shared.schedule(&mut state, TimerPurpose::Refresh, 0);
    }

    /// Manual edit of the range bounds
    pub fn set_range(&self, from: Option<i64>, to: Option<i64>) {
        let mut state = self.shared.state.lock();
        state.range.set_custom(from, to);
        state.viewport.invalidate();
        let delay = self.shared.settings().refresh_debounce_ms;
        self.shared.schedule(&mut state, TimerPurpose::Refresh, delay);
    }

    pub fn apply_preset(&self, preset: RangePreset) {
        let now = self.shared.clock.now_ms();
        let snap_ms = self.shared.settings().snap_ms;
        let mut state = self.shared.state.lock();
        state.range.apply_preset(preset, now, snap_ms);
        state.viewport.invalidate();
        self.shared.schedule(&mut state, TimerPurpose::Refresh, 0);
    }

    /// Host resized the surface
    pub fn resize(&self, width: f64, height: f64) {
        let mut state = self.shared.state.lock();
        state.surface.resize(width, height);
        self.shared.render(&mut state);
        let delay = self.shared.settings().refetch_debounce_ms;
        self.shared.schedule(&mut state, TimerPurpose::RefetchCheck, delay);
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        let mut state = self.shared.state.lock();
        if state.viewport.is_dragging() {
            let (width, _) = state.surface.size();
            if state.viewport.drag_to(x, width) {
                self.shared.viewport_changed(&mut state);
            }
            return;
        }
        self.shared.hover_at(&mut state, x, y);
    }

    /// Starts panning; refused while the whole domain is visible
    pub fn pointer_down(&self, x: f64) -> bool {
        self.shared.state.lock().viewport.begin_drag(x)
    }

    pub fn pointer_up(&self) {
        self.shared.state.lock().viewport.end_drag();
    }

    pub fn pointer_leave(&self) {
        let mut state = self.shared.state.lock();
        let had_hover = state.hover.take().is_some();
        if !state.pointer_on_tooltip {
            let delay = self.shared.settings().tooltip_hide_from_canvas_ms;
            self.shared.schedule(&mut state, TimerPurpose::TooltipHide, delay);
        }
        if had_hover {
            let visible = state.visible();
            self.shared.draw(&mut state, &visible);
        }
    }

    pub fn tooltip_enter(&self) {
        let mut state = self.shared.state.lock();
        state.pointer_on_tooltip = true;
        state.timers.cancel(TimerPurpose::TooltipHide);
    }

    pub fn tooltip_leave(&self) {
        let mut state = self.shared.state.lock();
        state.pointer_on_tooltip = false;
        let delay = self.shared.settings().tooltip_hide_from_tip_ms;
        self.shared.schedule(&mut state, TimerPurpose::TooltipHide, delay);
    }

    /// Zooms around pixel `x`; returns whether the view changed
    pub fn wheel(&self, x: f64, delta_y: f64) -> bool {
        let settings = *self.shared.settings();
        let mut state = self.shared.state.lock();
        let (width, height) = state.surface.size();
        if !is_drawable(width, height) {
            return false;
        }
        let changed = state.viewport.zoom_at(
            x / width,
            delta_y,
            settings.wheel_sensitivity,
            settings.min_range_ms as f64,
        );
        if changed {
            self.shared.viewport_changed(&mut state);
        }
        changed
    }

    /// Link of the hovered message sample, when it is a single message
    pub fn click(&self) -> Option<String> {
        let state = self.shared.state.lock();
        if !state.kind.counts_messages() {
            return None;
        }
        let point = state.visible().into_iter().nth(state.hover?)?;
        if point.y.round() != 1.0 {
            return None;
        }
        point
            .sample_url
            .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        let state = self.shared.state.lock();
        ChartSnapshot {
            kind: state.kind,
            range: state.range,
            domain: (state.viewport.data_min(), state.viewport.data_max()),
            view: (state.viewport.view_min(), state.viewport.view_max()),
            bucket_ms: state.bucket_ms,
            series: state.series.clone(),
            hover: state.hover,
            tooltip: state.tooltip.clone(),
            summary: state.summary.clone(),
            dragging: state.viewport.is_dragging(),
        }
    }

    pub fn stats(&self) -> ChartStats {
        self.shared.state.lock().stats
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.shared.state.lock().surface)
    }
}
