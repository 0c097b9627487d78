//! Profile activity chart for the Pulse client
//!
//! This crate turns series rows from the request coordinator into an
//! interactive time chart: it sizes aggregation buckets for the visible range,
//! pans and zooms a viewport, hit-tests the pointer and draws full frames on a
//! [`Surface`].

pub mod bucket;
pub mod chart;
pub mod format;
pub mod kind;
pub mod layout;
pub mod range;
pub mod render;
pub mod series;
pub mod source;
pub mod surface;
pub mod theme;
pub mod tooltip;
pub mod viewport;

pub use bucket::{nice_bucket_ms, point_limit, NICE_STEPS_MS};
pub use chart::{ChartOptions, ChartSnapshot, ChartStats, ProfileChart};
pub use kind::ChartKind;
pub use range::{RangePreset, RangeSelection};
pub use series::{normalize_rows, BucketSpan, SeriesPoint};
pub use source::{SeriesQuery, SeriesSource};
pub use surface::{DrawCommand, DrawList, Surface};
pub use theme::{Color, Rgb, Theme};
pub use tooltip::{Preview, Tooltip, TooltipContent, TooltipPlacement};
pub use viewport::Viewport;
