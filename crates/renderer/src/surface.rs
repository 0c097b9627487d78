//! Immediate-mode drawing surface
//!
//! The chart clears and redraws everything on each frame through the
//! [`Surface`] trait. [`DrawList`] is the headless implementation: it records
//! the commands of the last frame and can serialise them to SVG.

use crate::theme::Color;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextBaseline {
    Top,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextStyle {
    pub size_px: f64,
    pub align: TextAlign,
    pub baseline: TextBaseline,
    pub color: Color,
}

/// Drawing target in CSS pixels
pub trait Surface {
    /// Current size in CSS pixels
    fn size(&self) -> (f64, f64);

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    /// Host changed the size in CSS pixels
    fn resize(&mut self, width: f64, height: f64);

    /// Clears the surface and resets the transform for a new frame
    fn begin_frame(&mut self, width: f64, height: f64, dpr: f64);

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color);

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color);

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Color);

    fn polyline(&mut self, points: &[(f64, f64)], width: f64, color: Color);

    fn circle(&mut self, center: (f64, f64), radius: f64, color: Color);

    fn text(&mut self, text: &str, at: (f64, f64), style: TextStyle);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrawCommand {
    Clear {
        width: f64,
        height: f64,
        dpr: f64,
    },
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    StrokeRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    Line {
        from: (f64, f64),
        to: (f64, f64),
        width: f64,
        color: Color,
    },
    Polyline {
        points: Vec<(f64, f64)>,
        width: f64,
        color: Color,
    },
    Circle {
        center: (f64, f64),
        radius: f64,
        color: Color,
    },
    Text {
        text: String,
        at: (f64, f64),
        style: TextStyle,
    },
}

/// Surface that records the last frame
#[derive(Debug, Clone)]
pub struct DrawList {
    width: f64,
    height: f64,
    dpr: f64,
    commands: Vec<DrawCommand>,
    frames: u64,
}

impl DrawList {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            dpr: 1.0,
            commands: Vec::new(),
            frames: 0,
        }
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f64) -> Self {
        self.dpr = dpr;
        self
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of frames begun since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|command| match command {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|text| text == needle)
    }

    /// Radii of the point markers in drawing order
    pub fn marker_radii(&self) -> Vec<f64> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Circle { radius, .. } => Some(*radius),
                _ => None,
            })
            .collect()
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        for command in &self.commands {
            let _ = match command {
                DrawCommand::Clear { .. } => Ok(()),
                DrawCommand::FillRect {
                    x,
                    y,
                    width,
                    height,
                    color,
                } => write!(
                    svg,
                    r#"<rect x="{x}" y="{y}" width="{width}" height="{height}" fill="{}"/>"#,
                    color.to_css()
                ),
                DrawCommand::StrokeRect {
                    x,
                    y,
                    width,
                    height,
                    color,
                } => write!(
                    svg,
                    r#"<rect x="{x}" y="{y}" width="{width}" height="{height}" fill="none" stroke="{}"/>"#,
                    color.to_css()
                ),
                DrawCommand::Line {
                    from,
                    to,
                    width,
                    color,
                } => write!(
                    svg,
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke-width="{width}" stroke="{}"/>"#,
                    from.0,
                    from.1,
                    to.0,
                    to.1,
                    color.to_css()
                ),
                DrawCommand::Polyline {
                    points,
                    width,
                    color,
                } => {
                    let coords = points
                        .iter()
                        .map(|(x, y)| format!("{x},{y}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    write!(
                        svg,
                        r#"<polyline points="{coords}" fill="none" stroke-width="{width}" stroke="{}"/>"#,
                        color.to_css()
                    )
                }
                DrawCommand::Circle {
                    center,
                    radius,
                    color,
                } => write!(
                    svg,
                    r#"<circle cx="{}" cy="{}" r="{radius}" fill="{}"/>"#,
                    center.0,
                    center.1,
                    color.to_css()
                ),
                DrawCommand::Text { text, at, style } => {
                    let anchor = match style.align {
                        TextAlign::Left => "start",
                        TextAlign::Center => "middle",
                        TextAlign::Right => "end",
                    };
                    let baseline = match style.baseline {
                        TextBaseline::Top => "hanging",
                        TextBaseline::Middle => "middle",
                    };
                    write!(
                        svg,
                        r#"<text x="{}" y="{}" font-size="{}" font-family="system-ui" text-anchor="{anchor}" dominant-baseline="{baseline}" fill="{}">{}</text>"#,
                        at.0,
                        at.1,
                        style.size_px,
                        style.color.to_css(),
                        escape_xml(text)
                    )
                }
            };
        }
        svg.push_str("</svg>");
        svg
    }
}

impl Surface for DrawList {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn begin_frame(&mut self, width: f64, height: f64, dpr: f64) {
        self.commands.clear();
        self.frames += 1;
        self.commands.push(DrawCommand::Clear { width, height, dpr });
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.commands.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Color) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            width,
            color,
        });
    }

    fn polyline(&mut self, points: &[(f64, f64)], width: f64, color: Color) {
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            width,
            color,
        });
    }

    fn circle(&mut self, center: (f64, f64), radius: f64, color: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            color,
        });
    }

    fn text(&mut self, text: &str, at: (f64, f64), style: TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            at,
            style,
        });
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
