//! Chart palette

use serde::{Deserialize, Serialize};

/// Opaque RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn with_alpha(self, alpha: f64) -> Color {
        Color {
            r: self.0,
            g: self.1,
            b: self.2,
            a: alpha.clamp(0.0, 1.0),
        }
    }

    pub fn opaque(self) -> Color {
        self.with_alpha(1.0)
    }
}

/// RGB colour with alpha in 0..=1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub fn to_css(&self) -> String {
        format!("rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: Rgb,
    pub border: Rgb,
    /// Series line and markers
    pub primary: Rgb,
    /// Labels, ticks and grid
    pub secondary: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgb(35, 39, 42),
            border: Rgb(43, 49, 55),
            primary: Rgb(128, 224, 245),
            secondary: Rgb(173, 176, 179),
        }
    }
}
