use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`. Malformed components read as zero.
    pub fn hex(s: &str) -> Self {
        let s = s.strip_prefix('#').unwrap_or(s);
        let component = |range: std::ops::Range<usize>| {
            s.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .unwrap_or(0)
        };

        Self::rgb(component(0..2), component(2..4), component(4..6))
    }

    /// Linear interpolation between two colors
    pub fn lerp(a: Color, b: Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 * (1.0 - t) + b as f64 * t).round() as u8;

        Color::rgb(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const BLACK: Color = Color::rgb(0, 0, 0);
pub const GRID: Color = Color::rgb(0xdd, 0xdd, 0xdd);

/// Cells with no data
pub const MISSING: Color = Color::rgb(0xf0, 0xf0, 0xf0);

const TABLEAU10: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ab",
];

/// Color for the `index`th series of a line plot
pub fn series_color(index: usize) -> Color {
    Color::hex(TABLEAU10[index % TABLEAU10.len()])
}

/// Continuous color scales for raster maps
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Colormap {
    #[default]
    Viridis,

    /// White to dark blue, for precipitation
    Blues,

    /// Greens through browns, for elevation
    Terrain,
}

const VIRIDIS: &[&str] = &["#440154", "#3b528b", "#21918c", "#5ec962", "#fde725"];
const BLUES: &[&str] = &["#f7fbff", "#c6dbef", "#6baed6", "#2171b5", "#08306b"];
const TERRAIN: &[&str] = &["#1a9850", "#91cf60", "#d9ef8b", "#fee08b", "#a6611a", "#6b3d1a"];

impl Colormap {
    /// A sensible default for data in the given units
    pub fn for_units(units: &str) -> Self {
        if units.starts_with("mm") {
            Colormap::Blues
        } else if units == "m" {
            Colormap::Terrain
        } else {
            Colormap::Viridis
        }
    }

    fn stops(&self) -> &'static [&'static str] {
        match self {
            Colormap::Viridis => VIRIDIS,
            Colormap::Blues => BLUES,
            Colormap::Terrain => TERRAIN,
        }
    }

    /// Color at position `t` along the scale, 0 to 1. NaN maps to `MISSING`.
    pub fn sample(&self, t: f64) -> Color {
        if t.is_nan() {
            return MISSING;
        }
        let stops = self.stops();
        let position = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
        let lower = (position.floor() as usize).min(stops.len() - 2);

        Color::lerp(
            Color::hex(stops[lower]),
            Color::hex(stops[lower + 1]),
            position - lower as f64,
        )
    }
}
