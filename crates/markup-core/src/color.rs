//! Stroke and fill paint
//!
//! The canvas sends colors as hex strings and uses the literal `none` to mean
//! "do not paint this". That sentinel is decoded once, at the edge, into
//! [`Paint::Omitted`] so the compositor never compares against strings.

use tracing::debug;

/// An RGB color with components in the 0-1 range PDF operators expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);
    pub const YELLOW: Rgb = Rgb::new(1.0, 1.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (alpha ignored); the `#` is optional.
    pub fn from_hex(color: &str) -> Option<Self> {
        let hex = color.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            3 => {
                let mut out = [0.0f32; 3];
                for (slot, c) in out.iter_mut().zip(hex.chars()) {
                    let doubled: String = [c, c].iter().collect();
                    *slot = channel(&doubled)?;
                }
                Some(Rgb::new(out[0], out[1], out[2]))
            }
            6 | 8 => Some(Rgb::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => None,
        }
    }
}

/// Whether and how to paint a stroke or fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Color(Rgb),
    Omitted,
}

impl Paint {
    /// Decode a wire color. Absent or unparseable values fall back to `default`;
    /// the literal `none` (any case) always means omitted.
    pub fn from_wire(value: Option<&str>, default: Paint) -> Paint {
        match value {
            None => default,
            Some(v) if v.trim().eq_ignore_ascii_case("none") => Paint::Omitted,
            Some(v) => match Rgb::from_hex(v) {
                Some(rgb) => Paint::Color(rgb),
                None => {
                    debug!("Unparseable color {:?}, using default", v);
                    default
                }
            },
        }
    }

    pub fn rgb(&self) -> Option<Rgb> {
        match self {
            Paint::Color(rgb) => Some(*rgb),
            Paint::Omitted => None,
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, Paint::Omitted)
    }
}
