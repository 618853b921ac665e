//! Standard-14 font selection, metrics and text box layout
//!
//! Text markups are drawn with the PDF standard fonts so nothing has to be
//! embedded. Widths come from the Adobe AFM tables and are expressed in
//! 1/1000 of the font size.

use std::collections::HashMap;

use crate::coords::PdfRect;

/// Line advance as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

/// Families with their own width table; style variants borrow the closest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MetricsFamily {
    Helvetica,
    HelveticaBold,
    Times,
    Courier,
}

impl StandardFont {
    /// Pick a standard font from a CSS-ish family name and style flags.
    ///
    /// Handles generic families ("serif", "monospace") as well as concrete
    /// names ("Arial", "Times New Roman", "Consolas"). Unknown names land on
    /// Helvetica.
    pub fn select(family: Option<&str>, bold: bool, italic: bool) -> Self {
        let lower = family.map(|f| f.to_lowercase()).unwrap_or_default();
        let bold = bold || lower.contains("bold");
        let italic = italic || lower.contains("italic") || lower.contains("oblique");

        let is_times = matches!(lower.as_str(), "serif")
            || lower.contains("times")
            || lower.contains("georgia")
            || lower.contains("garamond");
        let is_courier = matches!(lower.as_str(), "monospace")
            || lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco");

        if is_times {
            match (bold, italic) {
                (true, true) => StandardFont::TimesBoldItalic,
                (true, false) => StandardFont::TimesBold,
                (false, true) => StandardFont::TimesItalic,
                (false, false) => StandardFont::TimesRoman,
            }
        } else if is_courier {
            match (bold, italic) {
                (true, true) => StandardFont::CourierBoldOblique,
                (true, false) => StandardFont::CourierBold,
                (false, true) => StandardFont::CourierOblique,
                (false, false) => StandardFont::Courier,
            }
        } else {
            match (bold, italic) {
                (true, true) => StandardFont::HelveticaBoldOblique,
                (true, false) => StandardFont::HelveticaBold,
                (false, true) => StandardFont::HelveticaOblique,
                (false, false) => StandardFont::Helvetica,
            }
        }
    }

    /// The `/BaseFont` name.
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Name under which the font is registered in page `/Resources`.
    pub fn resource_name(&self) -> String {
        format!("Mk{}", self.base_font().replace('-', ""))
    }

    fn metrics_family(&self) -> MetricsFamily {
        match self {
            StandardFont::Helvetica | StandardFont::HelveticaOblique => MetricsFamily::Helvetica,
            StandardFont::HelveticaBold | StandardFont::HelveticaBoldOblique => {
                MetricsFamily::HelveticaBold
            }
            StandardFont::TimesRoman
            | StandardFont::TimesBold
            | StandardFont::TimesItalic
            | StandardFont::TimesBoldItalic => MetricsFamily::Times,
            StandardFont::Courier
            | StandardFont::CourierBold
            | StandardFont::CourierOblique
            | StandardFont::CourierBoldOblique => MetricsFamily::Courier,
        }
    }

    /// Advance width of `text` at `font_size`, in page units.
    pub fn measure(&self, text: &str, font_size: f64) -> f64 {
        let metrics = &FONT_METRICS[&self.metrics_family()];
        let units: u32 = text
            .chars()
            .map(|c| metrics.char_width(displayed_char(c)) as u32)
            .sum();
        units as f64 * font_size / 1000.0
    }
}

struct FontMetrics {
    widths: HashMap<char, u16>,
    default_width: u16,
}

impl FontMetrics {
    fn new(default_width: u16, widths: &[(char, u16)]) -> Self {
        Self {
            widths: widths.iter().copied().collect(),
            default_width,
        }
    }

    fn char_width(&self, ch: char) -> u16 {
        self.widths.get(&ch).copied().unwrap_or(self.default_width)
    }
}

lazy_static::lazy_static! {
    static ref FONT_METRICS: HashMap<MetricsFamily, FontMetrics> = {
        let mut metrics = HashMap::new();

        metrics.insert(MetricsFamily::Helvetica, FontMetrics::new(556, &[
            (' ', 278), ('!', 278), ('"', 355), ('#', 556), ('$', 556), ('%', 889),
            ('&', 667), ('\'', 191), ('(', 333), (')', 333), ('*', 389), ('+', 584),
            (',', 278), ('-', 333), ('.', 278), ('/', 278), ('0', 556), ('1', 556),
            ('2', 556), ('3', 556), ('4', 556), ('5', 556), ('6', 556), ('7', 556),
            ('8', 556), ('9', 556), (':', 278), (';', 278), ('<', 584), ('=', 584),
            ('>', 584), ('?', 556), ('@', 1015), ('A', 667), ('B', 667), ('C', 722),
            ('D', 722), ('E', 667), ('F', 611), ('G', 778), ('H', 722), ('I', 278),
            ('J', 500), ('K', 667), ('L', 556), ('M', 833), ('N', 722), ('O', 778),
            ('P', 667), ('Q', 778), ('R', 722), ('S', 667), ('T', 611), ('U', 722),
            ('V', 667), ('W', 944), ('X', 667), ('Y', 667), ('Z', 611), ('[', 278),
            ('\\', 278), (']', 278), ('^', 469), ('_', 556), ('`', 333), ('a', 556),
            ('b', 556), ('c', 500), ('d', 556), ('e', 556), ('f', 278), ('g', 556),
            ('h', 556), ('i', 222), ('j', 222), ('k', 500), ('l', 222), ('m', 833),
            ('n', 556), ('o', 556), ('p', 556), ('q', 556), ('r', 333), ('s', 500),
            ('t', 278), ('u', 556), ('v', 500), ('w', 722), ('x', 500), ('y', 500),
            ('z', 500), ('{', 334), ('|', 260), ('}', 334), ('~', 584),
        ]));

        metrics.insert(MetricsFamily::HelveticaBold, FontMetrics::new(611, &[
            (' ', 278), ('!', 333), ('"', 474), ('#', 556), ('$', 556), ('%', 889),
            ('&', 722), ('\'', 238), ('(', 333), (')', 333), ('*', 389), ('+', 584),
            (',', 278), ('-', 333), ('.', 278), ('/', 278), ('0', 556), ('1', 556),
            ('2', 556), ('3', 556), ('4', 556), ('5', 556), ('6', 556), ('7', 556),
            ('8', 556), ('9', 556), (':', 333), (';', 333), ('<', 584), ('=', 584),
            ('>', 584), ('?', 611), ('@', 975), ('A', 722), ('B', 722), ('C', 722),
            ('D', 722), ('E', 667), ('F', 611), ('G', 778), ('H', 722), ('I', 278),
            ('J', 556), ('K', 722), ('L', 611), ('M', 833), ('N', 722), ('O', 778),
            ('P', 667), ('Q', 778), ('R', 722), ('S', 667), ('T', 611), ('U', 722),
            ('V', 667), ('W', 944), ('X', 667), ('Y', 667), ('Z', 611), ('[', 333),
            ('\\', 278), (']', 333), ('^', 584), ('_', 556), ('`', 333), ('a', 556),
            ('b', 611), ('c', 556), ('d', 611), ('e', 556), ('f', 333), ('g', 611),
            ('h', 611), ('i', 278), ('j', 278), ('k', 556), ('l', 278), ('m', 889),
            ('n', 611), ('o', 611), ('p', 611), ('q', 611), ('r', 389), ('s', 556),
            ('t', 333), ('u', 611), ('v', 556), ('w', 778), ('x', 556), ('y', 556),
            ('z', 500), ('{', 389), ('|', 280), ('}', 389), ('~', 584),
        ]));

        metrics.insert(MetricsFamily::Times, FontMetrics::new(500, &[
            (' ', 250), ('!', 333), ('"', 408), ('#', 500), ('$', 500), ('%', 833),
            ('&', 778), ('\'', 180), ('(', 333), (')', 333), ('*', 500), ('+', 564),
            (',', 250), ('-', 333), ('.', 250), ('/', 278), ('0', 500), ('1', 500),
            ('2', 500), ('3', 500), ('4', 500), ('5', 500), ('6', 500), ('7', 500),
            ('8', 500), ('9', 500), (':', 278), (';', 278), ('<', 564), ('=', 564),
            ('>', 564), ('?', 444), ('@', 921), ('A', 722), ('B', 667), ('C', 667),
            ('D', 722), ('E', 611), ('F', 556), ('G', 722), ('H', 722), ('I', 333),
            ('J', 389), ('K', 722), ('L', 611), ('M', 889), ('N', 722), ('O', 722),
            ('P', 556), ('Q', 722), ('R', 667), ('S', 556), ('T', 611), ('U', 722),
            ('V', 722), ('W', 944), ('X', 722), ('Y', 722), ('Z', 611), ('[', 333),
            ('\\', 278), (']', 333), ('^', 469), ('_', 500), ('`', 333), ('a', 444),
            ('b', 500), ('c', 444), ('d', 500), ('e', 444), ('f', 333), ('g', 500),
            ('h', 500), ('i', 278), ('j', 278), ('k', 500), ('l', 278), ('m', 778),
            ('n', 500), ('o', 500), ('p', 500), ('q', 500), ('r', 333), ('s', 389),
            ('t', 278), ('u', 500), ('v', 500), ('w', 722), ('x', 500), ('y', 500),
            ('z', 444), ('{', 480), ('|', 200), ('}', 480), ('~', 541),
        ]));

        // Monospaced: every glyph is 600
        metrics.insert(MetricsFamily::Courier, FontMetrics::new(600, &[]));

        metrics
    };
}

/// WinAnsi code for a character, if the standard fonts can show it.
fn win_ansi_code(c: char) -> Option<u8> {
    match c {
        ' '..='~' => Some(c as u8),
        '\u{A0}'..='\u{FF}' => Some(c as u32 as u8),
        '€' => Some(0x80),
        '‚' => Some(0x82),
        '„' => Some(0x84),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '™' => Some(0x99),
        _ => None,
    }
}

/// The glyph that will actually be shown for `c`.
fn displayed_char(c: char) -> char {
    if win_ansi_code(c).is_some() {
        c
    } else {
        '?'
    }
}

/// Encode text for a `Tj` operand under `/WinAnsiEncoding`.
/// Characters outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| win_ansi_code(c).unwrap_or(b'?'))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("center") | Some("centre") | Some("middle") => TextAlign::Center,
            Some("right") | Some("end") => TextAlign::Right,
            _ => TextAlign::Left,
        }
    }
}

/// One wrapped line and its measured width.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedLine {
    pub text: String,
    pub width: f64,
}

/// Greedy word wrap.
///
/// Words accumulate while the measured line stays within `max_width`; the
/// word that overflows starts the next line. `\n` always breaks. A single word
/// wider than `max_width` is kept whole on its own line.
pub fn wrap_text(text: &str, font: StandardFont, font_size: f64, max_width: f64) -> Vec<WrappedLine> {
    let mut lines = Vec::new();
    let commit = |lines: &mut Vec<WrappedLine>, line: String| {
        let width = font.measure(&line, font_size);
        lines.push(WrappedLine { text: line, width });
    };

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if font.measure(&candidate, font_size) <= max_width {
                current = candidate;
            } else {
                commit(&mut lines, std::mem::replace(&mut current, word.to_string()));
            }
        }
        commit(&mut lines, current);
    }

    lines
}

/// A line positioned on the page, `(x, y)` is the start of its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// Wrap and position text inside a box.
///
/// The first baseline sits at `top - padding - font_size` and each following
/// line is `font_size * 1.2` lower. Lines whose baseline would fall below the
/// bottom of the box are dropped.
pub fn layout_text_box(
    text: &str,
    font: StandardFont,
    font_size: f64,
    rect: &PdfRect,
    padding: f64,
    align: TextAlign,
) -> Vec<PlacedLine> {
    let max_width = rect.width - 2.0 * padding;
    let first_baseline = rect.top() - padding - font_size;
    let advance = font_size * LINE_HEIGHT_FACTOR;

    let mut placed = Vec::new();
    for (i, line) in wrap_text(text, font, font_size, max_width).into_iter().enumerate() {
        let y = first_baseline - i as f64 * advance;
        if y < rect.y {
            break;
        }
        if line.text.is_empty() {
            continue;
        }
        let x = match align {
            TextAlign::Left => rect.x + padding,
            TextAlign::Center => rect.x + (rect.width - line.width) / 2.0,
            TextAlign::Right => rect.right() - padding - line.width,
        };
        placed.push(PlacedLine { text: line.text, x, y });
    }
    placed
}

/// Cut text to `max_chars` characters, appending `...` when something was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
