//! Markup model
//!
//! [`MarkupRecord`] is the loose shape the browser sends. It is converted into
//! a [`Markup`] whose [`MarkupKind`] carries exactly the geometry each kind
//! needs, so the compositor can match exhaustively. Records that cannot become
//! a drawable markup yield a [`SkipReason`] instead of an error: one bad markup
//! never fails a save.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::{Paint, Rgb};
use crate::coords::Point;
use crate::text_layout::{StandardFont, TextAlign};

const DEFAULT_STROKE_WIDTH: f64 = 2.0;
const DEFAULT_HIGHLIGHTER_WIDTH: f64 = 12.0;
const DEFAULT_HIGHLIGHTER_OPACITY: f64 = 0.4;
const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_NOTE_FONT_SIZE: f64 = 12.0;
const DEFAULT_ARROW_HEAD_SIZE: f64 = 15.0;

/// A markup as sent by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub start_x: Option<f64>,
    #[serde(default)]
    pub start_y: Option<f64>,
    #[serde(default)]
    pub end_x: Option<f64>,
    #[serde(default)]
    pub end_y: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub stroke_width: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_align: Option<String>,
    #[serde(default)]
    pub arrow_head_size: Option<f64>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub border_color: Option<String>,
}

impl MarkupRecord {
    /// Decode one entry of a request's markup list.
    ///
    /// A missing `type` or a non-numeric coordinate only rejects this entry.
    pub fn from_value(value: &serde_json::Value) -> Result<MarkupRecord, SkipReason> {
        MarkupRecord::deserialize(value).map_err(|e| SkipReason::Malformed(e.to_string()))
    }

    fn start(&self) -> Option<Point> {
        Some(Point::new(self.start_x?, self.start_y?))
    }

    fn end(&self) -> Option<Point> {
        Some(Point::new(self.end_x?, self.end_y?))
    }

    fn corners(&self) -> Option<(Point, Point)> {
        if let (Some(start), Some(end)) = (self.start(), self.end()) {
            return Some((start, end));
        }
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) if self.points.len() >= 2 => Some((*a, *b)),
            _ => None,
        }
    }

    fn path(&self) -> Vec<Point> {
        if self.points.len() < 2 {
            if let Some((start, end)) = self.start().zip(self.end()) {
                return vec![start, end];
            }
        }
        self.points.clone()
    }

    fn endpoints(&self) -> Option<(Point, Point)> {
        let path = self.path();
        match (path.first(), path.last()) {
            (Some(a), Some(b)) if path.len() >= 2 => Some((*a, *b)),
            _ => None,
        }
    }

    fn anchor(&self) -> Option<Point> {
        self.start().or_else(|| self.points.first().copied())
    }

    fn text_content(&self, default_size: f64) -> TextContent {
        TextContent {
            text: self.text.clone().unwrap_or_default(),
            font_size: positive(self.font_size).unwrap_or(default_size),
            align: TextAlign::parse(self.text_align.as_deref()),
            font: StandardFont::select(self.font_family.as_deref(), self.bold, self.italic),
        }
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Why a markup was not drawn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("unknown markup type '{0}'")]
    UnknownType(String),

    #[error("page {page} is outside the document ({page_count} pages)")]
    PageOutOfRange { page: i64, page_count: usize },

    #[error("{kind} needs at least {needed} points, got {got}")]
    InsufficientGeometry {
        kind: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("{0} has no stroke, fill or text to paint")]
    NothingToPaint(&'static str),

    #[error("malformed markup: {0}")]
    Malformed(String),
}

/// Text attributes shared by text boxes, notes and callouts.
#[derive(Debug, Clone, PartialEq)]
pub struct TextContent {
    pub text: String,
    /// Canvas pixels; scaled by the mapper.
    pub font_size: f64,
    pub align: TextAlign,
    pub font: StandardFont,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupKind {
    Ink {
        points: Vec<Point>,
    },
    Highlighter {
        points: Vec<Point>,
    },
    Rectangle {
        start: Point,
        end: Point,
    },
    Ellipse {
        start: Point,
        end: Point,
    },
    Arrow {
        start: Point,
        end: Point,
        /// Canvas pixels; scaled by the mapper.
        head_size: f64,
    },
    Line {
        start: Point,
        end: Point,
    },
    Polyline {
        points: Vec<Point>,
    },
    Polygon {
        points: Vec<Point>,
    },
    /// Drawn as a plain rectangle; the scalloped outline is not rendered.
    Cloud {
        start: Point,
        end: Point,
    },
    TextBox {
        start: Point,
        end: Point,
        content: TextContent,
        background: Paint,
        border: Paint,
    },
    StickyNote {
        anchor: Point,
        content: TextContent,
    },
    /// Drawn as a rectangle with optional text inside; no leader line.
    Callout {
        start: Point,
        end: Point,
        content: TextContent,
    },
}

impl MarkupKind {
    pub fn name(&self) -> &'static str {
        match self {
            MarkupKind::Ink { .. } => "ink",
            MarkupKind::Highlighter { .. } => "highlighter",
            MarkupKind::Rectangle { .. } => "rectangle",
            MarkupKind::Ellipse { .. } => "ellipse",
            MarkupKind::Arrow { .. } => "arrow",
            MarkupKind::Line { .. } => "line",
            MarkupKind::Polyline { .. } => "polyline",
            MarkupKind::Polygon { .. } => "polygon",
            MarkupKind::Cloud { .. } => "cloud",
            MarkupKind::TextBox { .. } => "text box",
            MarkupKind::StickyNote { .. } => "sticky note",
            MarkupKind::Callout { .. } => "callout",
        }
    }
}

/// Stroke and fill shared by every kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub stroke: Paint,
    pub fill: Paint,
    /// Canvas pixels; scaled by the mapper.
    pub stroke_width: f64,
    pub opacity: f64,
}

/// A markup ready to composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Markup {
    /// Zero-based page index.
    pub page: usize,
    pub kind: MarkupKind,
    pub style: Style,
}

impl Markup {
    /// Convert a wire record. Page bounds are checked later against the
    /// loaded document; here only a missing or negative page is rejected.
    pub fn from_record(record: &MarkupRecord) -> Result<Markup, SkipReason> {
        let tag = record.kind.trim().to_ascii_lowercase();
        let is_highlighter = matches!(tag.as_str(), "highlighter" | "highlight");

        let page = match record.page {
            Some(p) if p >= 0 => p as usize,
            other => {
                return Err(SkipReason::PageOutOfRange {
                    page: other.unwrap_or(-1),
                    page_count: 0,
                })
            }
        };

        let needs = |kind: &'static str, needed: usize, got: usize| SkipReason::InsufficientGeometry {
            kind,
            needed,
            got,
        };
        let corners = |kind: &'static str| {
            record
                .corners()
                .ok_or_else(|| needs(kind, 2, record.points.len()))
        };
        let path = |kind: &'static str, needed: usize| {
            let points = record.path();
            if points.len() < needed {
                Err(needs(kind, needed, points.len()))
            } else {
                Ok(points)
            }
        };
        let endpoints = |kind: &'static str| {
            record
                .endpoints()
                .ok_or_else(|| needs(kind, 2, record.path().len()))
        };

        let kind = match tag.as_str() {
            "pen" | "ink" | "freehand" | "draw" => MarkupKind::Ink {
                points: path("ink", 2)?,
            },
            "highlighter" | "highlight" => MarkupKind::Highlighter {
                points: path("highlighter", 2)?,
            },
            "rectangle" | "rect" | "square" => {
                let (start, end) = corners("rectangle")?;
                MarkupKind::Rectangle { start, end }
            }
            "ellipse" | "circle" => {
                let (start, end) = corners("ellipse")?;
                MarkupKind::Ellipse { start, end }
            }
            "arrow" => {
                let (start, end) = endpoints("arrow")?;
                MarkupKind::Arrow {
                    start,
                    end,
                    head_size: positive(record.arrow_head_size).unwrap_or(DEFAULT_ARROW_HEAD_SIZE),
                }
            }
            "line" | "straight-line" | "straight_line" => {
                let (start, end) = endpoints("line")?;
                MarkupKind::Line { start, end }
            }
            "polyline" => MarkupKind::Polyline {
                points: path("polyline", 2)?,
            },
            "polygon" => MarkupKind::Polygon {
                points: path("polygon", 3)?,
            },
            "cloud" => {
                let (start, end) = corners("cloud")?;
                MarkupKind::Cloud { start, end }
            }
            "text" | "textbox" | "text-box" | "freetext" => {
                let (start, end) = corners("text box")?;
                MarkupKind::TextBox {
                    start,
                    end,
                    content: record.text_content(DEFAULT_FONT_SIZE),
                    background: Paint::from_wire(
                        record.background_color.as_deref(),
                        Paint::from_wire(record.fill_color.as_deref(), Paint::Omitted),
                    ),
                    border: Paint::from_wire(record.border_color.as_deref(), Paint::Omitted),
                }
            }
            "note" | "sticky" | "sticky-note" | "comment" => MarkupKind::StickyNote {
                anchor: record.anchor().ok_or_else(|| needs("sticky note", 1, 0))?,
                content: record.text_content(DEFAULT_NOTE_FONT_SIZE),
            },
            "callout" => {
                let (start, end) = corners("callout")?;
                MarkupKind::Callout {
                    start,
                    end,
                    content: record.text_content(DEFAULT_FONT_SIZE),
                }
            }
            _ => return Err(SkipReason::UnknownType(record.kind.clone())),
        };

        let default_stroke = if is_highlighter {
            Paint::Color(Rgb::YELLOW)
        } else {
            Paint::Color(Rgb::BLACK)
        };
        let default_width = if is_highlighter {
            DEFAULT_HIGHLIGHTER_WIDTH
        } else {
            DEFAULT_STROKE_WIDTH
        };
        let default_opacity = if is_highlighter {
            DEFAULT_HIGHLIGHTER_OPACITY
        } else {
            1.0
        };

        let style = Style {
            stroke: Paint::from_wire(record.color.as_deref(), default_stroke),
            fill: Paint::from_wire(record.fill_color.as_deref(), Paint::Omitted),
            stroke_width: record
                .stroke_width
                .filter(|w| w.is_finite() && *w >= 0.0)
                .unwrap_or(default_width),
            opacity: record
                .opacity
                .filter(|o| o.is_finite())
                .map(|o| o.clamp(0.0, 1.0))
                .unwrap_or(default_opacity),
        };

        Ok(Markup { page, kind, style })
    }
}
