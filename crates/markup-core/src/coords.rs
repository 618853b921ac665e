//! Coordinate transformation between canvas space and PDF page space
//!
//! Markups are authored on a canvas in normalized coordinates: `(0, 0)` is the
//! top-left corner of the rendered page and `(1, 1)` the bottom-right. PDF page
//! space has its origin at the bottom-left of the MediaBox and is measured in
//! points, so every point mapping flips the Y axis.
//!
//! Scalar lengths (stroke widths, font sizes, icon sizes) are authored in canvas
//! pixels and scale by the horizontal factor only. When the canvas aspect ratio
//! differs from the page's, scalars are anisotropic relative to points.

use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

/// US Letter, used when a page (and none of its ancestors) declares a MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Upper bound on `/Parent` hops while looking for inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// A point in normalized canvas space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point in PDF page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

impl PdfPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in PDF page space, `(x, y)` is the lower-left corner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Page extents read from the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageGeometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            width,
            height,
        }
    }

    /// Read the effective MediaBox of a page, following `/Parent` for inherited values.
    pub fn from_page(doc: &Document, page_id: ObjectId) -> Self {
        let media_box = inherited_attribute(doc, page_id, b"MediaBox")
            .and_then(|obj| read_box(doc, obj))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        let [x1, y1, x2, y2] = media_box;
        Self {
            origin_x: x1.min(x2),
            origin_y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }
}

/// Dimensions of the canvas a markup was drawn against, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    /// Returns `None` unless both dimensions are finite and positive.
    pub fn new(width: f64, height: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(width) && valid(height) {
            Some(Self { width, height })
        } else {
            None
        }
    }
}

/// Maps canvas geometry onto one page.
#[derive(Debug, Clone, Copy)]
pub struct Mapper {
    page: PageGeometry,
    scale_x: f64,
    scale_y: f64,
}

impl Mapper {
    pub fn new(page: PageGeometry, canvas: CanvasSize) -> Self {
        Self {
            page,
            scale_x: page.width / canvas.width,
            scale_y: page.height / canvas.height,
        }
    }

    pub fn page(&self) -> &PageGeometry {
        &self.page
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn map_point(&self, p: Point) -> PdfPoint {
        PdfPoint {
            x: self.page.origin_x + p.x * self.page.width,
            y: self.page.origin_y + (self.page.height - p.y * self.page.height),
        }
    }

    pub fn map_points(&self, points: &[Point]) -> Vec<PdfPoint> {
        points.iter().map(|p| self.map_point(*p)).collect()
    }

    /// Scale a canvas-pixel length (stroke width, font size) into page units.
    pub fn map_scalar(&self, value: f64) -> f64 {
        value * self.scale_x
    }

    /// Map a rectangle given by two arbitrary corners. The result does not
    /// depend on which corner comes first.
    pub fn map_rect(&self, a: Point, b: Point) -> PdfRect {
        let min_x = a.x.min(b.x);
        let max_y = a.y.max(b.y);
        PdfRect {
            x: self.page.origin_x + min_x * self.page.width,
            y: self.page.origin_y + (self.page.height - max_y * self.page.height),
            width: (b.x - a.x).abs() * self.page.width,
            height: (b.y - a.y).abs() * self.page.height,
        }
    }

    /// Inverse of [`Mapper::map_point`].
    pub fn pdf_to_canvas(&self, p: PdfPoint) -> Point {
        Point {
            x: (p.x - self.page.origin_x) / self.page.width,
            y: 1.0 - (p.y - self.page.origin_y) / self.page.height,
        }
    }
}

/// Look up a page attribute on the page or the nearest ancestor that defines it.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Follow a single indirect reference, returning direct objects unchanged.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn number(doc: &Document, obj: &Object) -> Option<f64> {
    match resolve(doc, obj)? {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

/// Read a four-number rectangle array such as `/MediaBox` or `/Rect`.
pub(crate) fn read_box(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let items = resolve(doc, obj)?.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = number(doc, item)?;
    }
    Some(out)
}
