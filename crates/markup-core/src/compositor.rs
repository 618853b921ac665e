//! Shape compositor
//!
//! Turns mapped markups into content-stream operations for one page. Each
//! markup is emitted as its own `q ... Q` group so colors, widths and opacity
//! never bleed into the next one, and groups are emitted in input order so
//! later markups paint over earlier ones.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use tracing::debug;

use crate::color::{Paint, Rgb};
use crate::coords::{Mapper, PdfPoint, PdfRect, Point};
use crate::markup::{Markup, MarkupKind, SkipReason, Style, TextContent};
use crate::text_layout::{encode_win_ansi, layout_text_box, truncate_with_ellipsis, StandardFont};

/// Shaft stops this fraction of the head length short of the tip.
const ARROW_SHAFT_INSET: f64 = 0.7;
/// Half-angle between the shaft and each arrowhead wing.
const ARROW_WING_ANGLE: f64 = PI / 7.0;
/// Control point distance for a quarter-ellipse cubic Bezier.
const KAPPA: f64 = 0.552_284_749_831;
/// Text box inner padding, canvas pixels.
const TEXT_PADDING: f64 = 4.0;
/// Sticky note icon edge, canvas pixels.
const NOTE_ICON_SIZE: f64 = 20.0;
/// Gap between the note icon and its text, canvas pixels.
const NOTE_TEXT_GAP: f64 = 4.0;
const NOTE_MAX_CHARS: usize = 50;
const NOTE_FILL: Rgb = Rgb::new(1.0, 0.87, 0.35);
const NOTE_OUTLINE: Rgb = Rgb::new(0.45, 0.38, 0.12);

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn stroke_color(rgb: Rgb) -> Operation {
    op("RG", vec![real(rgb.r as f64), real(rgb.g as f64), real(rgb.b as f64)])
}

fn fill_color(rgb: Rgb) -> Operation {
    op("rg", vec![real(rgb.r as f64), real(rgb.g as f64), real(rgb.b as f64)])
}

fn line_width(w: f64) -> Operation {
    op("w", vec![real(w)])
}

fn move_to(p: PdfPoint) -> Operation {
    op("m", vec![real(p.x), real(p.y)])
}

fn line_to(p: PdfPoint) -> Operation {
    op("l", vec![real(p.x), real(p.y)])
}

fn rect_path(r: &PdfRect) -> Operation {
    op("re", vec![real(r.x), real(r.y), real(r.width), real(r.height)])
}

/// Arrow shape in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowGeometry {
    pub angle: f64,
    pub shaft_end: PdfPoint,
    pub left_wing: PdfPoint,
    pub right_wing: PdfPoint,
}

/// Compute the shaft end and wing points for an arrow pointing at `tip`.
pub fn arrow_geometry(start: PdfPoint, tip: PdfPoint, head_length: f64) -> ArrowGeometry {
    let angle = (tip.y - start.y).atan2(tip.x - start.x);
    let wing = |theta: f64| {
        PdfPoint::new(
            tip.x - head_length * theta.cos(),
            tip.y - head_length * theta.sin(),
        )
    };
    ArrowGeometry {
        angle,
        shaft_end: PdfPoint::new(
            tip.x - ARROW_SHAFT_INSET * head_length * angle.cos(),
            tip.y - ARROW_SHAFT_INSET * head_length * angle.sin(),
        ),
        left_wing: wing(angle - ARROW_WING_ANGLE),
        right_wing: wing(angle + ARROW_WING_ANGLE),
    }
}

/// Four cubic Beziers approximating the ellipse inscribed in `r`.
fn ellipse_path(r: &PdfRect) -> Vec<Operation> {
    let rx = r.width / 2.0;
    let ry = r.height / 2.0;
    let cx = r.x + rx;
    let cy = r.y + ry;
    let ox = rx * KAPPA;
    let oy = ry * KAPPA;

    let curve = |pts: [f64; 6]| op("c", pts.iter().map(|v| real(*v)).collect());
    vec![
        move_to(PdfPoint::new(cx + rx, cy)),
        curve([cx + rx, cy + oy, cx + ox, cy + ry, cx, cy + ry]),
        curve([cx - ox, cy + ry, cx - rx, cy + oy, cx - rx, cy]),
        curve([cx - rx, cy - oy, cx - ox, cy - ry, cx, cy - ry]),
        curve([cx + ox, cy - ry, cx + rx, cy - oy, cx + rx, cy]),
        op("h", vec![]),
    ]
}

/// Resources the emitted operations refer to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResources {
    /// Resource name -> font.
    pub fonts: BTreeMap<String, StandardFont>,
    /// Resource name -> constant alpha.
    pub ext_g_states: BTreeMap<String, f64>,
}

impl PageResources {
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty() && self.ext_g_states.is_empty()
    }

    fn font(&mut self, font: StandardFont) -> String {
        let name = font.resource_name();
        self.fonts.insert(name.clone(), font);
        name
    }

    fn alpha(&mut self, opacity: f64) -> String {
        let permille = (opacity * 1000.0).round() as u32;
        let name = format!("MkGs{:04}", permille);
        self.ext_g_states.insert(name.clone(), permille as f64 / 1000.0);
        name
    }
}

/// Collects the drawing operations for every markup on one page.
pub struct PageCanvas {
    mapper: Mapper,
    operations: Vec<Operation>,
    resources: PageResources,
    drawn: usize,
}

impl PageCanvas {
    pub fn new(mapper: Mapper) -> Self {
        Self {
            mapper,
            operations: Vec::new(),
            resources: PageResources::default(),
            drawn: 0,
        }
    }

    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn resources(&self) -> &PageResources {
        &self.resources
    }

    pub fn into_parts(self) -> (Vec<Operation>, PageResources) {
        (self.operations, self.resources)
    }

    /// Append one markup. On a skip nothing is emitted for it.
    pub fn draw(&mut self, markup: &Markup) -> Result<(), SkipReason> {
        let style = &markup.style;
        let mut body = match &markup.kind {
            MarkupKind::Ink { points } | MarkupKind::Highlighter { points } => {
                self.stroke_path(markup.kind.name(), points, style)?
            }
            MarkupKind::Polyline { points } => self.stroke_path("polyline", points, style)?,
            MarkupKind::Line { start, end } => self.stroke_path("line", &[*start, *end], style)?,
            MarkupKind::Rectangle { start, end } | MarkupKind::Cloud { start, end } => {
                let rect = self.mapper.map_rect(*start, *end);
                self.paint_closed(markup.kind.name(), vec![rect_path(&rect)], style)?
            }
            MarkupKind::Ellipse { start, end } => {
                let rect = self.mapper.map_rect(*start, *end);
                self.paint_closed("ellipse", ellipse_path(&rect), style)?
            }
            MarkupKind::Polygon { points } => {
                if points.len() < 3 {
                    return Err(SkipReason::InsufficientGeometry {
                        kind: "polygon",
                        needed: 3,
                        got: points.len(),
                    });
                }
                let mapped = self.mapper.map_points(points);
                let mut path = Vec::with_capacity(mapped.len() + 1);
                path.push(move_to(mapped[0]));
                path.extend(mapped[1..].iter().map(|p| line_to(*p)));
                path.push(op("h", vec![]));
                self.paint_closed("polygon", path, style)?
            }
            MarkupKind::Arrow {
                start,
                end,
                head_size,
            } => self.arrow(*start, *end, *head_size, style)?,
            MarkupKind::TextBox {
                start,
                end,
                content,
                background,
                border,
            } => self.text_box(*start, *end, content, *background, *border, style)?,
            MarkupKind::StickyNote { anchor, content } => self.sticky_note(*anchor, content),
            MarkupKind::Callout {
                start,
                end,
                content,
            } => self.callout(*start, *end, content, style)?,
        };

        let mut group = Vec::with_capacity(body.len() + 3);
        group.push(op("q", vec![]));
        if style.opacity < 1.0 {
            let gs = self.resources.alpha(style.opacity);
            group.push(op("gs", vec![Object::Name(gs.into_bytes())]));
        }
        group.append(&mut body);
        group.push(op("Q", vec![]));

        debug!(
            "Composited {} on page {} ({} operations)",
            markup.kind.name(),
            markup.page,
            group.len()
        );
        self.operations.append(&mut group);
        self.drawn += 1;
        Ok(())
    }

    /// Open path through `points`: ink, highlighter, line, polyline.
    fn stroke_path(
        &self,
        kind: &'static str,
        points: &[Point],
        style: &Style,
    ) -> Result<Vec<Operation>, SkipReason> {
        if points.len() < 2 {
            return Err(SkipReason::InsufficientGeometry {
                kind,
                needed: 2,
                got: points.len(),
            });
        }
        let rgb = style.stroke.rgb().ok_or(SkipReason::NothingToPaint(kind))?;
        let mapped = self.mapper.map_points(points);

        let mut ops = vec![
            stroke_color(rgb),
            line_width(self.mapper.map_scalar(style.stroke_width)),
            op("J", vec![Object::Integer(1)]),
            op("j", vec![Object::Integer(1)]),
            move_to(mapped[0]),
        ];
        ops.extend(mapped[1..].iter().map(|p| line_to(*p)));
        ops.push(op("S", vec![]));
        Ok(ops)
    }

    /// Stroke and/or fill a closed path. An omitted stroke paints with a
    /// zero line width and a fill-only operator, so no border exists at all.
    fn paint_closed(
        &self,
        kind: &'static str,
        path: Vec<Operation>,
        style: &Style,
    ) -> Result<Vec<Operation>, SkipReason> {
        let mut ops = Vec::with_capacity(path.len() + 4);
        let painter = match (style.stroke, style.fill) {
            (Paint::Color(stroke), Paint::Color(fill)) => {
                ops.push(stroke_color(stroke));
                ops.push(fill_color(fill));
                ops.push(line_width(self.mapper.map_scalar(style.stroke_width)));
                "B"
            }
            (Paint::Color(stroke), Paint::Omitted) => {
                ops.push(stroke_color(stroke));
                ops.push(line_width(self.mapper.map_scalar(style.stroke_width)));
                "S"
            }
            (Paint::Omitted, Paint::Color(fill)) => {
                ops.push(fill_color(fill));
                ops.push(line_width(0.0));
                "f"
            }
            (Paint::Omitted, Paint::Omitted) => return Err(SkipReason::NothingToPaint(kind)),
        };
        ops.extend(path);
        ops.push(op(painter, vec![]));
        Ok(ops)
    }

    fn arrow(
        &self,
        start: Point,
        end: Point,
        head_size: f64,
        style: &Style,
    ) -> Result<Vec<Operation>, SkipReason> {
        let rgb = style.stroke.rgb().ok_or(SkipReason::NothingToPaint("arrow"))?;
        let from = self.mapper.map_point(start);
        let tip = self.mapper.map_point(end);
        let geometry = arrow_geometry(from, tip, self.mapper.map_scalar(head_size));

        Ok(vec![
            stroke_color(rgb),
            fill_color(rgb),
            line_width(self.mapper.map_scalar(style.stroke_width)),
            move_to(from),
            line_to(geometry.shaft_end),
            op("S", vec![]),
            move_to(tip),
            line_to(geometry.left_wing),
            line_to(geometry.right_wing),
            op("h", vec![]),
            op("f", vec![]),
        ])
    }

    /// `BT ... ET` block for already positioned lines.
    fn text_block(
        &mut self,
        font: StandardFont,
        font_size: f64,
        color: Rgb,
        lines: &[(String, PdfPoint)],
    ) -> Vec<Operation> {
        if lines.is_empty() {
            return Vec::new();
        }
        let name = self.resources.font(font);
        let mut ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(name.into_bytes()), real(font_size)]),
            fill_color(color),
        ];
        for (text, at) in lines {
            ops.push(op(
                "Tm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    real(at.x),
                    real(at.y),
                ],
            ));
            ops.push(op(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ));
        }
        ops.push(op("ET", vec![]));
        ops
    }

    /// Wrapped text inside `rect`, colored by the markup's stroke (black when omitted).
    fn boxed_text(&mut self, rect: &PdfRect, content: &TextContent, style: &Style) -> Vec<Operation> {
        if content.text.trim().is_empty() {
            return Vec::new();
        }
        let font_size = self.mapper.map_scalar(content.font_size);
        let padding = self.mapper.map_scalar(TEXT_PADDING);
        let lines: Vec<(String, PdfPoint)> =
            layout_text_box(&content.text, content.font, font_size, rect, padding, content.align)
                .into_iter()
                .map(|line| (line.text, PdfPoint::new(line.x, line.y)))
                .collect();
        let color = style.stroke.rgb().unwrap_or(Rgb::BLACK);
        self.text_block(content.font, font_size, color, &lines)
    }

    fn text_box(
        &mut self,
        start: Point,
        end: Point,
        content: &TextContent,
        background: Paint,
        border: Paint,
        style: &Style,
    ) -> Result<Vec<Operation>, SkipReason> {
        let rect = self.mapper.map_rect(start, end);
        let mut ops = Vec::new();

        if let Some(bg) = background.rgb() {
            ops.push(fill_color(bg));
            ops.push(rect_path(&rect));
            ops.push(op("f", vec![]));
        }
        if let Some(edge) = border.rgb() {
            ops.push(stroke_color(edge));
            ops.push(line_width(self.mapper.map_scalar(style.stroke_width)));
            ops.push(rect_path(&rect));
            ops.push(op("S", vec![]));
        }
        ops.extend(self.boxed_text(&rect, content, style));

        if ops.is_empty() {
            return Err(SkipReason::NothingToPaint("text box"));
        }
        Ok(ops)
    }

    fn sticky_note(&mut self, anchor: Point, content: &TextContent) -> Vec<Operation> {
        let top_left = self.mapper.map_point(anchor);
        let size = self.mapper.map_scalar(NOTE_ICON_SIZE);
        let icon = PdfRect {
            x: top_left.x,
            y: top_left.y - size,
            width: size,
            height: size,
        };

        let mut ops = vec![
            fill_color(NOTE_FILL),
            stroke_color(NOTE_OUTLINE),
            line_width(self.mapper.map_scalar(1.0)),
            rect_path(&icon),
            op("B", vec![]),
        ];
        // Ruled lines
        for fraction in [0.4, 0.65] {
            let y = icon.top() - icon.height * fraction;
            ops.push(move_to(PdfPoint::new(icon.x + size * 0.2, y)));
            ops.push(line_to(PdfPoint::new(icon.right() - size * 0.2, y)));
        }
        ops.push(op("S", vec![]));

        let text = content.text.trim();
        if !text.is_empty() {
            let font_size = self.mapper.map_scalar(content.font_size);
            let at = PdfPoint::new(
                icon.right() + self.mapper.map_scalar(NOTE_TEXT_GAP),
                icon.y + (size - font_size) / 2.0,
            );
            let line = truncate_with_ellipsis(text, NOTE_MAX_CHARS);
            ops.extend(self.text_block(content.font, font_size, Rgb::BLACK, &[(line, at)]));
        }
        ops
    }

    fn callout(
        &mut self,
        start: Point,
        end: Point,
        content: &TextContent,
        style: &Style,
    ) -> Result<Vec<Operation>, SkipReason> {
        let rect = self.mapper.map_rect(start, end);
        let mut ops = match self.paint_closed("callout", vec![rect_path(&rect)], style) {
            Ok(ops) => ops,
            Err(_) if !content.text.trim().is_empty() => Vec::new(),
            Err(skip) => return Err(skip),
        };
        ops.extend(self.boxed_text(&rect, content, style));
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CanvasSize, PageGeometry};
    use crate::markup::MarkupRecord;
    use crate::text_layout::TextAlign;
    use pretty_assertions::assert_eq;

    fn mapper(page_w: f64, page_h: f64, canvas_w: f64, canvas_h: f64) -> Mapper {
        Mapper::new(
            PageGeometry::new(page_w, page_h),
            CanvasSize::new(canvas_w, canvas_h).unwrap(),
        )
    }

    fn operators(canvas: &PageCanvas) -> Vec<&str> {
        canvas
            .operations()
            .iter()
            .map(|o| o.operator.as_str())
            .collect()
    }

    fn style(stroke: Paint, fill: Paint) -> Style {
        Style {
            stroke,
            fill,
            stroke_width: 2.0,
            opacity: 1.0,
        }
    }

    fn rectangle(stroke: Paint, fill: Paint) -> Markup {
        Markup {
            page: 0,
            kind: MarkupKind::Rectangle {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.5, 0.5),
            },
            style: style(stroke, fill),
        }
    }

    fn as_f64(obj: &Object) -> f64 {
        match obj {
            Object::Real(v) => *v as f64,
            Object::Integer(v) => *v as f64,
            other => panic!("not a number: {:?}", other),
        }
    }

    #[test]
    fn test_red_rectangle_without_fill_is_stroke_only() {
        // 500x700 page drawn on a 1000x1000 canvas
        let rec: MarkupRecord = serde_json::from_str(
            r##"{"type":"rectangle","page":0,"startX":0.1,"startY":0.1,"endX":0.5,"endY":0.5,
                 "color":"#ff0000","fillColor":"none"}"##,
        )
        .unwrap();
        let markup = Markup::from_record(&rec).unwrap();

        let mut canvas = PageCanvas::new(mapper(500.0, 700.0, 1000.0, 1000.0));
        canvas.draw(&markup).unwrap();

        assert_eq!(operators(&canvas), vec!["q", "RG", "w", "re", "S", "Q"]);
        assert!(!operators(&canvas).iter().any(|o| matches!(*o, "rg" | "f" | "B" | "b")));

        let re = &canvas.operations()[3];
        let nums: Vec<f64> = re.operands.iter().map(as_f64).collect();
        assert!((nums[0] - 50.0).abs() < 1e-3);
        assert!((nums[1] - 350.0).abs() < 1e-3);
        assert!((nums[2] - 200.0).abs() < 1e-3);
        assert!((nums[3] - 280.0).abs() < 1e-3);

        // Stroke width scales by scaleX = 0.5
        assert_eq!(as_f64(&canvas.operations()[2].operands[0]), 1.0);
    }

    #[test]
    fn test_omitted_stroke_forces_zero_width_and_fill_only() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        canvas
            .draw(&rectangle(Paint::Omitted, Paint::Color(Rgb::YELLOW)))
            .unwrap();
        assert_eq!(operators(&canvas), vec!["q", "rg", "w", "re", "f", "Q"]);
        assert_eq!(as_f64(&canvas.operations()[2].operands[0]), 0.0);
    }

    #[test]
    fn test_stroke_and_fill_use_combined_operator() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        canvas
            .draw(&rectangle(Paint::Color(Rgb::BLACK), Paint::Color(Rgb::WHITE)))
            .unwrap();
        assert_eq!(operators(&canvas), vec!["q", "RG", "rg", "w", "re", "B", "Q"]);
    }

    #[test]
    fn test_nothing_to_paint_is_skipped() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let err = canvas
            .draw(&rectangle(Paint::Omitted, Paint::Omitted))
            .unwrap_err();
        assert_eq!(err, SkipReason::NothingToPaint("rectangle"));
        assert!(canvas.operations().is_empty());
        assert_eq!(canvas.drawn(), 0);
    }

    #[test]
    fn test_ellipse_uses_four_curves() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Ellipse {
                start: Point::new(0.2, 0.2),
                end: Point::new(0.4, 0.3),
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        let curves = operators(&canvas).iter().filter(|o| **o == "c").count();
        assert_eq!(curves, 4);
    }

    #[test]
    fn test_arrow_wings_are_symmetric() {
        let g = arrow_geometry(PdfPoint::new(0.0, 0.0), PdfPoint::new(100.0, 0.0), 12.0);

        assert_eq!(g.angle, 0.0);
        assert!((g.shaft_end.x - (100.0 - 0.7 * 12.0)).abs() < 1e-9);
        assert_eq!(g.shaft_end.y, 0.0);

        // Mirror images across the shaft line y = 0
        assert!((g.left_wing.x - g.right_wing.x).abs() < 1e-9);
        assert!((g.left_wing.y + g.right_wing.y).abs() < 1e-9);

        // Each wing sits head-length back from the tip at pi/7 off the shaft
        for wing in [g.left_wing, g.right_wing] {
            let dx = 100.0 - wing.x;
            let dy = wing.y;
            assert!(((dx * dx + dy * dy).sqrt() - 12.0).abs() < 1e-9);
            assert!((dy.abs().atan2(dx) - PI / 7.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_arrow_head_is_filled_triangle() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Arrow {
                start: Point::new(0.1, 0.5),
                end: Point::new(0.9, 0.5),
                head_size: 15.0,
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        assert_eq!(
            operators(&canvas),
            vec!["q", "RG", "rg", "w", "m", "l", "S", "m", "l", "l", "h", "f", "Q"]
        );
    }

    #[test]
    fn test_arrow_head_scales_by_horizontal_factor() {
        // 500x700 page on a square canvas: scaleX 0.5, scaleY 0.7
        let mut canvas = PageCanvas::new(mapper(500.0, 700.0, 1000.0, 1000.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Arrow {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.8, 0.6),
                head_size: 20.0,
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();

        let ops = canvas.operations();
        assert_eq!(ops[7].operator, "m");
        let tip = (as_f64(&ops[7].operands[0]), as_f64(&ops[7].operands[1]));
        assert!((tip.0 - 400.0).abs() < 1e-3);
        assert!((tip.1 - 280.0).abs() < 1e-3);
        for wing in &ops[8..10] {
            assert_eq!(wing.operator, "l");
            let dx = as_f64(&wing.operands[0]) - tip.0;
            let dy = as_f64(&wing.operands[1]) - tip.1;
            assert!(((dx * dx + dy * dy).sqrt() - 10.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_ink_connects_consecutive_points() {
        let mut canvas = PageCanvas::new(mapper(100.0, 100.0, 100.0, 100.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Ink {
                points: vec![
                    Point::new(0.0, 0.0),
                    Point::new(0.5, 0.5),
                    Point::new(1.0, 0.0),
                ],
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        assert_eq!(
            operators(&canvas),
            vec!["q", "RG", "w", "J", "j", "m", "l", "l", "S", "Q"]
        );
        let first = &canvas.operations()[5];
        assert_eq!(as_f64(&first.operands[1]), 100.0);
    }

    #[test]
    fn test_translucent_markup_registers_graphics_state() {
        let mut canvas = PageCanvas::new(mapper(100.0, 100.0, 100.0, 100.0));
        let mut markup = rectangle(Paint::Color(Rgb::YELLOW), Paint::Omitted);
        markup.style.opacity = 0.4;
        canvas.draw(&markup).unwrap();

        assert_eq!(operators(&canvas)[1], "gs");
        assert_eq!(
            canvas.resources().ext_g_states.get("MkGs0400").copied(),
            Some(0.4)
        );
    }

    #[test]
    fn test_polygon_closes_path() {
        let mut canvas = PageCanvas::new(mapper(100.0, 100.0, 100.0, 100.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Polygon {
                points: vec![
                    Point::new(0.1, 0.1),
                    Point::new(0.9, 0.1),
                    Point::new(0.5, 0.9),
                ],
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        assert_eq!(
            operators(&canvas),
            vec!["q", "RG", "w", "m", "l", "l", "h", "S", "Q"]
        );
    }

    #[test]
    fn test_line_is_not_closed() {
        let mut canvas = PageCanvas::new(mapper(100.0, 100.0, 100.0, 100.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Line {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.9, 0.9),
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        assert!(!operators(&canvas).contains(&"h"));
    }

    #[test]
    fn test_text_box_draws_background_beneath_text() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::TextBox {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.6, 0.3),
                content: TextContent {
                    text: "Hello world".to_string(),
                    font_size: 12.0,
                    align: TextAlign::Left,
                    font: StandardFont::Helvetica,
                },
                background: Paint::Color(Rgb::WHITE),
                border: Paint::Omitted,
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();

        let ops = operators(&canvas);
        let fill_at = ops.iter().position(|o| *o == "f").unwrap();
        let text_at = ops.iter().position(|o| *o == "BT").unwrap();
        assert!(fill_at < text_at);
        assert!(canvas.resources().fonts.contains_key("MkHelvetica"));

        let tj = canvas
            .operations()
            .iter()
            .find(|o| o.operator == "Tj")
            .unwrap();
        match &tj.operands[0] {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"Hello world"),
            other => panic!("expected literal string, got {:?}", other),
        }
    }

    #[test]
    fn test_font_size_scales_by_horizontal_factor() {
        let mut canvas = PageCanvas::new(mapper(500.0, 700.0, 1000.0, 1000.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::TextBox {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.6, 0.3),
                content: TextContent {
                    text: "Check".to_string(),
                    font_size: 16.0,
                    align: TextAlign::Left,
                    font: StandardFont::Helvetica,
                },
                background: Paint::Omitted,
                border: Paint::Omitted,
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();

        let tf = canvas
            .operations()
            .iter()
            .find(|o| o.operator == "Tf")
            .unwrap();
        assert!((as_f64(&tf.operands[1]) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_box_is_skipped() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::TextBox {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.6, 0.3),
                content: TextContent {
                    text: "   ".to_string(),
                    font_size: 12.0,
                    align: TextAlign::Left,
                    font: StandardFont::Helvetica,
                },
                background: Paint::Omitted,
                border: Paint::Omitted,
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        assert_eq!(
            canvas.draw(&markup).unwrap_err(),
            SkipReason::NothingToPaint("text box")
        );
    }

    #[test]
    fn test_sticky_note_ignores_accent_color_and_truncates() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::StickyNote {
                anchor: Point::new(0.5, 0.5),
                content: TextContent {
                    text: "n".repeat(80),
                    font_size: 12.0,
                    align: TextAlign::Left,
                    font: StandardFont::Helvetica,
                },
            },
            style: style(Paint::Color(Rgb::new(0.0, 0.0, 1.0)), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();

        let ops = canvas.operations();
        let rg = ops.iter().find(|o| o.operator == "rg").unwrap();
        assert_eq!(as_f64(&rg.operands[0]), NOTE_FILL.r as f64);

        let tj = ops.iter().find(|o| o.operator == "Tj").unwrap();
        match &tj.operands[0] {
            Object::String(bytes, _) => {
                assert_eq!(bytes.len(), 53);
                assert!(bytes.ends_with(b"..."));
            }
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_cloud_degrades_to_rectangle() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        let markup = Markup {
            page: 0,
            kind: MarkupKind::Cloud {
                start: Point::new(0.1, 0.1),
                end: Point::new(0.3, 0.3),
            },
            style: style(Paint::Color(Rgb::BLACK), Paint::Omitted),
        };
        canvas.draw(&markup).unwrap();
        assert_eq!(operators(&canvas), vec!["q", "RG", "w", "re", "S", "Q"]);
    }

    #[test]
    fn test_later_markups_are_emitted_after_earlier_ones() {
        let mut canvas = PageCanvas::new(mapper(612.0, 792.0, 612.0, 792.0));
        canvas
            .draw(&rectangle(Paint::Color(Rgb::BLACK), Paint::Omitted))
            .unwrap();
        canvas
            .draw(&rectangle(Paint::Omitted, Paint::Color(Rgb::WHITE)))
            .unwrap();
        assert_eq!(
            operators(&canvas),
            vec!["q", "RG", "w", "re", "S", "Q", "q", "rg", "w", "re", "f", "Q"]
        );
        assert_eq!(canvas.drawn(), 2);
    }
}
