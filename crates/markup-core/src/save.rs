//! Save pipeline: validate, load, prune, composite, serialize.

use std::collections::BTreeMap;

use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::annotations::{prune_document, PageRemoval, RemovalSet};
use crate::compositor::PageCanvas;
use crate::content::append_to_page;
use crate::coords::{CanvasSize, Mapper, PageGeometry};
use crate::error::MarkupError;
use crate::markup::{Markup, MarkupRecord, SkipReason};

/// A save request as sent by the editor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub target_filename: Option<String>,
    /// Entries stay raw so one malformed markup is skipped on its own.
    #[serde(default)]
    pub markups: Option<Vec<Value>>,
    #[serde(default)]
    pub annotations_to_remove: Vec<String>,
    #[serde(default)]
    pub flatten: bool,
    #[serde(default)]
    pub canvas_width: Option<f64>,
    #[serde(default)]
    pub canvas_height: Option<f64>,
}

/// A request that passed [`SaveRequest::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub target_filename: String,
    pub markups: Vec<Value>,
    pub removals: RemovalSet,
    pub flatten: bool,
    pub canvas: CanvasSize,
}

impl SaveRequest {
    pub fn validate(self) -> Result<ValidatedRequest, MarkupError> {
        let target_filename = self
            .target_filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| MarkupError::InvalidRequest("targetFilename is required".into()))?;

        let markups = self
            .markups
            .ok_or_else(|| MarkupError::InvalidRequest("markups is required".into()))?;

        let (width, height) = self.canvas_width.zip(self.canvas_height).ok_or_else(|| {
            MarkupError::InvalidRequest("canvasWidth and canvasHeight are required".into())
        })?;
        let canvas = CanvasSize::new(width, height).ok_or_else(|| {
            MarkupError::InvalidRequest(format!(
                "canvas dimensions must be positive, got {}x{}",
                width, height
            ))
        })?;

        Ok(ValidatedRequest {
            target_filename,
            markups,
            removals: self.annotations_to_remove.into_iter().collect(),
            flatten: self.flatten,
            canvas,
        })
    }
}

/// A markup that was not drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMarkup {
    /// Position in the request's markup list.
    pub index: usize,
    pub id: Option<String>,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub removed: Vec<PageRemoval>,
    pub drawn: usize,
    pub skipped: Vec<SkippedMarkup>,
}

impl SaveReport {
    pub fn annotations_removed(&self) -> usize {
        self.removed.iter().map(|r| r.removed).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub report: SaveReport,
}

/// `flattened_` or `annotated_` followed by the target's base name.
pub fn suggested_filename(target: &str, flatten: bool) -> String {
    let base = target
        .rsplit(['/', '\\'])
        .next()
        .filter(|b| !b.is_empty())
        .unwrap_or("document.pdf");
    let prefix = if flatten { "flattened_" } else { "annotated_" };
    format!("{}{}", prefix, base)
}

/// Apply one save request to the source document bytes.
///
/// Annotations named in the removal set are pruned from every page first,
/// then markups are drawn page by page in request order. Markups that cannot
/// be drawn are reported and skipped; anything that breaks the document
/// itself fails the whole save.
pub fn apply_markups(pdf_bytes: &[u8], request: &ValidatedRequest) -> Result<SaveOutcome, MarkupError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| MarkupError::ParseError(e.to_string()))?;

    let mut report = SaveReport {
        removed: prune_document(&mut doc, &request.removals)?,
        ..SaveReport::default()
    };

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

    // Paint order within a page is request order
    let mut by_page: BTreeMap<usize, Vec<(usize, MarkupLabel, Markup)>> = BTreeMap::new();
    for (index, value) in request.markups.iter().enumerate() {
        let record = match MarkupRecord::from_value(value) {
            Ok(record) => record,
            Err(reason) => {
                skip(&mut report, index, &MarkupLabel::from_value(value), reason);
                continue;
            }
        };
        let out_of_range = |page: i64| SkipReason::PageOutOfRange {
            page,
            page_count: pages.len(),
        };
        let placed = Markup::from_record(&record)
            .map_err(|reason| match reason {
                SkipReason::PageOutOfRange { page, .. } => out_of_range(page),
                other => other,
            })
            .and_then(|markup| {
                if markup.page < pages.len() {
                    Ok(markup)
                } else {
                    Err(out_of_range(markup.page as i64))
                }
            });
        let label = MarkupLabel::from_record(&record);
        match placed {
            Ok(markup) => by_page.entry(markup.page).or_default().push((index, label, markup)),
            Err(reason) => skip(&mut report, index, &label, reason),
        }
    }

    for (page, markups) in by_page {
        let page_id = pages[page];
        let mapper = Mapper::new(PageGeometry::from_page(&doc, page_id), request.canvas);
        let mut canvas = PageCanvas::new(mapper);

        for (index, label, markup) in markups {
            if let Err(reason) = canvas.draw(&markup) {
                skip(&mut report, index, &label, reason);
            }
        }

        report.drawn += canvas.drawn();
        let (operations, resources) = canvas.into_parts();
        append_to_page(&mut doc, page_id, operations, &resources)?;
    }

    doc.compress();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| MarkupError::SerializationError(e.to_string()))?;

    info!(
        "Saved {}: {} drawn, {} skipped, {} annotation(s) removed",
        request.target_filename,
        report.drawn,
        report.skipped.len(),
        report.annotations_removed()
    );

    report.skipped.sort_by_key(|s| s.index);
    Ok(SaveOutcome {
        bytes,
        filename: suggested_filename(&request.target_filename, request.flatten),
        report,
    })
}

/// Identity of a markup as echoed back in a skip entry.
struct MarkupLabel {
    id: Option<String>,
    kind: String,
}

impl MarkupLabel {
    fn from_record(record: &MarkupRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind.clone(),
        }
    }

    /// Best effort for entries that did not decode.
    fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: text("id"),
            kind: text("type").unwrap_or_default(),
        }
    }
}

fn skip(report: &mut SaveReport, index: usize, label: &MarkupLabel, reason: SkipReason) {
    warn!("Skipping markup #{} ({}): {}", index, label.kind, reason);
    report.skipped.push(SkippedMarkup {
        index,
        id: label.id.clone(),
        kind: label.kind.clone(),
        reason: reason.to_string(),
    });
}
