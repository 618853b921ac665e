//! Annotation graph editor
//!
//! Removes annotation entries from a page's `/Annots` array when the editor
//! replaces them with freshly composited marks. Only the array is rewritten:
//! the annotation objects themselves, and everything they reference, stay in
//! the graph untouched.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coords::{read_box, resolve, CanvasSize, Mapper, PageGeometry, PdfPoint};
use crate::error::MarkupError;

/// Identifiers of annotations to delete.
#[derive(Debug, Clone, Default)]
pub struct RemovalSet {
    ids: HashSet<String>,
}

impl RemovalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl<S: Into<String>> FromIterator<S> for RemovalSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter
                .into_iter()
                .map(Into::into)
                .map(|id: String| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}

/// One way of deriving an identifier from an annotation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierStrategy {
    /// The stable `/NM` name.
    Name,
    /// The `/T` display title.
    Title,
    /// `<object number>R`, derived from the entry's indirect reference.
    ObjectRef,
}

/// Strategies in evaluation order; the first candidate found in the removal
/// set decides.
pub const IDENTIFIER_STRATEGIES: [IdentifierStrategy; 3] = [
    IdentifierStrategy::Name,
    IdentifierStrategy::Title,
    IdentifierStrategy::ObjectRef,
];

impl IdentifierStrategy {
    /// Candidates are trimmed like the identifiers in a [`RemovalSet`].
    fn candidate(&self, doc: &Document, reference: Option<ObjectId>, annot: &Dictionary) -> Option<String> {
        let text = match self {
            IdentifierStrategy::Name => text_entry(doc, annot, b"NM"),
            IdentifierStrategy::Title => text_entry(doc, annot, b"T"),
            IdentifierStrategy::ObjectRef => return reference.map(reference_token),
        };
        text.map(|t| t.trim().to_string())
    }
}

/// The position-independent token for an indirect annotation, e.g. `12R`.
pub fn reference_token(id: ObjectId) -> String {
    format!("{}R", id.0)
}

/// Treatment of `/Annots` entries that cannot be dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// A failed lookup is never taken as a match: the entry stays.
    Keep,
}

pub const UNRESOLVED_POLICY: UnresolvedPolicy = UnresolvedPolicy::Keep;

/// What happens to one `/Annots` entry.
#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Keep,
    Remove { matched: String },
    Unresolved(UnresolvedPolicy),
}

impl Verdict {
    fn retains_entry(&self) -> bool {
        match self {
            Verdict::Keep => true,
            Verdict::Unresolved(UnresolvedPolicy::Keep) => true,
            Verdict::Remove { .. } => false,
        }
    }
}

/// Resolve an `/Annots` entry to its dictionary and, for indirect entries, its id.
fn resolve_entry<'a>(doc: &'a Document, entry: &'a Object) -> Option<(Option<ObjectId>, &'a Dictionary)> {
    match entry {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => Some((Some(*id), dict)),
            _ => None,
        },
        Object::Dictionary(dict) => Some((None, dict)),
        _ => None,
    }
}

fn judge(doc: &Document, entry: &Object, removals: &RemovalSet) -> Verdict {
    let Some((reference, annot)) = resolve_entry(doc, entry) else {
        return Verdict::Unresolved(UNRESOLVED_POLICY);
    };
    for strategy in IDENTIFIER_STRATEGIES {
        if let Some(candidate) = strategy.candidate(doc, reference, annot) {
            if removals.contains(&candidate) {
                return Verdict::Remove { matched: candidate };
            }
        }
    }
    Verdict::Keep
}

/// Where a page's annotation array lives.
enum AnnotsLocation {
    Inline,
    Indirect(ObjectId),
}

fn page_annots(doc: &Document, page_id: ObjectId) -> Result<Option<(Vec<Object>, AnnotsLocation)>, MarkupError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| MarkupError::OperationError(format!("Failed to get page object: {}", e)))?;

    let annots = match page.get(b"Annots") {
        Ok(Object::Array(items)) => Some((items.clone(), AnnotsLocation::Inline)),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => Some((items.clone(), AnnotsLocation::Indirect(*id))),
            _ => {
                warn!("Annots of page {:?} points at {:?}, which is not an array", page_id, id);
                None
            }
        },
        _ => None,
    };
    Ok(annots)
}

/// Remove every annotation on the page whose name, title or reference token
/// is in `removals`. Returns how many entries were removed.
///
/// Relative order of the surviving entries is preserved, and the array is
/// only written back when something was actually removed.
pub fn remove_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    removals: &RemovalSet,
) -> Result<usize, MarkupError> {
    if removals.is_empty() {
        return Ok(0);
    }
    let Some((entries, location)) = page_annots(doc, page_id)? else {
        return Ok(0);
    };

    let mut kept = Vec::with_capacity(entries.len());
    let mut removed = 0;
    for entry in entries {
        let verdict = judge(doc, &entry, removals);
        match &verdict {
            Verdict::Remove { matched } => debug!("Removing annotation {:?} (matched {:?})", entry, matched),
            Verdict::Unresolved(policy) => {
                warn!("Unresolvable annotation entry {:?}, policy {:?}", entry, policy)
            }
            Verdict::Keep => {}
        }
        if verdict.retains_entry() {
            kept.push(entry);
        } else {
            removed += 1;
        }
    }

    if removed == 0 {
        return Ok(0);
    }

    match location {
        AnnotsLocation::Indirect(id) => {
            *doc.get_object_mut(id)
                .map_err(|e| MarkupError::OperationError(format!("Failed to update Annots: {}", e)))? =
                Object::Array(kept);
        }
        AnnotsLocation::Inline => {
            doc.get_object_mut(page_id)
                .map_err(|e| MarkupError::OperationError(format!("Failed to get page object: {}", e)))?
                .as_dict_mut()
                .map_err(|_| MarkupError::OperationError("Page is not a dictionary".into()))?
                .set("Annots", Object::Array(kept));
        }
    }
    Ok(removed)
}

/// Removal count for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRemoval {
    /// Zero-based page index.
    pub page: usize,
    pub removed: usize,
}

/// Run [`remove_annotations`] over every page. Only pages where something was
/// removed are reported.
pub fn prune_document(doc: &mut Document, removals: &RemovalSet) -> Result<Vec<PageRemoval>, MarkupError> {
    if removals.is_empty() {
        return Ok(Vec::new());
    }
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    let mut report = Vec::new();
    for (page, page_id) in page_ids.into_iter().enumerate() {
        let removed = remove_annotations(doc, page_id, removals)?;
        if removed > 0 {
            info!("Removed {} annotation(s) from page {}", removed, page);
            report.push(PageRemoval { page, removed });
        }
    }
    Ok(report)
}

/// An existing annotation, described by the identifiers it can be removed by.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSummary {
    /// Zero-based page index.
    pub page: usize,
    pub subtype: Option<String>,
    /// `<number>R`, absent for inline annotations.
    pub reference: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub contents: Option<String>,
    /// `[x1, y1, x2, y2]` in page space.
    pub rect: Option<[f64; 4]>,
    /// Top-left and bottom-right corners in normalized canvas space.
    pub normalized: Option<[f64; 4]>,
}

/// Describe every resolvable annotation in the document, page by page.
pub fn list_annotations(doc: &Document) -> Vec<AnnotationSummary> {
    let mut out = Vec::new();
    for (page, page_id) in doc.get_pages().into_values().enumerate() {
        let entries = match page_annots(doc, page_id) {
            Ok(Some((entries, _))) => entries,
            _ => continue,
        };
        let mapper = Mapper::new(
            PageGeometry::from_page(doc, page_id),
            CanvasSize {
                width: 1.0,
                height: 1.0,
            },
        );
        for entry in &entries {
            let Some((reference, annot)) = resolve_entry(doc, entry) else {
                continue;
            };
            let rect = annot.get(b"Rect").ok().and_then(|r| read_box(doc, r));
            let normalized = rect.map(|[x1, y1, x2, y2]| {
                let top_left = mapper.pdf_to_canvas(PdfPoint::new(x1.min(x2), y1.max(y2)));
                let bottom_right = mapper.pdf_to_canvas(PdfPoint::new(x1.max(x2), y1.min(y2)));
                [top_left.x, top_left.y, bottom_right.x, bottom_right.y]
            });
            out.push(AnnotationSummary {
                page,
                subtype: annot
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).into_owned()),
                reference: reference.map(reference_token),
                name: text_entry(doc, annot, b"NM"),
                title: text_entry(doc, annot, b"T"),
                contents: text_entry(doc, annot, b"Contents"),
                rect,
                normalized,
            });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnnotations {
    pub page_count: usize,
    pub annotations: Vec<AnnotationSummary>,
}

/// Load PDF bytes and describe their annotations.
pub fn describe_annotations(pdf_bytes: &[u8]) -> Result<DocumentAnnotations, MarkupError> {
    let doc =
        Document::load_mem(pdf_bytes).map_err(|e| MarkupError::ParseError(e.to_string()))?;
    Ok(DocumentAnnotations {
        page_count: doc.get_pages().len(),
        annotations: list_annotations(&doc),
    })
}

fn text_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = resolve(doc, dict.get(key).ok()?)?;
    match value {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE when it carries a byte-order mark,
/// otherwise PDFDocEncoding, approximated as Latin-1.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    bytes.iter().map(|b| *b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    /// A one-page document; returns it with the page id.
    fn document_with_annots(annots: Vec<Dictionary>) -> (Document, ObjectId, Vec<ObjectId>) {
        let mut doc = Document::with_version("1.7");
        let annot_ids: Vec<ObjectId> = annots.into_iter().map(|a| doc.add_object(a)).collect();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => annot_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        });
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Parent", Object::Reference(pages_id));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, page_id, annot_ids)
    }

    fn annot(subtype: &str) -> Dictionary {
        dictionary! {
            "Type" => "Annot",
            "Subtype" => Object::Name(subtype.as_bytes().to_vec()),
            "Rect" => vec![10.into(), 10.into(), 50.into(), 50.into()],
        }
    }

    fn annots_of(doc: &Document, page_id: ObjectId) -> Vec<Object> {
        page_annots(doc, page_id).unwrap().unwrap().0
    }

    fn refs(objects: &[Object]) -> Vec<ObjectId> {
        objects.iter().map(|o| o.as_reference().unwrap()).collect()
    }

    #[test]
    fn test_removes_by_title() {
        let mut note = annot("Text");
        note.set("T", text("note-1"));
        let (mut doc, page_id, ids) = document_with_annots(vec![note]);

        let removals: RemovalSet = ["note-1"].into_iter().collect();
        let removed = remove_annotations(&mut doc, page_id, &removals).unwrap();

        assert_eq!(removed, 1);
        assert!(annots_of(&doc, page_id).is_empty());
        // The annotation object itself is still in the graph
        assert!(doc.get_object(ids[0]).is_ok());
        // Other page attributes are untouched
        assert!(doc.get_dictionary(page_id).unwrap().has(b"MediaBox"));
    }

    #[test]
    fn test_title_with_trailing_space_matches() {
        let mut note = annot("Text");
        note.set("T", text("note-1 "));
        let (mut doc, page_id, _) = document_with_annots(vec![note]);

        let removals: RemovalSet = ["note-1"].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 1);
        assert!(annots_of(&doc, page_id).is_empty());
    }

    #[test]
    fn test_removes_by_name_and_reference_token() {
        let mut named = annot("Square");
        named.set("NM", text("uuid-42"));
        let (mut doc, page_id, ids) =
            document_with_annots(vec![named, annot("Circle"), annot("Ink")]);

        let token = reference_token(ids[2]);
        let removals: RemovalSet = vec!["uuid-42".to_string(), token].into_iter().collect();
        let removed = remove_annotations(&mut doc, page_id, &removals).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(refs(&annots_of(&doc, page_id)), vec![ids[1]]);
    }

    #[test]
    fn test_absent_identifier_changes_nothing() {
        let (mut doc, page_id, ids) = document_with_annots(vec![annot("Text"), annot("Line")]);
        let removals: RemovalSet = ["missing"].into_iter().collect();

        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 0);
        assert_eq!(refs(&annots_of(&doc, page_id)), ids);

        // Removing twice is the same as removing once
        let removals: RemovalSet = [reference_token(ids[0])].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 1);
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 0);
        assert_eq!(refs(&annots_of(&doc, page_id)), vec![ids[1]]);
    }

    #[test]
    fn test_dangling_reference_is_kept() {
        let (mut doc, page_id, ids) = document_with_annots(vec![annot("Text")]);
        let dangling: ObjectId = (9999, 0);
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set(
                "Annots",
                vec![Object::Reference(dangling), Object::Reference(ids[0])],
            );

        // Even naming the dangling entry's token does not remove it
        let removals: RemovalSet = [reference_token(dangling), reference_token(ids[0])]
            .into_iter()
            .collect();
        let removed = remove_annotations(&mut doc, page_id, &removals).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(refs(&annots_of(&doc, page_id)), vec![dangling]);
    }

    #[test]
    fn test_page_without_annots_is_a_noop() {
        let (mut doc, page_id, _) = document_with_annots(vec![]);
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove(b"Annots");

        let removals: RemovalSet = ["anything"].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 0);
        assert!(!doc.get_dictionary(page_id).unwrap().has(b"Annots"));
    }

    #[test]
    fn test_indirect_annots_array_is_updated_in_place() {
        let mut first = annot("Text");
        first.set("T", text("drop-me"));
        let (mut doc, page_id, ids) = document_with_annots(vec![first, annot("Text")]);
        let array_id = doc.add_object(Object::Array(
            ids.iter().map(|id| Object::Reference(*id)).collect(),
        ));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", Object::Reference(array_id));

        let removals: RemovalSet = ["drop-me"].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 1);

        let page = doc.get_dictionary(page_id).unwrap();
        assert_eq!(page.get(b"Annots").unwrap().as_reference().unwrap(), array_id);
        let array = doc.get_object(array_id).unwrap().as_array().unwrap();
        assert_eq!(refs(array), vec![ids[1]]);
    }

    #[test]
    fn test_inline_annotation_matches_by_title() {
        let (mut doc, page_id, _) = document_with_annots(vec![]);
        let mut inline = annot("FreeText");
        inline.set("T", text("inline-1"));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", vec![Object::Dictionary(inline)]);

        let removals: RemovalSet = ["inline-1"].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 1);
    }

    #[test]
    fn test_utf16_title_is_decoded() {
        let mut note = annot("Text");
        // "é1" as UTF-16BE with BOM
        note.set(
            "T",
            Object::String(vec![0xFE, 0xFF, 0x00, 0xE9, 0x00, 0x31], StringFormat::Hexadecimal),
        );
        let (mut doc, page_id, _) = document_with_annots(vec![note]);

        let removals: RemovalSet = ["é1"].into_iter().collect();
        assert_eq!(remove_annotations(&mut doc, page_id, &removals).unwrap(), 1);
    }

    #[test]
    fn test_prune_document_reports_pages_with_removals() {
        let mut note = annot("Text");
        note.set("NM", text("a"));
        let (mut doc, _, _) = document_with_annots(vec![note, annot("Text")]);

        let removals: RemovalSet = ["a", "b"].into_iter().collect();
        let report = prune_document(&mut doc, &removals).unwrap();
        assert_eq!(report, vec![PageRemoval { page: 0, removed: 1 }]);
    }

    #[test]
    fn test_list_annotations_reports_identifiers() {
        let mut note = annot("Text");
        note.set("NM", text("uuid-1"));
        note.set("T", text("Reviewer"));
        note.set("Contents", text("Looks good"));
        let (doc, _, ids) = document_with_annots(vec![note]);

        let listed = list_annotations(&doc);
        assert_eq!(
            listed,
            vec![AnnotationSummary {
                page: 0,
                subtype: Some("Text".to_string()),
                reference: Some(reference_token(ids[0])),
                name: Some("uuid-1".to_string()),
                title: Some("Reviewer".to_string()),
                contents: Some("Looks good".to_string()),
                rect: Some([10.0, 10.0, 50.0, 50.0]),
                normalized: Some([
                    10.0 / 612.0,
                    1.0 - 50.0 / 792.0,
                    50.0 / 612.0,
                    1.0 - 10.0 / 792.0,
                ]),
            }]
        );
    }

    #[test]
    fn test_describe_annotations_from_bytes() {
        let mut note = annot("Text");
        note.set("T", text("note-1"));
        let (mut doc, _, _) = document_with_annots(vec![note]);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let described = describe_annotations(&bytes).unwrap();
        assert_eq!(described.page_count, 1);
        assert_eq!(described.annotations[0].title.as_deref(), Some("note-1"));

        assert!(matches!(
            describe_annotations(b"garbage"),
            Err(MarkupError::ParseError(_))
        ));
    }

    #[test]
    fn test_removal_set_ignores_blank_ids() {
        let removals: RemovalSet = ["", "  ", "x"].into_iter().collect();
        assert_eq!(removals.len(), 1);
        assert!(removals.contains("x"));
    }
}
