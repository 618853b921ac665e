//! Page content and resource plumbing
//!
//! Appends a composited content stream to a page and registers the fonts and
//! graphics states it uses. The page's original content is bracketed in
//! `q`/`Q` first so any graphics state it leaves behind (a scaled CTM, a fill
//! color) cannot distort the markups drawn after it.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::compositor::PageResources;
use crate::coords::inherited_attribute;
use crate::error::MarkupError;

/// Append `operations` as a new content stream at the end of the page and
/// make `resources` available to it.
pub fn append_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
    resources: &PageResources,
) -> Result<(), MarkupError> {
    if operations.is_empty() {
        return Ok(());
    }

    register_resources(doc, page_id, resources)?;

    let encoded = Content { operations }
        .encode()
        .map_err(|e| MarkupError::SerializationError(format!("Failed to encode content: {}", e)))?;

    let mut contents = existing_contents(doc, page_id)?;
    let markup_bytes = if contents.is_empty() {
        encoded
    } else {
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.insert(0, Object::Reference(open_id));
        let mut bytes = b"\nQ\n".to_vec();
        bytes.extend(encoded);
        bytes
    };

    let markup_id = doc.add_object(Stream::new(Dictionary::new(), markup_bytes));
    contents.push(Object::Reference(markup_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, MarkupError> {
    doc.get_object_mut(page_id)
        .map_err(|e| MarkupError::OperationError(format!("Failed to get page object: {}", e)))?
        .as_dict_mut()
        .map_err(|_| MarkupError::OperationError("Page is not a dictionary".into()))
}

/// The page's content streams as a flat list of references.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, MarkupError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| MarkupError::OperationError(format!("Failed to get page object: {}", e)))?;

    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            // An indirect array of streams
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

/// Where a dictionary lives in the object graph.
enum Location {
    Indirect(ObjectId),
    Inline,
}

/// Resolve `key` in `parent` to an owned copy of the dictionary plus its location.
fn take_sub_dictionary(doc: &Document, parent: &Dictionary, key: &[u8]) -> (Dictionary, Location) {
    match parent.get(key) {
        Ok(Object::Reference(id)) => match doc.get_dictionary(*id) {
            Ok(dict) => (dict.clone(), Location::Indirect(*id)),
            Err(_) => (Dictionary::new(), Location::Inline),
        },
        Ok(Object::Dictionary(dict)) => (dict.clone(), Location::Inline),
        _ => (Dictionary::new(), Location::Inline),
    }
}

fn write_dictionary(
    doc: &mut Document,
    location: Location,
    parent: &mut Dictionary,
    key: &str,
    dict: Dictionary,
) -> Result<(), MarkupError> {
    match location {
        Location::Indirect(id) => {
            let target = doc
                .get_object_mut(id)
                .map_err(|e| MarkupError::OperationError(format!("Failed to update {}: {}", key, e)))?;
            *target = Object::Dictionary(dict);
            parent.set(key, Object::Reference(id));
        }
        Location::Inline => parent.set(key, Object::Dictionary(dict)),
    }
    Ok(())
}

fn font_dictionary(base_font: &str) -> Dictionary {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    font
}

fn alpha_dictionary(alpha: f64) -> Dictionary {
    let mut gs = Dictionary::new();
    gs.set("Type", Object::Name(b"ExtGState".to_vec()));
    gs.set("CA", Object::Real(alpha as f32));
    gs.set("ca", Object::Real(alpha as f32));
    gs
}

/// Add fonts and graphics states to the page's `/Resources`.
///
/// Inherited resources are copied onto the page before being extended, so
/// the page keeps everything it could already see. Existing entries with the
/// same name are left alone.
fn register_resources(
    doc: &mut Document,
    page_id: ObjectId,
    resources: &PageResources,
) -> Result<(), MarkupError> {
    if resources.is_empty() {
        return Ok(());
    }

    let (mut res_dict, res_location) = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| MarkupError::OperationError(format!("Failed to get page object: {}", e)))?;
        if page.has(b"Resources") {
            take_sub_dictionary(doc, page, b"Resources")
        } else {
            let inherited = inherited_attribute(doc, page_id, b"Resources")
                .and_then(|obj| match obj {
                    Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
                    Object::Dictionary(dict) => Some(dict.clone()),
                    _ => None,
                })
                .unwrap_or_else(Dictionary::new);
            (inherited, Location::Inline)
        }
    };

    if !resources.fonts.is_empty() {
        let (mut fonts, location) = take_sub_dictionary(doc, &res_dict, b"Font");
        for (name, font) in &resources.fonts {
            if !fonts.has(name.as_bytes()) {
                fonts.set(name.as_str(), Object::Dictionary(font_dictionary(font.base_font())));
            }
        }
        write_dictionary(doc, location, &mut res_dict, "Font", fonts)?;
    }

    if !resources.ext_g_states.is_empty() {
        let (mut states, location) = take_sub_dictionary(doc, &res_dict, b"ExtGState");
        for (name, alpha) in &resources.ext_g_states {
            if !states.has(name.as_bytes()) {
                states.set(name.as_str(), Object::Dictionary(alpha_dictionary(*alpha)));
            }
        }
        write_dictionary(doc, location, &mut res_dict, "ExtGState", states)?;
    }

    match res_location {
        Location::Indirect(id) => {
            *doc.get_object_mut(id).map_err(|e| {
                MarkupError::OperationError(format!("Failed to update resources: {}", e))
            })? = Object::Dictionary(res_dict);
        }
        Location::Inline => {
            page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(res_dict));
        }
    }
    Ok(())
}
