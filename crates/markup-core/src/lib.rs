//! Canvas markup compositing for PDF documents
//!
//! Markups drawn over a rendered page (ink, shapes, arrows, text boxes, sticky
//! notes) are burned into the page's content stream with lopdf, and annotation
//! objects the markups replace are pruned from the pages' `/Annots` arrays.
//!
//! The entry point is [`apply_markups`], which takes source PDF bytes and a
//! validated [`SaveRequest`] and returns the new bytes with a [`SaveReport`].

pub mod annotations;
pub mod color;
pub mod compositor;
pub mod content;
pub mod coords;
pub mod error;
pub mod markup;
pub mod save;
pub mod text_layout;

pub use annotations::{
    describe_annotations, list_annotations, prune_document, remove_annotations,
    AnnotationSummary, DocumentAnnotations, PageRemoval, RemovalSet,
};
pub use coords::{CanvasSize, Mapper, PageGeometry, PdfPoint, PdfRect, Point};
pub use error::MarkupError;
pub use markup::{Markup, MarkupKind, MarkupRecord, SkipReason};
pub use save::{
    apply_markups, suggested_filename, SaveOutcome, SaveReport, SaveRequest, SkippedMarkup,
    ValidatedRequest,
};
