//! API handlers for the markup server
//!
//! Provides REST endpoints for:
//! - Saving canvas markups into a stored PDF
//! - Listing the annotations a document already carries

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use markup_core::{apply_markups, describe_annotations, DocumentAnnotations, SaveRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::AppState;

pub const MARKUPS_DRAWN: HeaderName = HeaderName::from_static("x-markups-drawn");
pub const MARKUPS_SKIPPED: HeaderName = HeaderName::from_static("x-markups-skipped");
pub const ANNOTATIONS_REMOVED: HeaderName = HeaderName::from_static("x-annotations-removed");
pub const SAVED_AS: HeaderName = HeaderName::from_static("x-saved-as");

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "markup-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Save request body: the core request plus server-side options
#[derive(Deserialize)]
pub struct SaveApiRequest {
    #[serde(flatten)]
    pub request: SaveRequest,

    /// Also write the result next to the source document
    #[serde(default)]
    pub persist: bool,
}

/// Handler: POST /api/markups/save
///
/// Responds with the modified PDF. Counts from the save report travel in
/// `X-Markups-*` / `X-Annotations-Removed` headers.
pub async fn handle_save_markups(
    State(state): State<AppState>,
    payload: Result<Json<SaveApiRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(body) = payload?;
    let request = body.request.validate()?;
    info!(
        "Save request: target={}, markups={}, removals={}, flatten={}",
        request.target_filename,
        request.markups.len(),
        request.removals.len(),
        request.flatten
    );

    let source = state.store.read(&request.target_filename).await?;
    let target = request.target_filename.clone();
    let outcome = tokio::task::spawn_blocking(move || apply_markups(&source, &request)).await??;

    for skipped in &outcome.report.skipped {
        debug!("Skipped markup #{}: {}", skipped.index, skipped.reason);
    }

    let saved_as = if body.persist {
        Some(
            state
                .store
                .write_beside(&target, &outcome.filename, &outcome.bytes)
                .await?,
        )
    } else {
        None
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        outcome.filename.replace('"', "_")
    );
    let mut headers = vec![
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (header::CONTENT_DISPOSITION, disposition),
        (MARKUPS_DRAWN, outcome.report.drawn.to_string()),
        (MARKUPS_SKIPPED, outcome.report.skipped.len().to_string()),
        (
            ANNOTATIONS_REMOVED,
            outcome.report.annotations_removed().to_string(),
        ),
    ];
    if let Some(saved_as) = saved_as {
        headers.push((SAVED_AS, saved_as));
    }

    let mut response = outcome.bytes.into_response();
    for (name, value) in headers {
        let value = value
            .parse()
            .map_err(|_| ServerError::Internal(format!("Invalid header value for {}", name)))?;
        response.headers_mut().insert(name, value);
    }
    Ok(response)
}

/// Annotation listing response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationListResponse {
    pub success: bool,
    pub document: String,
    #[serde(flatten)]
    pub annotations: DocumentAnnotations,
}

/// Handler: GET /api/annotations/*name
pub async fn handle_list_annotations(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AnnotationListResponse>, ServerError> {
    let name = name.trim_start_matches('/').to_string();
    let bytes = state.store.read(&name).await?;
    let annotations = tokio::task::spawn_blocking(move || describe_annotations(&bytes)).await??;

    info!(
        "Listed {} annotation(s) in {}",
        annotations.annotations.len(),
        name
    );
    Ok(Json(AnnotationListResponse {
        success: true,
        document: name,
        annotations,
    }))
}
