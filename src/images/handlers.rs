use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{AnalyzeResponse, UploadResponse};
use super::multipart::collect;
use super::services::{store_image, upload_for_user, MAX_UPLOAD_BYTES, STORED_MIME, UPLOAD_TRANSFORM};
use crate::{auth::extractors::SessionUser, error::AppError, state::AppState};

const NOT_AN_IMAGE: &str = "Not an image! Please upload an image";
const NO_FILE: &str = "No image file uploaded";

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route("/upload1", post(upload))
        .route("/analyze", post(analyze))
        // headroom for multipart framing on top of the file limit
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 2 * 1024 * 1024))
}

/// POST /upload1 (multipart)
/// Fields: image (file), plantType and analysis (optional text)
#[instrument(skip(state, identity, mp), fields(username = %identity.username))]
pub async fn upload(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let form = collect(&mut mp, "image").await?;
    let plant_type = form.text("plantType");
    let analysis = form.fields.get("analysis").cloned();
    let item = form.file.ok_or_else(|| AppError::validation(NO_FILE))?;

    let uploaded = upload_for_user(&state, &identity.username, item, plant_type, analysis).await?;
    info!(public_id = %uploaded.public_id, "post added");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Image uploaded successfully!",
            data: uploaded,
        }),
    ))
}

/// POST /analyze (multipart)
/// Stores the image, then asks the model about it. Nothing is persisted.
#[instrument(skip(state, mp))]
pub async fn analyze(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let form = collect(&mut mp, "image").await?;
    let item = form.file.ok_or_else(|| AppError::validation(NO_FILE))?;

    let stored = store_image(state.storage.as_ref(), item, UPLOAD_TRANSFORM, NOT_AN_IMAGE)
        .await
        .map_err(|e| match e {
            AppError::Upstream { source, .. } => {
                AppError::upstream("An error occurred while analyzing the image", source)
            }
            other => other,
        })?;

    let result = state.analyzer.analyze(&stored.url, STORED_MIME).await?;
    info!(image = %stored.url, chars = result.len(), "analysis completed");

    Ok(Json(AnalyzeResponse {
        result,
        image: stored.url,
    }))
}
