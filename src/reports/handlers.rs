use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::dto::DownloadRequest;
use super::pdf::{analysis_report, decode_data_uri, history_report, render, Report, ReportImage};
use crate::{
    auth::extractors::SessionUser, error::AppError, images::remote::fetch_image, state::AppState,
};

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/download", post(download))
        .route("/download-history", get(download_history))
}

fn unix_millis(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000_000
}

fn pdf_headers(filename: &str) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename={filename}"))
        .map_err(|e| AppError::upstream("Error generating PDF", e))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(headers)
}

async fn render_blocking(report: Report, message: &'static str) -> Result<Bytes, AppError> {
    let bytes = tokio::task::spawn_blocking(move || render(&report))
        .await
        .map_err(|e| AppError::upstream(message, e))?
        .map_err(|e| AppError::upstream(message, e))?;
    Ok(Bytes::from(bytes))
}

/// Obtains the referenced image. Failures degrade to `Unavailable`.
async fn resolve_image(http: &reqwest::Client, reference: Option<&str>) -> ReportImage {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return ReportImage::None;
    };
    if reference.starts_with("http") {
        match fetch_image(http, reference).await {
            Ok(body) => ReportImage::Bytes(body),
            Err(e) => {
                warn!(error = %e, url = %reference, "report image fetch failed");
                ReportImage::Unavailable
            }
        }
    } else if reference.starts_with("data:image") {
        match decode_data_uri(reference) {
            Some(raw) => ReportImage::Bytes(Bytes::from(raw)),
            None => {
                warn!("report image data uri malformed");
                ReportImage::Unavailable
            }
        }
    } else {
        ReportImage::None
    }
}

/// POST /download { result, image? }
#[instrument(skip(state, req))]
pub async fn download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<(HeaderMap, Bytes), AppError> {
    let now = OffsetDateTime::now_utc();
    let image = resolve_image(&state.http, req.image.as_deref()).await;
    let report = analysis_report(&req.result, now, image);
    let with_image = report.has_image();

    let body = render_blocking(report, "An error occurred while generating the PDF report").await?;
    info!(bytes = body.len(), with_image, "analysis report generated");
    let headers = pdf_headers(&format!("plant_analysis_report_{}.pdf", unix_millis(now)))?;
    Ok((headers, body))
}

/// GET /download-history
#[instrument(skip(state, identity), fields(username = %identity.username))]
pub async fn download_history(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
) -> Result<(HeaderMap, Bytes), AppError> {
    let posts = state
        .store
        .list_posts(&identity.username)
        .await
        .map_err(|e| AppError::store("Error generating history", e))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let now = OffsetDateTime::now_utc();
    let report = history_report(&identity.username, &posts, now);
    let body = render_blocking(report, "Error generating history").await?;
    info!(scans = posts.len(), bytes = body.len(), "history report generated");
    let headers = pdf_headers(&format!("plant_analysis_history_{}.pdf", unix_millis(now)))?;
    Ok((headers, body))
}
