use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use tracing::warn;

use super::services::UploadItem;
use crate::error::AppError;

/// Parsed multipart body: at most one file part plus the text fields.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub file: Option<UploadItem>,
    pub fields: HashMap<String, String>,
}

impl MultipartForm {
    /// Text field with surrounding whitespace removed; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn map_multipart_err(e: MultipartError) -> AppError {
    warn!(error = %e, "multipart read failed");
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File too large".into())
    } else {
        AppError::validation(e.body_text())
    }
}

/// Drains the body, keeping the part named `file_field` as the upload.
/// A file input left empty by the browser is treated as no file.
pub async fn collect(mp: &mut Multipart, file_field: &str) -> Result<MultipartForm, AppError> {
    let mut form = MultipartForm::default();
    while let Some(field) = mp.next_field().await.map_err(map_multipart_err)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == file_field {
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = field.bytes().await.map_err(map_multipart_err)?;
            if body.is_empty() {
                continue;
            }
            form.file = Some(UploadItem { body, content_type });
        } else {
            let value = field.text().await.map_err(map_multipart_err)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}
