use serde::Serialize;

use crate::users::repo_types::Image;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub data: Image,
}

/// Analysis text plus the stored image it was computed from.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub result: String,
    pub image: String,
}
