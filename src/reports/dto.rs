use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub result: String,
    /// `http(s)` URL or `data:image/...;base64,` URI.
    #[serde(default)]
    pub image: Option<String>,
}
