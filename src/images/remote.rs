use bytes::Bytes;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("remote host answered {0}")]
    Status(u16),
}

/// Downloads an image by URL. Non-2xx answers are errors.
pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Bytes, FetchError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.bytes().await?;
    debug!(%url, bytes = body.len(), "image fetched");
    Ok(body)
}
