use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::{imageops::FilterType, ImageOutputFormat};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageClient;
use crate::users::repo_types::{Image, NewImage};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_PROFILE_PICTURE_BYTES: usize = 5 * 1024 * 1024;

/// Fixed crop applied to every stored image.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub folder: &'static str,
    pub prefix: &'static str,
    pub width: u32,
    pub height: u32,
    pub max_bytes: usize,
}

pub const UPLOAD_TRANSFORM: Transform = Transform {
    folder: "images-folder",
    prefix: "image",
    width: 800,
    height: 600,
    max_bytes: MAX_UPLOAD_BYTES,
};

pub const PROFILE_TRANSFORM: Transform = Transform {
    folder: "profile_pictures",
    prefix: "profilePicture",
    width: 250,
    height: 250,
    max_bytes: MAX_PROFILE_PICTURE_BYTES,
};

/// Stored images are always re-encoded to PNG.
pub const STORED_MIME: &str = "image/png";

/// A file part taken from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub public_id: String,
}

/// Rejects anything that is not declared as an image or is over the limit.
/// Runs before any bytes leave the process.
pub fn validate_upload(item: &UploadItem, t: &Transform, not_image_msg: &str) -> Result<(), AppError> {
    if !item.content_type.starts_with("image/") {
        return Err(AppError::validation(not_image_msg));
    }
    if item.body.len() > t.max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File too large: limit is {} MB",
            t.max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Resize and center-crop to fill the box, then encode as PNG.
pub fn fill_to_png(raw: &[u8], width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let decoded = image::load_from_memory(raw).context("decode image")?;
    let filled = decoded.resize_to_fill(width, height, FilterType::Triangle);
    let mut out = Vec::new();
    filled
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .context("encode png")?;
    Ok(out)
}

fn object_key(t: &Transform) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let short = Uuid::new_v4().simple().to_string();
    format!("{}/{}_{}_{}.png", t.folder, t.prefix, millis, &short[..8])
}

/// Validate, transform and hand the image to object storage. Single attempt.
#[instrument(skip(storage, item), fields(bytes = item.body.len()))]
pub async fn store_image(
    storage: &dyn StorageClient,
    item: UploadItem,
    t: Transform,
    not_image_msg: &str,
) -> Result<StoredObject, AppError> {
    validate_upload(&item, &t, not_image_msg)?;

    let raw = item.body;
    let png = tokio::task::spawn_blocking(move || fill_to_png(&raw, t.width, t.height))
        .await
        .map_err(|e| AppError::upstream("Error uploading image", e))?
        .map_err(|e| AppError::validation(format!("Unreadable image: {e:#}")))?;

    let key = object_key(&t);
    storage
        .put_object(&key, Bytes::from(png), STORED_MIME)
        .await
        .map_err(|e| AppError::upstream("Error uploading image", e))?;

    let url = storage.public_url(&key);
    info!(public_id = %key, %url, "image stored");
    Ok(StoredObject {
        url,
        public_id: key,
    })
}

/// Store an upload and append it to the user's posts.
///
/// The user is resolved first so nothing is stored for a missing account.
/// Returns the standalone upload record.
pub async fn upload_for_user(
    st: &AppState,
    username: &str,
    item: UploadItem,
    plant_type: Option<String>,
    analysis: Option<String>,
) -> Result<Image, AppError> {
    st.store
        .find_by_username(username)
        .await
        .map_err(|e| AppError::store("Error uploading image", e))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let stored = store_image(
        st.storage.as_ref(),
        item,
        UPLOAD_TRANSFORM,
        "Not an image! Please upload an image",
    )
    .await?;

    let mut record = NewImage::new(stored.url, stored.public_id);
    if let Some(p) = plant_type.filter(|p| !p.trim().is_empty()) {
        record.plant_type = p.trim().to_string();
    }
    if let Some(a) = analysis {
        record.analysis = a;
    }

    let uploaded = st
        .store
        .record_upload(&record)
        .await
        .map_err(|e| AppError::store("Error uploading image", e))?;

    st.store
        .push_post(username, &record)
        .await
        .map_err(|e| AppError::store("Error uploading image", e))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(uploaded)
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([34, 139, 34]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .unwrap();
    out
}
