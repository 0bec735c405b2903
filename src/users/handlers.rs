use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    DeleteImageRequest, ImagesResponse, MessageResponse, ProfileData, ProfileResponse,
    ProfileUpdated, RenameRequest, RenameResponse, UserStats,
};
use super::repo_types::{Image, User};
use super::services::{compute_stats, delete_image, update_profile};
use crate::{
    auth::{dto::SessionIdentity, extractors::SessionUser, session::SessionKeys},
    error::AppError,
    images::{multipart::collect, services::MAX_PROFILE_PICTURE_BYTES},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/my-images", get(my_images))
        .route("/user-stats", get(user_stats))
        .route("/user-profile", get(user_profile))
        .route("/user-profile-data", get(user_profile_data))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/update-plant-name", post(update_plant_name))
        .route("/delete-image", delete(delete_image_handler))
        .route("/update-profile", post(update_profile_handler))
        .layer(DefaultBodyLimit::max(MAX_PROFILE_PICTURE_BYTES + 1024 * 1024))
}

async fn load_user(st: &AppState, username: &str) -> Result<User, AppError> {
    st.store
        .find_by_username(username)
        .await
        .map_err(|e| AppError::store("Error fetching user profile", e))?
        .ok_or_else(|| AppError::not_found("User not found"))
}

async fn load_posts(st: &AppState, username: &str, msg: &str) -> Result<Vec<Image>, AppError> {
    st.store
        .list_posts(username)
        .await
        .map_err(|e| AppError::store(msg, e))?
        .ok_or_else(|| AppError::not_found("User not found"))
}

#[instrument(skip(state, identity), fields(username = %identity.username))]
pub async fn my_images(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
) -> Result<Json<ImagesResponse>, AppError> {
    let images = load_posts(&state, &identity.username, "Error fetching images").await?;
    Ok(Json(ImagesResponse { images }))
}

#[instrument(skip(state, identity), fields(username = %identity.username))]
pub async fn user_stats(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
) -> Result<Json<UserStats>, AppError> {
    let posts = load_posts(&state, &identity.username, "Error fetching user statistics").await?;
    Ok(Json(compute_stats(&posts)))
}

#[instrument(skip(state, identity), fields(username = %identity.username))]
pub async fn user_profile(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = load_user(&state, &identity.username).await?;
    let posts = load_posts(&state, &identity.username, "Error fetching user profile").await?;
    let name = if user.display_name.is_empty() {
        user.username.clone()
    } else {
        user.display_name
    };
    Ok(Json(ProfileResponse {
        username: user.username,
        name,
        email: user.email,
        total_images: posts.len(),
    }))
}

fn profile_data(user: User) -> ProfileData {
    let display_name = if user.display_name.is_empty() {
        user.username.clone()
    } else {
        user.display_name
    };
    ProfileData {
        username: user.username,
        display_name,
        profile_picture: user.profile_picture,
    }
}

#[instrument(skip(state, identity), fields(username = %identity.username))]
pub async fn user_profile_data(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
) -> Result<Json<ProfileData>, AppError> {
    let user = load_user(&state, &identity.username).await?;
    Ok(Json(profile_data(user)))
}

#[instrument(skip(state, identity, req), fields(username = %identity.username))]
pub async fn update_plant_name(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    let new_name = req.new_name.trim();
    if new_name.is_empty() {
        return Err(AppError::validation("Plant name cannot be empty"));
    }
    // a malformed id cannot match any post
    let image_id =
        Uuid::parse_str(req.image_id.trim()).map_err(|_| AppError::not_found("Image not found"))?;

    let renamed = state
        .store
        .rename_post(&identity.username, image_id, new_name)
        .await
        .map_err(|e| AppError::store("Error updating plant name", e))?;
    if !renamed {
        warn!(%image_id, "rename target not found");
        return Err(AppError::not_found("Image not found"));
    }

    info!(%image_id, %new_name, "plant renamed");
    Ok(Json(RenameResponse {
        success: true,
        message: "Plant name updated successfully",
    }))
}

#[instrument(skip(state, identity, req), fields(username = %identity.username))]
pub async fn delete_image_handler(
    State(state): State<AppState>,
    SessionUser(identity): SessionUser,
    Json(req): Json<DeleteImageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_image(&state, &identity.username, &req.public_id).await?;
    Ok(Json(MessageResponse {
        message: "Image deleted successfully",
    }))
}

/// POST /update-profile (multipart)
/// Fields: displayName (text), profilePicture (optional file)
#[instrument(skip(state, jar, identity, mp), fields(username = %identity.username))]
pub async fn update_profile_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    SessionUser(identity): SessionUser,
    mut mp: Multipart,
) -> Result<(CookieJar, Json<ProfileUpdated>), AppError> {
    let form = collect(&mut mp, "profilePicture").await?;
    let display_name = form.fields.get("displayName").map(String::as_str);

    let user = update_profile(&state, &identity.username, display_name, form.file).await?;

    let keys = SessionKeys::from_ref(&state);
    let refreshed = SessionIdentity {
        display_name: user.display_name.clone(),
        ..identity
    };
    let cookie = keys
        .cookie(&refreshed)
        .map_err(|e| AppError::upstream("Error updating profile", e))?;

    Ok((
        jar.add(cookie),
        Json(ProfileUpdated {
            message: "Profile updated successfully",
            user: profile_data(user),
        }),
    ))
}
