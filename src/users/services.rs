use std::collections::HashSet;

use tracing::{info, instrument, warn};

use super::dto::UserStats;
use super::repo_types::{Image, ProfileUpdate, User, DEFAULT_PLANT_TYPE};
use crate::error::AppError;
use crate::images::services::{store_image, UploadItem, PROFILE_TRANSFORM};
use crate::state::AppState;

/// Counts, last scan time and distinct labels of a post list.
/// A blank label counts as the default one.
pub fn compute_stats(posts: &[Image]) -> UserStats {
    let unique: HashSet<&str> = posts
        .iter()
        .map(|p| match p.plant_type.trim() {
            "" => DEFAULT_PLANT_TYPE,
            t => t,
        })
        .collect();
    UserStats {
        total_scans: posts.len(),
        last_scan: posts.last().map(|p| p.created_at),
        unique_plant_types: unique.len(),
    }
}

pub fn validate_display_name(raw: Option<&str>) -> Result<String, AppError> {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.chars().count() < 2 {
        return Err(AppError::validation(
            "Display name must be at least 2 characters long",
        ));
    }
    Ok(name.to_string())
}

/// Removes the remote object, then the caller's matching post.
///
/// Only objects referenced by one of the caller's own posts are touched.
/// The remote delete is attempted once; if it fails the post is still
/// pulled and the orphaned object is only logged.
#[instrument(skip(st))]
pub async fn delete_image(st: &AppState, username: &str, public_id: &str) -> Result<u64, AppError> {
    let posts = st
        .store
        .list_posts(username)
        .await
        .map_err(|e| AppError::store("Failed to delete image", e))?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    if !posts.iter().any(|p| p.public_id == public_id) {
        return Err(AppError::not_found("Image not found"));
    }

    if let Err(e) = st.storage.delete_object(public_id).await {
        warn!(error = ?e, %public_id, "remote delete failed; pulling local record anyway");
    }
    let removed = st
        .store
        .pull_post(username, public_id)
        .await
        .map_err(|e| AppError::store("Failed to delete image", e))?;
    info!(removed, "post pulled");
    Ok(removed)
}

/// Applies a display name change and, when given, a new profile picture.
pub async fn update_profile(
    st: &AppState,
    username: &str,
    display_name: Option<&str>,
    picture: Option<UploadItem>,
) -> Result<User, AppError> {
    let display_name = validate_display_name(display_name)?;

    let profile_picture = match picture {
        Some(item) => {
            let stored = store_image(
                st.storage.as_ref(),
                item,
                PROFILE_TRANSFORM,
                "Only image files are allowed",
            )
            .await
            .map_err(|e| match e {
                AppError::Upstream { source, .. } => {
                    AppError::upstream("Error uploading profile picture", source)
                }
                other => other,
            })?;
            Some(stored.url)
        }
        None => None,
    };

    let updated = st
        .store
        .update_profile(
            username,
            ProfileUpdate {
                display_name,
                profile_picture,
            },
        )
        .await
        .map_err(|e| AppError::store("Error updating profile", e))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!(%username, display_name = %updated.display_name, "profile updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::services::png_fixture;
    use crate::state::fakes::TestEnv;
    use crate::users::repo_types::NewImage;
    use bytes::Bytes;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn post(plant_type: &str) -> Image {
        let now = OffsetDateTime::now_utc();
        Image {
            id: Uuid::new_v4(),
            url: "https://fake.local/x.png".into(),
            public_id: "images-folder/x.png".into(),
            plant_type: plant_type.into(),
            analysis: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stats_for_empty_history() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total_scans, 0);
        assert_eq!(stats.last_scan, None);
        assert_eq!(stats.unique_plant_types, 0);
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["lastScan"].is_null());
    }

    #[test]
    fn stats_count_distinct_labels() {
        let posts = vec![post("Fern"), post("Fern"), post(""), post("Cactus"), post("Unknown")];
        let stats = compute_stats(&posts);
        assert_eq!(stats.total_scans, 5);
        assert_eq!(stats.unique_plant_types, 3);
        assert_eq!(stats.last_scan, Some(posts[4].created_at));
    }

    #[test]
    fn blank_label_counts_as_unknown() {
        let stats = compute_stats(&[post(""), post("Fern")]);
        assert_eq!(stats.unique_plant_types, 2);
        let stats = compute_stats(&[post(" "), post("Unknown")]);
        assert_eq!(stats.unique_plant_types, 1);
    }

    #[test]
    fn display_name_needs_two_characters() {
        assert!(validate_display_name(None).is_err());
        assert!(validate_display_name(Some("  a ")).is_err());
        assert_eq!(validate_display_name(Some(" Al ")).unwrap(), "Al");
    }

    async fn seed_post(env: &TestEnv, public_id: &str) {
        env.state
            .store
            .push_post(
                "alice",
                &NewImage::new(format!("https://fake.local/{public_id}"), public_id.into()),
            )
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn delete_removes_exactly_the_matching_post() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        seed_post(&env, "images-folder/a.png").await;
        seed_post(&env, "images-folder/b.png").await;

        let removed = delete_image(&env.state, "alice", "images-folder/a.png").await.unwrap();
        assert_eq!(removed, 1);
        let posts = env.state.store.list_posts("alice").await.unwrap().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].public_id, "images-folder/b.png");
        assert_eq!(env.storage.deletes(), vec!["images-folder/a.png".to_string()]);
    }

    #[tokio::test]
    async fn delete_pulls_post_even_when_remote_delete_fails() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        seed_post(&env, "images-folder/a.png").await;
        env.storage.fail_deletes(true);

        let removed = delete_image(&env.state, "alice", "images-folder/a.png").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(env.storage.deletes().len(), 1);
        assert!(env.state.store.list_posts("alice").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_leaves_other_users_alone() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        env.seed_user("bob", "secret123").await;
        seed_post(&env, "images-folder/a.png").await;

        let err = delete_image(&env.state, "bob", "images-folder/a.png").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Image not found"));
        assert!(env.storage.deletes().is_empty());
        assert_eq!(env.state.store.list_posts("alice").await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_touches_nothing() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        seed_post(&env, "images-folder/a.png").await;

        let err = delete_image(&env.state, "alice", "images-folder/zzz.png").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(env.storage.deletes().is_empty());
        assert_eq!(env.state.store.list_posts("alice").await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn profile_update_with_picture_stores_square_avatar() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        let item = UploadItem {
            body: Bytes::from(png_fixture(3, 3)),
            content_type: "image/png".into(),
        };
        let user = update_profile(&env.state, "alice", Some(" Alice "), Some(item))
            .await
            .unwrap();
        assert_eq!(user.display_name, "Alice");
        assert!(user.profile_picture.contains("profile_pictures/"));
        assert_eq!(env.storage.puts().len(), 1);
    }

    #[tokio::test]
    async fn profile_picture_storage_failure_leaves_profile_untouched() {
        let env = TestEnv::new();
        env.seed_user("alice", "secret123").await;
        env.storage.fail_puts(true);
        let item = UploadItem {
            body: Bytes::from(png_fixture(3, 3)),
            content_type: "image/png".into(),
        };
        let err = update_profile(&env.state, "alice", Some("Alice"), Some(item))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error uploading profile picture");
        let user = env.state.store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.display_name, "alice");
    }
}
