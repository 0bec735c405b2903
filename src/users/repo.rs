use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Image, NewImage, NewUser, ProfileUpdate, User, UserRow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the field name.
    #[error("{0} already exists")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Credential and content store. Every mutation touches a single user's
/// records and is atomic on its own.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Returns `None` when the user does not exist.
    async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError>;
    /// Standalone upload record, independent of any owner.
    async fn record_upload(&self, image: &NewImage) -> Result<Image, StoreError>;
    /// Appends to the user's posts; `None` when the user does not exist.
    async fn push_post(&self, username: &str, image: &NewImage)
        -> Result<Option<Image>, StoreError>;
    /// Posts in insertion order; `None` when the user does not exist.
    async fn list_posts(&self, username: &str) -> Result<Option<Vec<Image>>, StoreError>;
    /// Sets the label on one of the user's posts. `false` if nothing matched.
    async fn rename_post(
        &self,
        username: &str,
        image_id: Uuid,
        plant_type: &str,
    ) -> Result<bool, StoreError>;
    /// Removes the user's posts with this storage id, returning how many went.
    async fn pull_post(&self, username: &str, public_id: &str) -> Result<u64, StoreError>;
    async fn close(&self) {}
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn user_id(&self, username: &str) -> anyhow::Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE username = $1"#)
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .context("lookup user id")?;
        Ok(id)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash, display_name, profile_picture, email, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, password_hash, display_name, profile_picture, email, role,
                      created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.profile_picture)
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("username".into())
            } else {
                StoreError::Backend(anyhow::Error::new(e).context("insert user"))
            }
        })?;
        Ok(row.into())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, display_name, profile_picture, email, role,
                   created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(row.map(User::from))
    }

    async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
               SET display_name = $2,
                   profile_picture = COALESCE($3, profile_picture),
                   updated_at = now()
             WHERE username = $1
            RETURNING id, username, password_hash, display_name, profile_picture, email, role,
                      created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(&update.display_name)
        .bind(&update.profile_picture) // Option<String> → NULL keeps the old picture
        .fetch_optional(&self.db)
        .await
        .context("update profile")?;
        Ok(row.map(User::from))
    }

    async fn record_upload(&self, image: &NewImage) -> Result<Image, StoreError> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO uploads (id, url, public_id, plant_type, analysis)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, url, public_id, plant_type, analysis, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&image.url)
        .bind(&image.public_id)
        .bind(&image.plant_type)
        .bind(&image.analysis)
        .fetch_one(&self.db)
        .await
        .context("insert upload")?;
        Ok(row)
    }

    async fn push_post(
        &self,
        username: &str,
        image: &NewImage,
    ) -> Result<Option<Image>, StoreError> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO posts (id, user_id, url, public_id, plant_type, analysis)
            SELECT $1, u.id, $2, $3, $4, $5
              FROM users u
             WHERE u.username = $6
            RETURNING id, url, public_id, plant_type, analysis, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&image.url)
        .bind(&image.public_id)
        .bind(&image.plant_type)
        .bind(&image.analysis)
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("push post")?;
        Ok(row)
    }

    async fn list_posts(&self, username: &str) -> Result<Option<Vec<Image>>, StoreError> {
        let Some(user_id) = self.user_id(username).await? else {
            return Ok(None);
        };
        let rows = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, url, public_id, plant_type, analysis, created_at, updated_at
              FROM posts
             WHERE user_id = $1
             ORDER BY seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list posts")?;
        Ok(Some(rows))
    }

    async fn rename_post(
        &self,
        username: &str,
        image_id: Uuid,
        plant_type: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE posts p
               SET plant_type = $3,
                   updated_at = now()
              FROM users u
             WHERE p.user_id = u.id
               AND u.username = $1
               AND p.id = $2
            "#,
        )
        .bind(username)
        .bind(image_id)
        .bind(plant_type)
        .execute(&self.db)
        .await
        .context("rename post")?;
        Ok(res.rows_affected() > 0)
    }

    async fn pull_post(&self, username: &str, public_id: &str) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM posts p
             USING users u
             WHERE p.user_id = u.id
               AND u.username = $1
               AND p.public_id = $2
            "#,
        )
        .bind(username)
        .bind(public_id)
        .execute(&self.db)
        .await
        .context("pull post")?;
        Ok(res.rows_affected())
    }

    async fn close(&self) {
        self.db.close().await;
    }
}
