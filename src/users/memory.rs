use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{Image, NewImage, NewUser, ProfileUpdate, User};

#[derive(Default)]
struct Inner {
    users: HashMap<String, (User, Vec<Image>)>,
    uploads: Vec<Image>,
}

/// In-process store used by handler tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    pub fn upload_count(&self) -> usize {
        self.inner.lock().unwrap().uploads.len()
    }
}

fn materialize(image: &NewImage) -> Image {
    let now = OffsetDateTime::now_utc();
    Image {
        id: Uuid::new_v4(),
        url: image.url.clone(),
        public_id: image.public_id.clone(),
        plant_type: image.plant_type.clone(),
        analysis: image.analysis.clone(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(&user.username) {
            return Err(StoreError::Conflict("username".into()));
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            password_hash: user.password_hash,
            display_name: user.display_name,
            profile_picture: user.profile_picture,
            email: user.email,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        inner
            .users
            .insert(user.username, (created.clone(), Vec::new()));
        Ok(created)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(username).map(|(u, _)| u.clone()))
    }

    async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((user, _)) = inner.users.get_mut(username) else {
            return Ok(None);
        };
        user.display_name = update.display_name;
        if let Some(pic) = update.profile_picture {
            user.profile_picture = pic;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn record_upload(&self, image: &NewImage) -> Result<Image, StoreError> {
        let stored = materialize(image);
        self.inner.lock().unwrap().uploads.push(stored.clone());
        Ok(stored)
    }

    async fn push_post(
        &self,
        username: &str,
        image: &NewImage,
    ) -> Result<Option<Image>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((_, posts)) = inner.users.get_mut(username) else {
            return Ok(None);
        };
        let stored = materialize(image);
        posts.push(stored.clone());
        Ok(Some(stored))
    }

    async fn list_posts(&self, username: &str) -> Result<Option<Vec<Image>>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(username).map(|(_, posts)| posts.clone()))
    }

    async fn rename_post(
        &self,
        username: &str,
        image_id: Uuid,
        plant_type: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((_, posts)) = inner.users.get_mut(username) else {
            return Ok(false);
        };
        match posts.iter_mut().find(|p| p.id == image_id) {
            Some(post) => {
                post.plant_type = plant_type.to_string();
                post.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pull_post(&self, username: &str, public_id: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((_, posts)) = inner.users.get_mut(username) else {
            return Ok(0);
        };
        let before = posts.len();
        posts.retain(|p| p.public_id != public_id);
        Ok((before - posts.len()) as u64)
    }
}
