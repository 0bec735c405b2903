use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PROFILE_PICTURE: &str = "/images/default-avatar.jpg";
pub const DEFAULT_PLANT_TYPE: &str = "Unknown";

/// Account role. Anything other than `user`/`admin` read back from storage
/// is kept verbatim in `Other` so the role gate can reject it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Admin,
    Other(String),
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "admin" => Role::Admin,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Other(raw) => raw,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::parse(&s)
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_string()
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub profile_picture: String,
    pub email: Option<String>,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User record in the database. Posts are loaded separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string
    pub display_name: String,
    pub profile_picture: String,
    pub email: Option<String>,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            password_hash: r.password_hash,
            display_name: r.display_name,
            profile_picture: r.profile_picture,
            email: r.email,
            role: Role::parse(&r.role),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub profile_picture: String,
    pub email: Option<String>,
    pub role: Role,
}

impl NewUser {
    /// Fresh account with the defaults applied: display name mirrors the
    /// username, placeholder avatar, default role.
    pub fn with_defaults(username: &str, password_hash: String) -> Self {
        Self {
            username: username.to_string(),
            password_hash,
            display_name: username.to_string(),
            profile_picture: DEFAULT_PROFILE_PICTURE.to_string(),
            email: None,
            role: Role::User,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: String,
    pub profile_picture: Option<String>,
}

/// Uploaded image, either embedded in a user's posts or standalone.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Image {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub url: String,
    pub public_id: String,
    #[serde(rename = "plantType")]
    pub plant_type: String,
    pub analysis: String,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub url: String,
    pub public_id: String,
    pub plant_type: String,
    pub analysis: String,
}

impl NewImage {
    pub fn new(url: String, public_id: String) -> Self {
        Self {
            url,
            public_id,
            plant_type: DEFAULT_PLANT_TYPE.to_string(),
            analysis: String::new(),
        }
    }
}
