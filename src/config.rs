use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL under which stored objects are publicly readable.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub gemini: GeminiConfig,
    pub http_timeout_secs: u64,
    pub db_connect_retries: u32,
    pub db_connect_interval_secs: u64,
    pub static_dir: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET")?,
            issuer: env_or("SESSION_ISSUER", "plantscan"),
            audience: env_or("SESSION_AUDIENCE", "plantscan-users"),
            // three days
            ttl_minutes: env_parse("SESSION_TTL_MINUTES", 3 * 24 * 60),
            cookie_secure: env_parse("SESSION_COOKIE_SECURE", false),
        };
        let storage = StorageConfig {
            endpoint: env_or("S3_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("S3_BUCKET", "plantscan"),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: env_or("S3_REGION", "us-east-1"),
            public_url: env_or("STORAGE_PUBLIC_URL", "http://localhost:9000/plantscan"),
        };
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY")?,
            model: env_or("GEMINI_MODEL", "gemini-2.0-flash"),
            endpoint: env_or(
                "GEMINI_ENDPOINT",
                "https://generativelanguage.googleapis.com",
            ),
        };
        Ok(Self {
            database_url,
            session,
            storage,
            gemini,
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 60),
            db_connect_retries: env_parse("DB_CONNECT_RETRIES", 5),
            db_connect_interval_secs: env_parse("DB_CONNECT_INTERVAL_SECS", 5),
            static_dir: env_or("STATIC_DIR", "public"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
