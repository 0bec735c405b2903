use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{GeminiAnalyzer, PlantAnalyzer};
use crate::config::AppConfig;
use crate::db;
use crate::storage::{Storage, StorageClient};
use crate::users::repo::{PgStore, UserStore};

/// Everything a handler may talk to. Built once at startup and cloned per
/// request; nothing here is mutable shared state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub storage: Arc<dyn StorageClient>,
    pub analyzer: Arc<dyn PlantAnalyzer>,
    pub http: reqwest::Client,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect_with_retry(
            &config.database_url,
            config.db_connect_retries,
            Duration::from_secs(config.db_connect_interval_secs),
        )
        .await?;
        db::run_migrations(&pool).await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let analyzer =
            Arc::new(GeminiAnalyzer::new(http.clone(), &config.gemini)) as Arc<dyn PlantAnalyzer>;

        Ok(Self::from_parts(
            config,
            Arc::new(PgStore::new(pool)),
            storage,
            analyzer,
            http,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
        analyzer: Arc<dyn PlantAnalyzer>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            analyzer,
            http,
        }
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
    }
}
