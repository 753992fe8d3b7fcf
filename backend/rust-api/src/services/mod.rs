use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::middlewares::auth::JwtService;
use crate::store::{MemoryStore, MongoStore, Repositories};
use storage::{FileStorage, LocalFileStorage};

pub mod auth_service;
pub mod comment_service;
pub mod community_service;
pub mod google_oauth;
pub mod quiz_service;
pub mod result_service;
pub mod storage;
pub mod user_service;

pub struct AppState {
    pub config: Config,
    pub repos: Repositories,
    /// Optional: rate limits and login lockout need it
    pub redis: Option<ConnectionManager>,
    pub storage: Arc<dyn FileStorage>,
    pub jwt: Arc<JwtService>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, repos: Repositories, redis: Option<ConnectionManager>) -> Self {
        let storage = Arc::new(LocalFileStorage::new(config.upload_dir.clone()));
        let jwt = Arc::new(JwtService::new(&config.jwt_secret));
        Self {
            config,
            repos,
            redis,
            storage,
            jwt,
            http: reqwest::Client::new(),
        }
    }

    /// Connects the configured store backend and, when configured, Redis
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let repos = match config.store_backend {
            StoreBackend::Mongo => {
                let store = MongoStore::connect(&config.mongo_uri, &config.mongo_database).await?;
                tracing::info!("MongoDB connected");
                Repositories::from_backend(Arc::new(store))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Repositories::from_backend(Arc::new(MemoryStore::new()))
            }
        };

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::info!("REDIS_URI not set; rate limiting and login lockout disabled");
                None
            }
        };

        Ok(Self::new(config, repos, redis))
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");
    let client = redis::Client::open(uri)?;

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
