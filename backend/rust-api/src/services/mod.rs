use crate::config::Config;
use crate::models::user::{Caller, UserRole};
use crate::store::{LmsStore, MemoryStore, MongoStore, StoreError};
use mongodb::bson::oid::ObjectId;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn LmsStore>,
    /// Only the rate limiter uses Redis; `None` disables it.
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: Option<redis::Client>,
    ) -> anyhow::Result<Self> {
        let mongo = MongoStore::new(mongo_client.database(&config.mongo_database));
        mongo.ensure_indexes().await?;

        let redis = match redis_client {
            Some(client) => Some(connect_redis(client).await?),
            None => {
                tracing::warn!("Redis is not configured; rate limiting is disabled");
                None
            }
        };

        Ok(Self {
            config,
            store: Arc::new(mongo),
            redis,
        })
    }

    /// State backed by [`MemoryStore`] and without Redis.
    pub fn in_memory(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            redis: None,
        }
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

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

/// Field name to the messages reported for it.
pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// A validation failure on a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("Invalid value ({})", err.code))
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        Self::Validation(fields)
    }
}

/// Ids in paths are user input; anything unparsable is treated as missing.
pub fn parse_id(raw: &str, what: &str) -> ServiceResult<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| ServiceError::not_found(format!("{} not found", what)))
}

pub fn require_role(caller: &Caller, role: UserRole, message: &str) -> ServiceResult<()> {
    if caller.role == role {
        Ok(())
    } else {
        Err(ServiceError::forbidden(message))
    }
}

/// Rounds to one decimal place, half to even.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

pub mod account_service;
pub mod auth_service;
pub mod course_service;
pub mod lesson_service;
pub mod progress_service;
pub mod quiz_service;
pub mod site_service;
