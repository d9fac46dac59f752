//! Configuration module
//!
//! Everything is read from the environment (a `.env` file is honoured) by
//! `Config::from_env` and checked by `Config::validate` before the server
//! starts.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const STORE_CALL_TIMEOUT_MS: u64 = 5000;
const SIGNING_TIMEOUT_MS: u64 = 2000;
const PRESIGNED_URL_EXPIRATION_SECS: u64 = 3600;
const UPLOAD_URL_EXPIRATION_SECS: u64 = 300;
const INDEX_PAGE_SIZE: usize = 100;
const INDEX_BATCH_SIZE: usize = 25;
const HYDRATION_CONCURRENCY: usize = 16;
const DEFAULT_REGION: &str = "us-east-1";

/// Where the tag index and media catalog live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Object storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    // Stores
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Object storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Timeouts and URL lifetimes
    pub store_call_timeout_ms: u64,
    pub signing_timeout_ms: u64,
    pub presigned_url_expiration_secs: u64,
    pub upload_url_expiration_secs: u64,
    // Query and mutation tuning
    pub index_page_size: usize,
    pub index_batch_size: usize,
    pub query_parallel_lookups: bool,
    pub hydration_concurrency: usize,
    // Tag notifications
    pub notify_webhook_url: Option<String>,
    pub notify_webhook_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            store_backend: StoreBackend::Postgres,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: DEFAULT_REGION.to_string(),
            s3_endpoint: None,
            local_storage_path: None,
            local_storage_base_url: None,
            store_call_timeout_ms: STORE_CALL_TIMEOUT_MS,
            signing_timeout_ms: SIGNING_TIMEOUT_MS,
            presigned_url_expiration_secs: PRESIGNED_URL_EXPIRATION_SECS,
            upload_url_expiration_secs: UPLOAD_URL_EXPIRATION_SECS,
            index_page_size: INDEX_PAGE_SIZE,
            index_batch_size: INDEX_BATCH_SIZE,
            query_parallel_lookups: true,
            hydration_concurrency: HYDRATION_CONCURRENCY,
            notify_webhook_url: None,
            notify_webhook_secret: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let store_backend = match env_opt("STORE_BACKEND") {
            Some(value) => value.parse::<StoreBackend>()?,
            None => StoreBackend::Postgres,
        };

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let s3_region = env_opt("S3_REGION")
            .or_else(|| env_opt("AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Config {
            server_port: env_parse("PORT", SERVER_PORT),
            environment,
            cors_origins,
            store_backend,
            database_url: env_opt("DATABASE_URL"),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            storage_backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region,
            s3_endpoint: env_opt("S3_ENDPOINT"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_opt("LOCAL_STORAGE_BASE_URL"),
            store_call_timeout_ms: env_parse("STORE_CALL_TIMEOUT_MS", STORE_CALL_TIMEOUT_MS),
            signing_timeout_ms: env_parse("SIGNING_TIMEOUT_MS", SIGNING_TIMEOUT_MS),
            presigned_url_expiration_secs: env_parse(
                "PRESIGNED_URL_EXPIRATION_SECS",
                PRESIGNED_URL_EXPIRATION_SECS,
            ),
            upload_url_expiration_secs: env_parse(
                "UPLOAD_URL_EXPIRATION_SECS",
                UPLOAD_URL_EXPIRATION_SECS,
            ),
            index_page_size: env_parse("INDEX_PAGE_SIZE", INDEX_PAGE_SIZE),
            index_batch_size: env_parse("INDEX_BATCH_SIZE", INDEX_BATCH_SIZE),
            query_parallel_lookups: env_parse("QUERY_PARALLEL_LOOKUPS", true),
            hydration_concurrency: env_parse("HYDRATION_CONCURRENCY", HYDRATION_CONCURRENCY),
            notify_webhook_url: env_opt("NOTIFY_WEBHOOK_URL"),
            notify_webhook_secret: env_opt("NOTIFY_WEBHOOK_SECRET"),
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.store_backend == StoreBackend::Postgres {
            match self.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when using the postgres store backend"
                    ))
                }
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.index_page_size == 0 || self.index_batch_size == 0 {
            return Err(anyhow::anyhow!(
                "INDEX_PAGE_SIZE and INDEX_BATCH_SIZE must be greater than zero"
            ));
        }

        if self.hydration_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "HYDRATION_CONCURRENCY must be greater than zero"
            ));
        }

        if self.notify_webhook_url.is_some() && self.notify_webhook_secret.is_none() {
            return Err(anyhow::anyhow!(
                "NOTIFY_WEBHOOK_SECRET must be set when NOTIFY_WEBHOOK_URL is configured"
            ));
        }

        Ok(())
    }
}
