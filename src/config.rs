//! Application configuration loaded from environment variables.
//!
//! Tracking limits and worker pool sizing live in [`TrackingConfig`] so the
//! services can be constructed without the HTTP-specific settings.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which persistence backend the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local store (development and tests).
    Memory,
    /// Google Cloud Firestore.
    Firestore,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "firestore" => Ok(StorageBackend::Firestore),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Persistence backend
    pub storage: StorageBackend,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,
    /// Ingestion and retention settings
    pub tracking: TrackingConfig,
}

/// Ingestion, worker pool and retention settings.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Number of concurrent upload workers
    pub worker_count: usize,
    /// Bounded upload queue capacity
    pub queue_capacity: usize,
    /// Retries allowed per upload task before it is dropped
    pub retry_limit: u32,
    /// Base retry delay; attempt `n` waits `n * retry_base_delay`
    pub retry_base_delay: Duration,
    /// Points persisted per transaction
    pub sub_batch_size: usize,
    /// Maximum points accepted by a single batch request
    pub max_batch_points: usize,
    /// Maximum trajectories a user may own
    pub max_trajectories_per_user: u64,
    /// Maximum points stored per trajectory
    pub max_points_per_trajectory: u64,
    /// Age after which points and empty trajectories are removed
    pub retention_days: u32,
    /// How often the retention job runs
    pub cleanup_interval: Duration,
    /// Pending aggregation requests before new ones are dropped
    pub aggregation_queue_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_capacity: 1000,
            retry_limit: 3,
            retry_base_delay: Duration::from_secs(5),
            sub_batch_size: 100,
            max_batch_points: 1000,
            max_trajectories_per_user: 1000,
            max_points_per_trajectory: 100_000,
            retention_days: 365,
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            aggregation_queue_capacity: 1024,
        }
    }
}

impl TrackingConfig {
    /// Load tracking settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            worker_count: parse_env("UPLOAD_WORKERS", defaults.worker_count)?,
            queue_capacity: parse_env("UPLOAD_QUEUE_CAPACITY", defaults.queue_capacity)?,
            retry_limit: parse_env("UPLOAD_RETRY_LIMIT", defaults.retry_limit)?,
            retry_base_delay: Duration::from_millis(parse_env(
                "UPLOAD_RETRY_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            sub_batch_size: parse_env("UPLOAD_SUB_BATCH_SIZE", defaults.sub_batch_size)?,
            max_batch_points: parse_env("MAX_BATCH_POINTS", defaults.max_batch_points)?,
            max_trajectories_per_user: parse_env(
                "MAX_TRAJECTORIES_PER_USER",
                defaults.max_trajectories_per_user,
            )?,
            max_points_per_trajectory: parse_env(
                "MAX_POINTS_PER_TRAJECTORY",
                defaults.max_points_per_trajectory,
            )?,
            retention_days: parse_env("RETENTION_DAYS", defaults.retention_days)?,
            cleanup_interval: Duration::from_secs(parse_env(
                "CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval.as_secs(),
            )?),
            aggregation_queue_capacity: parse_env(
                "AGGREGATION_QUEUE_CAPACITY",
                defaults.aggregation_queue_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("UPLOAD_WORKERS", "0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("UPLOAD_QUEUE_CAPACITY", "0".to_string()));
        }
        if self.sub_batch_size == 0 {
            return Err(ConfigError::Invalid("UPLOAD_SUB_BATCH_SIZE", "0".to_string()));
        }
        if self.aggregation_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "AGGREGATION_QUEUE_CAPACITY",
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => StorageBackend::Memory,
        };

        let gcp_project_id = match storage {
            StorageBackend::Firestore => {
                env::var("GCP_PROJECT_ID").map_err(|_| ConfigError::Missing("GCP_PROJECT_ID"))?
            }
            StorageBackend::Memory => {
                env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string())
            }
        };

        Ok(Self {
            port: parse_env("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            storage,
            gcp_project_id,
            tracking: TrackingConfig::from_env()?,
        })
    }

    /// Config for tests: in-memory storage and a fixed signing key.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            storage: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            tracking: TrackingConfig::default(),
        }
    }
}

/// Parse an optional environment variable, using `default` when unset.
fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
