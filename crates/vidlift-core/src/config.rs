//! Configuration module
//!
//! Environment-driven configuration for the coordinator, the storage backends and the
//! transfer defaults. Values are read once at startup (`.env` files are honoured via
//! dotenvy) and validated per storage backend.

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MAX_PART_SIZE,
    DEFAULT_PRESIGN_EXPIRY_SECS, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
    DEFAULT_SESSION_TTL_SECS, MAX_PART_COUNT,
};
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 4000;
const MIN_SIGNING_SECRET_LEN: usize = 32;

/// Base configuration shared by the API and the CLI
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
}

/// Storage and transfer settings
#[derive(Clone, Debug)]
pub struct TransferSettings {
    pub base: BaseConfig,
    // Storage configuration
    pub storage_backend: StorageBackend,
    /// Additional backends that may hold copies of objects (listing and delete fan out to them)
    pub mirror_backends: Vec<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    /// Externally reachable base URL of the API, used to build signed URLs for local/memory storage
    pub public_base_url: String,
    pub url_signing_secret: Option<String>,
    // Transfer defaults
    pub chunk_size_bytes: u64,
    pub concurrency_limit: usize,
    pub max_part_count: u32,
    pub max_part_size_bytes: u64,
    // Session table bounds
    pub session_capacity: usize,
    pub session_ttl_secs: u64,
    /// Interval between background sweeps of expired sessions. 0 = disabled.
    pub session_sweep_interval_secs: u64,
    pub presign_expiry_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings {
            base: BaseConfig {
                server_port: SERVER_PORT,
                environment: "development".to_string(),
            },
            storage_backend: StorageBackend::Memory,
            mirror_backends: Vec::new(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: None,
            public_base_url: format!("http://localhost:{}", SERVER_PORT),
            url_signing_secret: None,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            max_part_count: MAX_PART_COUNT,
            max_part_size_bytes: DEFAULT_MAX_PART_SIZE,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            session_sweep_interval_secs: DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
            presign_expiry_secs: DEFAULT_PRESIGN_EXPIRY_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<TransferSettings>);

impl Config {
    fn as_settings(&self) -> &TransferSettings {
        &self.0
    }

    pub fn new(settings: TransferSettings) -> Self {
        Config(Box::new(settings))
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_settings().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let settings = TransferSettings::from_env()?;
        Ok(Config(Box::new(settings)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_settings().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_settings().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.as_settings().base.environment
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_settings().storage_backend
    }

    pub fn mirror_backends(&self) -> &[StorageBackend] {
        &self.as_settings().mirror_backends
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_settings().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_settings().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_settings().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_settings().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_settings().local_storage_path.as_deref()
    }

    pub fn public_base_url(&self) -> &str {
        &self.as_settings().public_base_url
    }

    pub fn url_signing_secret(&self) -> Option<&str> {
        self.as_settings().url_signing_secret.as_deref()
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.as_settings().chunk_size_bytes
    }

    pub fn concurrency_limit(&self) -> usize {
        self.as_settings().concurrency_limit
    }

    pub fn max_part_count(&self) -> u32 {
        self.as_settings().max_part_count
    }

    pub fn max_part_size_bytes(&self) -> u64 {
        self.as_settings().max_part_size_bytes
    }

    pub fn session_capacity(&self) -> usize {
        self.as_settings().session_capacity
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.as_settings().session_ttl_secs)
    }

    pub fn session_sweep_interval_secs(&self) -> u64 {
        self.as_settings().session_sweep_interval_secs
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.as_settings().presign_expiry_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl TransferSettings {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| SERVER_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let mirror_backends = env_opt("MIRROR_BACKENDS")
            .map(|value| {
                value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(str::parse::<StorageBackend>)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let public_base_url = env_opt("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", server_port));

        let settings = TransferSettings {
            base: BaseConfig {
                server_port,
                environment,
            },
            storage_backend,
            mirror_backends,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            aws_region: env_opt("AWS_REGION"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            public_base_url,
            url_signing_secret: env_opt("URL_SIGNING_SECRET"),
            chunk_size_bytes: env_or("CHUNK_SIZE_BYTES", DEFAULT_CHUNK_SIZE),
            concurrency_limit: env_or("TRANSFER_CONCURRENCY", DEFAULT_CONCURRENCY_LIMIT),
            max_part_count: env_or("MAX_PART_COUNT", MAX_PART_COUNT),
            max_part_size_bytes: env_or("MAX_PART_SIZE_BYTES", DEFAULT_MAX_PART_SIZE),
            session_capacity: env_or("SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY),
            session_ttl_secs: env_or("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
            session_sweep_interval_secs: env_or(
                "SESSION_SWEEP_INTERVAL_SECS",
                DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
            ),
            presign_expiry_secs: env_or("PRESIGN_EXPIRY_SECS", DEFAULT_PRESIGN_EXPIRY_SECS),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if self.chunk_size_bytes > self.max_part_size_bytes {
            return Err(anyhow::anyhow!(
                "CHUNK_SIZE_BYTES ({}) exceeds MAX_PART_SIZE_BYTES ({})",
                self.chunk_size_bytes,
                self.max_part_size_bytes
            ));
        }

        if self.concurrency_limit == 0 {
            return Err(anyhow::anyhow!("TRANSFER_CONCURRENCY must be greater than 0"));
        }

        if self.max_part_count == 0 || self.max_part_count > MAX_PART_COUNT {
            return Err(anyhow::anyhow!(
                "MAX_PART_COUNT must be between 1 and {}",
                MAX_PART_COUNT
            ));
        }

        if self.session_capacity == 0 {
            return Err(anyhow::anyhow!("SESSION_CAPACITY must be greater than 0"));
        }

        if self.session_ttl_secs == 0 {
            return Err(anyhow::anyhow!("SESSION_TTL_SECS must be greater than 0"));
        }

        if self.mirror_backends.contains(&self.storage_backend) {
            return Err(anyhow::anyhow!(
                "MIRROR_BACKENDS must not contain the primary backend ({})",
                self.storage_backend
            ));
        }

        let mut backends = vec![self.storage_backend];
        backends.extend(self.mirror_backends.iter().copied());

        for backend in backends {
            match backend {
                StorageBackend::S3 => {
                    if self.s3_bucket.is_none() {
                        return Err(anyhow::anyhow!(
                            "S3_BUCKET must be set when using S3 storage backend"
                        ));
                    }
                    if self.s3_region.is_none() && self.aws_region.is_none() {
                        return Err(anyhow::anyhow!(
                            "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                        ));
                    }
                }
                StorageBackend::Local => {
                    if self.local_storage_path.is_none() {
                        return Err(anyhow::anyhow!(
                            "LOCAL_STORAGE_PATH must be set when using local storage backend"
                        ));
                    }
                }
                StorageBackend::Memory => {}
            }
        }

        if let Some(secret) = &self.url_signing_secret {
            if secret.len() < MIN_SIGNING_SECRET_LEN {
                return Err(anyhow::anyhow!(
                    "URL_SIGNING_SECRET must be at least {} characters long",
                    MIN_SIGNING_SECRET_LEN
                ));
            }
        }

        Ok(())
    }
}
