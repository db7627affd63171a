//! Configuration module for the image service
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! ```yaml
//! server:
//!   address: "0.0.0.0:${GRPC_PORT:-50051}"
//! storage:
//!   backend: s3
//!   s3:
//!     bucket: "${S3_BUCKET_NAME}"
//!     region: "us-east-1"
//! metrics:
//!   enabled: true
//!   port: 9090
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid server address '{}': {}",
                    self.server.address, e
                ))
            })?;

        if self.server.max_message_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_message_bytes must be greater than zero".into(),
            ));
        }

        if self.server.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "server.request_timeout_secs must be greater than zero when set".into(),
            ));
        }

        if self.storage.backend == StorageBackend::S3 {
            let s3 = self.storage.s3.as_ref().ok_or_else(|| {
                ConfigError::ValidationError("storage.s3 is required for the s3 backend".into())
            })?;

            if s3.bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.s3.bucket cannot be empty".into(),
                ));
            }
            if s3.region.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.s3.region cannot be empty".into(),
                ));
            }
            let unexpanded = [
                ("bucket", Some(&s3.bucket)),
                ("region", Some(&s3.region)),
                ("endpoint", s3.endpoint.as_ref()),
                ("access_key", s3.access_key.as_ref()),
                ("secret_key", s3.secret_key.as_ref()),
            ]
            .into_iter()
            .find(|(_, value)| value.is_some_and(|v| v.contains("${")));
            if let Some((field, _)) = unexpanded {
                return Err(ConfigError::ValidationError(format!(
                    "storage.s3.{} references an unset environment variable",
                    field
                )));
            }
            if s3.access_key.is_some() != s3.secret_key.is_some() {
                return Err(ConfigError::ValidationError(
                    "storage.s3.access_key and secret_key must be set together".into(),
                ));
            }
            if let Some(ref endpoint) = s3.endpoint {
                if !is_valid_http_url(endpoint) {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid S3 endpoint '{}': must start with http:// or https://",
                        endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    /// Time in-flight calls get after shutdown starts before they are cancelled
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_secs: u64,
    /// Optional per-call deadline
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Maximum decoded size of a single message (one upload chunk)
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_shutdown_grace_period() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    4194304 // 4MB
}

/// Which object backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Address buckets as `endpoint/bucket/key` (MinIO and friends)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
