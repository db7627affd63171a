//! S3 client construction
//!
//! Builds the `aws_sdk_s3::Client` handed to [`S3Store`](crate::storage::S3Store).
//! With static credentials in the config the client is assembled directly;
//! otherwise the AWS default provider chain (environment, profile, IMDS) is
//! loaded through `aws-config`.
//!
//! # Example
//!
//! ```no_run
//! use image_service::config::S3Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3Config {
//!     bucket: "images".to_string(),
//!     region: "us-east-1".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     access_key: Some("minioadmin".to_string()),
//!     secret_key: Some("minioadmin".to_string()),
//!     force_path_style: true,
//! };
//! let client = image_service::s3::build_client(&config).await?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

use crate::config::S3Config;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;

pub mod credentials;

pub use credentials::CredentialsError;

/// Build an S3 client for the configured region, endpoint and credentials
pub async fn build_client(config: &S3Config) -> Result<Client, CredentialsError> {
    let region = Region::new(config.region.clone());

    let mut builder = match credentials::from_config(config)? {
        Some(credentials) => aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials),
        None => {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        }
    };

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    builder = builder.force_path_style(config.force_path_style);

    Ok(Client::from_conf(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_config() -> S3Config {
        S3Config {
            bucket: "test-bucket".into(),
            region: "us-west-2".into(),
            endpoint: Some("http://localhost:9000".into()),
            access_key: Some("test-access".into()),
            secret_key: Some("test-secret".into()),
            force_path_style: true,
        }
    }

    #[tokio::test]
    async fn test_client_uses_configured_region() {
        let client = build_client(&static_config()).await.unwrap();
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("us-west-2")
        );
    }

    #[tokio::test]
    async fn test_half_configured_credentials_fail() {
        let mut config = static_config();
        config.secret_key = None;
        assert!(build_client(&config).await.is_err());
    }
}
