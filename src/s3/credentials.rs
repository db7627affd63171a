//! S3 credential resolution
//!
//! Static keys from the configuration take precedence. When neither key is
//! configured the caller falls back to the AWS default provider chain.

use crate::config::S3Config;
use aws_credential_types::Credentials;
use thiserror::Error;

/// Provider name reported by credentials taken from the config file
const PROVIDER_NAME: &str = "image-service-config";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0} is set but {1} is not")]
    Incomplete(&'static str, &'static str),

    #[error("Invalid credentials: {0} is empty")]
    Empty(&'static str),
}

/// Static credentials from `config`, or `None` to use the default chain
pub fn from_config(config: &S3Config) -> Result<Option<Credentials>, CredentialsError> {
    match (&config.access_key, &config.secret_key) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(CredentialsError::Incomplete("access_key", "secret_key")),
        (None, Some(_)) => Err(CredentialsError::Incomplete("secret_key", "access_key")),
        (Some(access), Some(secret)) => {
            if access.is_empty() {
                return Err(CredentialsError::Empty("access_key"));
            }
            if secret.is_empty() {
                return Err(CredentialsError::Empty("secret_key"));
            }
            Ok(Some(Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                PROVIDER_NAME,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(access: Option<&str>, secret: Option<&str>) -> S3Config {
        S3Config {
            bucket: "b".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: access.map(String::from),
            secret_key: secret.map(String::from),
            force_path_style: false,
        }
    }

    #[test]
    fn test_no_keys_uses_default_chain() {
        assert!(from_config(&config(None, None)).unwrap().is_none());
    }

    #[test]
    fn test_static_keys() {
        let creds = from_config(&config(Some("AKIA"), Some("secret")))
            .unwrap()
            .unwrap();
        assert_eq!(creds.access_key_id(), "AKIA");
        assert_eq!(creds.secret_access_key(), "secret");
    }

    #[test]
    fn test_partial_keys_are_rejected() {
        assert!(matches!(
            from_config(&config(Some("AKIA"), None)),
            Err(CredentialsError::Incomplete("access_key", "secret_key"))
        ));
        assert!(matches!(
            from_config(&config(None, Some("secret"))),
            Err(CredentialsError::Incomplete("secret_key", "access_key"))
        ));
    }

    #[test]
    fn test_empty_keys_are_rejected() {
        assert!(matches!(
            from_config(&config(Some(""), Some("secret"))),
            Err(CredentialsError::Empty("access_key"))
        ));
    }
}
