//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load, expand and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

/// Expand `${VAR_NAME}` and `${VAR_NAME:-default}`.
///
/// An unset variable without a default keeps its placeholder.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("static pattern is valid");

    re.replace_all(s, |cap: &regex_lite::Captures<'_>| {
        match std::env::var(&cap[1]) {
            Ok(value) => value,
            Err(_) => cap
                .get(2)
                .map_or_else(|| cap[0].to_string(), |d| d.as_str().to_string()),
        }
    })
    .into_owned()
}
