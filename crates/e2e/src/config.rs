//! Global environment configuration
//!
//! A single JSON file holds every named environment the suite can target.
//! The environment is picked once at start-up and the resulting
//! [`EnvironmentConfig`] is handed to the runner explicitly.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Environment variable consulted when no environment is given on the CLI
pub const ENV_SELECTOR_VAR: &str = "HMS_ENV";

/// Contents of the global configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// One named target environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Base URL of the web application
    pub base_url: String,

    /// Base URL of the REST API used for appointment booking
    #[serde(default)]
    pub api_base_url: Option<String>,

    pub username: String,
    pub password: String,

    #[serde(default)]
    pub locator_check: LocatorCheck,
}

/// Presence-check tuning shared by every flow
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorCheck {
    /// Milliseconds to wait for an element on each attempt
    #[serde(default = "default_locator_timeout")]
    pub default_timeout: u64,

    /// Additional attempts after the first one
    #[serde(default)]
    pub retries: u32,
}

fn default_locator_timeout() -> u64 {
    10_000
}

impl Default for LocatorCheck {
    fn default() -> Self {
        Self {
            default_timeout: default_locator_timeout(),
            retries: 0,
        }
    }
}

impl LocatorCheck {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout)
    }
}

impl GlobalConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> E2eResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file. A missing file is fatal.
    pub fn load(path: &Path) -> E2eResult<Self> {
        if !path.exists() {
            return Err(E2eError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> E2eResult<()> {
        for (name, env) in &self.environments {
            if env.base_url.trim().is_empty() {
                return Err(E2eError::Config(format!(
                    "environment '{}' has an empty baseUrl",
                    name
                )));
            }
            if env.locator_check.default_timeout == 0 {
                return Err(E2eError::Config(format!(
                    "environment '{}' has locatorCheck.defaultTimeout = 0",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Pick a named environment
    pub fn environment(&self, name: &str, source: &Path) -> E2eResult<EnvironmentConfig> {
        self.environments
            .get(name)
            .cloned()
            .ok_or_else(|| E2eError::EnvironmentNotFound {
                name: name.to_string(),
                path: source.display().to_string(),
            })
    }
}

impl EnvironmentConfig {
    /// Join a path onto the application base URL
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "environments": {
            "qa": {
                "baseUrl": "https://qa.hms.local/",
                "username": "nurse01",
                "password": "secret",
                "locatorCheck": { "defaultTimeout": 15000, "retries": 2 }
            },
            "uat": {
                "baseUrl": "https://uat.hms.local",
                "apiBaseUrl": "https://uat.hms.local/api",
                "username": "clerk",
                "password": "secret"
            }
        }
    }"#;

    #[test]
    fn test_parse_environments() {
        let config = GlobalConfig::from_json(SAMPLE).unwrap();
        let qa = config.environment("qa", Path::new("global.json")).unwrap();
        assert_eq!(qa.locator_check.default_timeout, 15000);
        assert_eq!(qa.locator_check.retries, 2);
        assert!(qa.api_base_url.is_none());

        let uat = config.environment("uat", Path::new("global.json")).unwrap();
        assert_eq!(uat.locator_check.default_timeout, 10_000);
    }

    #[test]
    fn test_missing_environment_is_fatal() {
        let config = GlobalConfig::from_json(SAMPLE).unwrap();
        let err = config.environment("prod", Path::new("global.json")).unwrap_err();
        assert!(matches!(err, E2eError::EnvironmentNotFound { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = GlobalConfig::load(Path::new("/nonexistent/global.json")).unwrap_err();
        assert!(matches!(err, E2eError::ConfigNotFound(_)));
    }

    #[test]
    fn test_url_join() {
        let config = GlobalConfig::from_json(SAMPLE).unwrap();
        let qa = config.environment("qa", Path::new("global.json")).unwrap();
        assert_eq!(qa.url("/login"), "https://qa.hms.local/login");
        assert_eq!(qa.url("https://other/x"), "https://other/x");
    }
}
