use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Largest segment the media endpoint accepts in a single APPEND.
pub const MAX_CHUNK_SIZE_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
pub const DEFAULT_IDENTITY_URL: &str = "https://api.x.com/2/users/me";
pub const DEFAULT_POST_URL: &str = "https://api.x.com/2/tweets";

const ENV_CONSUMER_KEY: &str = "TWITTER_API_KEY";
const ENV_CONSUMER_SECRET: &str = "TWITTER_API_SECRET";
const ENV_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
const ENV_ACCESS_TOKEN_SECRET: &str = "TWITTER_ACCESS_TOKEN_SECRET";

/// Application key pair. Fixed for the lifetime of the process.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-caller access token pair, supplied with each upload.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub key: String,
    pub secret: String,
}

impl TokenPair {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub upload_url: String,
    pub identity_url: String,
    pub post_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            post_url: DEFAULT_POST_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoints: Endpoints,
    pub consumer: ConsumerCredentials,
    pub access_token: TokenPair,
    pub chunk_size_bytes: usize,
    pub max_status_attempts: u32,
    pub default_check_after_secs: u64,
    pub request_timeout_secs: u64,
    pub media_category: String,
    pub default_post_text: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            consumer: ConsumerCredentials::default(),
            access_token: TokenPair::default(),
            chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
            max_status_attempts: 30,
            default_check_after_secs: 5,
            request_timeout_secs: 120,
            media_category: "amplify_video".to_string(),
            default_post_text: "Check out this cool content!".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn chunk_size(&self) -> AppResult<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size_bytes)
            .ok_or_else(|| AppError::validation("chunk_size_bytes", "Must be greater than 0"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn default_check_after(&self) -> Duration {
        Duration::from_secs(self.default_check_after_secs)
    }

    /// Overlay credentials from the process environment. Unset variables
    /// leave the current value in place.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 4] = [
            (ENV_CONSUMER_KEY, &mut self.consumer.key),
            (ENV_CONSUMER_SECRET, &mut self.consumer.secret),
            (ENV_ACCESS_TOKEN, &mut self.access_token.key),
            (ENV_ACCESS_TOKEN_SECRET, &mut self.access_token.secret),
        ];

        for (name, target) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("X Media Uploader");

    Ok(config_dir.join("config.json"))
}

/// Load the JSON config file (if present), then overlay credentials from the
/// environment and validate the result.
pub fn load_config() -> AppResult<Config> {
    let mut config = match get_config_path() {
        Ok(path) if path.exists() => load_config_from(&path)?,
        Ok(_) => Config::default(),
        Err(e) => {
            log::warn!("{}. Using defaults.", e);
            Config::default()
        }
    };

    config.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from(path: &std::path::Path) -> AppResult<Config> {
    let config_str = fs::read_to_string(path)?;
    let config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        log::warn!("Failed to parse config file: {}. Using defaults.", e);
        Config::default()
    });
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.chunk_size_bytes == 0 || config.chunk_size_bytes > MAX_CHUNK_SIZE_BYTES {
        return Err(AppError::validation(
            "chunk_size_bytes",
            "Must be between 1 byte and 5MB",
        ));
    }

    if config.max_status_attempts == 0 || config.max_status_attempts > 100 {
        return Err(AppError::validation(
            "max_status_attempts",
            "Must be between 1 and 100",
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation(
            "request_timeout_secs",
            "Must be greater than 0",
        ));
    }

    if config.consumer.key.trim().is_empty() || config.consumer.secret.trim().is_empty() {
        return Err(AppError::Config(format!(
            "Consumer credentials missing; set {} and {}",
            ENV_CONSUMER_KEY, ENV_CONSUMER_SECRET
        )));
    }

    for (field, url) in [
        ("endpoints.upload_url", &config.endpoints.upload_url),
        ("endpoints.identity_url", &config.endpoints.identity_url),
        ("endpoints.post_url", &config.endpoints.post_url),
    ] {
        if reqwest::Url::parse(url).is_err() {
            return Err(AppError::validation(field, "Must be an absolute URL"));
        }
    }

    // Validate log level
    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> Config {
        Config {
            consumer: ConsumerCredentials::new("consumer-key", "consumer-secret"),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_matches_protocol_limits() {
        let config = Config::default();
        assert_eq!(config.chunk_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_status_attempts, 30);
        assert_eq!(config.default_check_after(), Duration::from_secs(5));
        assert_eq!(config.media_category, "amplify_video");
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&valid_config()).is_ok());

        // Missing consumer credentials
        assert!(validate_config(&Config::default()).is_err());

        let mut config = valid_config();
        config.chunk_size_bytes = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.chunk_size_bytes = MAX_CHUNK_SIZE_BYTES + 1;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.max_status_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.endpoints.post_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_env_overrides_replace_only_set_values() {
        let mut config = valid_config();
        config.access_token = TokenPair::new("file-token", "file-secret");

        let env: HashMap<&str, &str> = [
            ("TWITTER_API_KEY", "env-key"),
            ("TWITTER_ACCESS_TOKEN_SECRET", "env-token-secret"),
            ("TWITTER_ACCESS_TOKEN", "   "),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.consumer.key, "env-key");
        assert_eq!(config.consumer.secret, "consumer-secret");
        assert_eq!(config.access_token.key, "file-token");
        assert_eq!(config.access_token.secret, "env-token-secret");
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "max_status_attempts": 10, "log_level": "debug" }"#)
                .unwrap();
        assert_eq!(config.max_status_attempts, 10);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.chunk_size_bytes, MAX_CHUNK_SIZE_BYTES);
        assert_eq!(config.endpoints.upload_url, DEFAULT_UPLOAD_URL);
    }

    #[test]
    fn test_load_config_from_disk() {
        let dir = std::env::temp_dir().join(format!("x_media_uploader_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{ "default_post_text": "hello", "chunk_size_bytes": 1048576 }"#).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.default_post_text, "hello");
        assert_eq!(loaded.chunk_size_bytes, 1024 * 1024);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let token = TokenPair::new("visible", "super-secret");
        let rendered = format!("{:?}", token);
        assert!(rendered.contains("visible"));
        assert!(!rendered.contains("super-secret"));
    }
}
