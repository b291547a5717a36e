use crate::config::Config;
use crate::error::KeygateError;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<(), KeygateError> {
        if config.uses_redis() {
            Self::validate_redis_url(&config.redis_url)?;
        }
        Self::validate_window(config.window_millis)?;
        Self::validate_log_level(&config.log_level)?;

        if let Some(key) = &config.admin_key {
            Self::validate_secret("ADMIN_KEY", key)?;
        }
        if let Some(secret) = &config.request_secret_key {
            Self::validate_secret("REQUEST_SECRET_KEY", secret)?;
        }

        Ok(())
    }

    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), KeygateError> {
        if url.is_empty() {
            return Err(KeygateError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(KeygateError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_window(window_millis: u64) -> Result<(), KeygateError> {
        if window_millis == 0 {
            return Err(KeygateError::Configuration(
                "WINDOW_MILLIS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<(), KeygateError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(KeygateError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, valid_levels
            )));
        }

        Ok(())
    }

    fn validate_secret(name: &str, value: &str) -> Result<(), KeygateError> {
        if value.trim().is_empty() {
            return Err(KeygateError::Configuration(format!(
                "{} is set but empty",
                name
            )));
        }

        Ok(())
    }
}
