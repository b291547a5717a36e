use regex::Regex;
use std::sync::LazyLock;
use subtle::ConstantTimeEq;

use crate::error::KeygateError;

static API_KEY_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~+/=-]{1,256}$").expect("valid API key regex"));

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates an API key taken from a path segment.
    pub fn validate_key(key: &str) -> Result<(), KeygateError> {
        if key.trim().is_empty() {
            return Err(KeygateError::ValidationError(
                "The key is required".to_string(),
            ));
        }

        if !API_KEY_FORMAT.is_match(key) {
            return Err(KeygateError::ValidationError(
                "The key may only contain letters, digits and -._~+/= (max 256)".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks the shared secret guarding the request-counter endpoints.
    /// Contents are compared in constant time; the length is not hidden.
    pub fn validate_secret(provided: &str, expected: &str) -> Result<(), KeygateError> {
        if provided.is_empty() {
            return Err(KeygateError::MissingKey);
        }

        let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();

        if matches {
            Ok(())
        } else {
            Err(KeygateError::NotAuthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(RequestValidator::validate_key("api-key_1").is_ok());
        assert!(RequestValidator::validate_key("dGVzdA==").is_ok());
    }

    #[test]
    fn test_invalid_key_format() {
        assert!(RequestValidator::validate_key("").is_err());
        assert!(RequestValidator::validate_key("invalid key!").is_err());
        assert!(RequestValidator::validate_key(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_secret_check() {
        assert!(RequestValidator::validate_secret("s3cret", "s3cret").is_ok());
        assert!(matches!(
            RequestValidator::validate_secret("s3cre7", "s3cret"),
            Err(KeygateError::NotAuthorized)
        ));
        assert!(matches!(
            RequestValidator::validate_secret("s3cret-longer", "s3cret"),
            Err(KeygateError::NotAuthorized)
        ));
        assert!(matches!(
            RequestValidator::validate_secret("", "s3cret"),
            Err(KeygateError::MissingKey)
        ));
    }
}
