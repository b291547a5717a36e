//! Storage key naming and API key extraction.

use axum::http::HeaderMap;

const NAMESPACE: &str = "keygate";

/// Builds backend keys for accounts and usage logs.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    namespace: String,
}

impl KeyGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn account_key(&self, api_key: &str) -> String {
        format!("{}:account:{}", self.namespace, api_key)
    }

    pub fn usage_key(&self, api_key: &str) -> String {
        format!("{}:usage:{}", self.namespace, api_key)
    }

    /// Pull the caller's API key from the request headers.
    ///
    /// `Authorization` wins over `x-api-key`; a `Bearer ` prefix is stripped.
    /// Returns an empty string when no key was sent so the gate can deny it
    /// as missing.
    pub fn extract_api_key(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .or_else(|| headers.get("x-api-key"))
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                let value = value.trim();
                value.strip_prefix("Bearer ").unwrap_or(value).trim()
            })
            .unwrap_or_default()
            .to_string()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_backend_keys_are_namespaced() {
        let generator = KeyGenerator::default();
        assert_eq!(generator.account_key("abc"), "keygate:account:abc");
        assert_eq!(generator.usage_key("abc"), "keygate:usage:abc");
    }

    #[test]
    fn test_keys_are_not_rewritten() {
        // Distinct API keys must never share a backend key.
        let generator = KeyGenerator::default();
        assert_ne!(generator.usage_key("a b"), generator.usage_key("a_b"));
    }

    #[test]
    fn test_extract_from_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret-1"));
        headers.insert("x-api-key", HeaderValue::from_static("other"));
        assert_eq!(KeyGenerator::extract_api_key(&headers), "secret-1");
    }

    #[test]
    fn test_extract_from_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("raw-key"));
        assert_eq!(KeyGenerator::extract_api_key(&headers), "raw-key");
    }

    #[test]
    fn test_missing_key_is_empty() {
        assert_eq!(KeyGenerator::extract_api_key(&HeaderMap::new()), "");
    }
}
