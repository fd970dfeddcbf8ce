//! Client configuration

use crate::error::{ClientError, ClientResult};
use std::time::Duration;

/// Profile fetch deadline
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(8);
/// Sign-out deadline
pub const DEFAULT_SIGN_OUT_TIMEOUT: Duration = Duration::from_secs(10);
/// HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Auth event broadcast capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Client configuration for connecting to the backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "http://localhost:54321")
    pub base_url: String,

    /// Public API key, sent as `apikey` on every request
    pub api_key: String,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Deadline for one profile fetch attempt
    pub profile_timeout: Duration,

    /// Deadline for the sign-out call
    pub sign_out_timeout: Duration,

    /// Capacity of the auth event channel
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            profile_timeout: DEFAULT_PROFILE_TIMEOUT,
            sign_out_timeout: DEFAULT_SIGN_OUT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Read configuration from environment variables
    ///
    /// - `INVENTARIO_URL` (required)
    /// - `INVENTARIO_API_KEY` (required)
    /// - `INVENTARIO_REQUEST_TIMEOUT_SECS`
    /// - `INVENTARIO_PROFILE_TIMEOUT_SECS`
    /// - `INVENTARIO_SIGN_OUT_TIMEOUT_SECS`
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::Config(format!("{} must be set", key)))
        };
        let seconds = |key: &str, default: Duration| -> ClientResult<Duration> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ClientError::Config(format!("{} must be a number of seconds, got '{}'", key, raw))),
            }
        };

        Ok(Self::new(required("INVENTARIO_URL")?, required("INVENTARIO_API_KEY")?)
            .with_request_timeout(seconds("INVENTARIO_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?)
            .with_profile_timeout(seconds("INVENTARIO_PROFILE_TIMEOUT_SECS", DEFAULT_PROFILE_TIMEOUT)?)
            .with_sign_out_timeout(seconds("INVENTARIO_SIGN_OUT_TIMEOUT_SECS", DEFAULT_SIGN_OUT_TIMEOUT)?))
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the profile fetch deadline
    pub fn with_profile_timeout(mut self, timeout: Duration) -> Self {
        self.profile_timeout = timeout;
        self
    }

    /// Set the sign-out deadline
    pub fn with_sign_out_timeout(mut self, timeout: Duration) -> Self {
        self.sign_out_timeout = timeout;
        self
    }

    /// Set the auth event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Create a REST backend from this configuration
    pub fn build_rest_backend(&self) -> ClientResult<crate::backend::RestBackend> {
        crate::backend::RestBackend::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:54321", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://localhost:54321/", "anon");
        assert_eq!(config.base_url, "http://localhost:54321");
        assert_eq!(config.profile_timeout, Duration::from_secs(8));
        assert_eq!(config.sign_out_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("INVENTARIO_URL", "https://tienda.example.com"),
            ("INVENTARIO_API_KEY", "anon"),
            ("INVENTARIO_PROFILE_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://tienda.example.com");
        assert_eq!(config.profile_timeout, Duration::from_secs(3));
        assert_eq!(config.sign_out_timeout, DEFAULT_SIGN_OUT_TIMEOUT);
    }

    #[test]
    fn test_from_lookup_missing_url() {
        let err = ClientConfig::from_lookup(lookup(&[("INVENTARIO_API_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("INVENTARIO_URL")));
    }

    #[test]
    fn test_from_lookup_bad_timeout() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("INVENTARIO_URL", "http://x"),
            ("INVENTARIO_API_KEY", "anon"),
            ("INVENTARIO_SIGN_OUT_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
