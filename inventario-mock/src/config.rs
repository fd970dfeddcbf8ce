use std::time::Duration;

/// inventario-mock 配置，从环境变量读取
#[derive(Debug, Clone)]
pub struct Config {
    /// 服务端口
    pub port: u16,
    /// HS256 signing secret for access tokens
    pub jwt_secret: String,
    /// Value expected in the `apikey` header
    pub api_key: String,
    /// Access token lifetime
    pub token_ttl: Duration,
    /// Artificial latency on profile reads
    pub profile_delay: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 54321,
            jwt_secret: "inventario-mock-secret".to_string(),
            api_key: "inventario-anon-key".to_string(),
            token_ttl: Duration::from_secs(3600),
            profile_delay: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            api_key: lookup("API_KEY").unwrap_or(defaults.api_key),
            token_ttl: lookup("TOKEN_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_ttl),
            profile_delay: lookup("PROFILE_DELAY_MS")
                .and_then(|ms| ms.parse().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 54321);
        assert!(config.profile_delay.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("API_KEY", "k"),
            ("PROFILE_DELAY_MS", "250"),
            ("TOKEN_TTL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key, "k");
        assert_eq!(config.profile_delay, Some(Duration::from_millis(250)));
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
    }
}
