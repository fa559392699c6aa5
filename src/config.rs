use std::time::Duration;

use serde::Deserialize;

use crate::error::StartupError;

/// Port used by the bike marketplace when `PORT` is unset.
pub const DEFAULT_HUNTER_PORT: u16 = 5000;

/// Port used by the matrimony service when `PORT` is unset.
pub const DEFAULT_MATRIMONY_PORT: u16 = 5001;

fn default_mongodb_uri() -> String {
    "mongodb://127.0.0.1:27017".to_string()
}

fn default_hunter_db() -> String {
    "HunterDB".to_string()
}

fn default_matrimony_db() -> String {
    "MatrimonyDB".to_string()
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_gateway_timeout_ms() -> u64 {
    10_000
}

fn default_token_ttl_days() -> i64 {
    365
}

/// Process configuration, read once from the environment at startup.
///
/// Every field maps to the upper-cased environment variable of the same name, e.g.
/// `mongodb_uri` is read from `MONGODB_URI`. List values are comma separated.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: Option<u16>,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,

    #[serde(default = "default_hunter_db")]
    pub hunter_db: String,

    #[serde(default = "default_matrimony_db")]
    pub matrimony_db: String,

    pub access_token_secret: Option<String>,

    pub stripe_secret_key: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    pub node_env: Option<String>,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,

    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        Ok(envy::from_env::<Config>()?)
    }

    /// Builds a configuration from explicit key/value pairs instead of the process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter(pairs)?)
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Production deployments serve cross-site cookies, which browsers only accept when secure.
    pub fn is_production(&self) -> bool {
        self.node_env.as_deref() == Some("production")
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn token_secret(&self) -> Result<&str, StartupError> {
        self.access_token_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or(StartupError::MissingSetting("ACCESS_TOKEN_SECRET"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_pairs(Vec::new()).unwrap();

        assert_eq!(config.port_or(DEFAULT_HUNTER_PORT), 5000);
        assert_eq!(config.mongodb_uri, "mongodb://127.0.0.1:27017");
        assert_eq!(config.matrimony_db, "MatrimonyDB");
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert!(!config.is_production());
        assert!(config.token_secret().is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_pairs(pairs(&[
            ("PORT", "8082"),
            ("NODE_ENV", "production"),
            ("ACCESS_TOKEN_SECRET", "s3cret"),
            (
                "CORS_ORIGINS",
                "http://localhost:5173,https://assignment-12-50161.web.app",
            ),
            ("STORE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.port_or(DEFAULT_MATRIMONY_PORT), 8082);
        assert!(config.is_production());
        assert_eq!(config.token_secret().unwrap(), "s3cret");
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(Config::from_pairs(pairs(&[("PORT", "eighty")])).is_err());
    }
}
