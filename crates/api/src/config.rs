//! Process configuration read from the environment.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use tallybook_infra::DEFAULT_CASH_ACCOUNT_CODES;
use tallybook_observability::LogFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_name: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_format: LogFormat,
    pub journal_number_prefix: String,
    /// Accounts the cash flow statement treats as cash and bank.
    pub cash_account_codes: Vec<String>,
    /// Keep the books in Postgres instead of memory.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Tallybook".to_string(),
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            log_format: LogFormat::Json,
            journal_number_prefix: "JRN".to_string(),
            cash_account_codes: DEFAULT_CASH_ACCOUNT_CODES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            use_persistent_stores: false,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or blank variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(name) = var("APP_NAME") {
            config.app_name = name;
        }
        if let Some(host) = var("APP_HOST") {
            config.host = host
                .trim()
                .parse()
                .map_err(|e| invalid("APP_HOST", &host, e))?;
        }
        if let Some(port) = var("APP_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|e| invalid("APP_PORT", &port, e))?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.log_format = format
                .parse()
                .map_err(|e| invalid("LOG_FORMAT", &format, e))?;
        }
        if let Some(prefix) = var("JOURNAL_NUMBER_PREFIX") {
            let trimmed = prefix.trim();
            if trimmed.contains('/') {
                return Err(invalid("JOURNAL_NUMBER_PREFIX", &prefix, "must not contain '/'"));
            }
            config.journal_number_prefix = trimmed.to_string();
        }
        if let Some(codes) = var("CASH_ACCOUNT_CODES") {
            let parsed: Vec<String> = codes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if parsed.is_empty() {
                return Err(invalid("CASH_ACCOUNT_CODES", &codes, "no account codes listed"));
            }
            config.cash_account_codes = parsed;
        }
        if let Some(flag) = var("USE_PERSISTENT_STORES") {
            config.use_persistent_stores = flag
                .trim()
                .parse()
                .map_err(|e| invalid("USE_PERSISTENT_STORES", &flag, e))?;
        }
        if let Some(url) = var("DATABASE_URL") {
            config.database_url = Some(url.trim().to_string());
        }
        if let Some(max) = var("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = max
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    invalid("DATABASE_MAX_CONNECTIONS", &max, "expected a positive integer")
                })?;
        }
        if config.use_persistent_stores && config.database_url.is_none() {
            return Err(invalid("DATABASE_URL", "", "required when USE_PERSISTENT_STORES=true"));
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.cash_account_codes, vec!["1-1100", "1-1200"]);
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_NAME", "Books"),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "9000"),
            ("LOG_FORMAT", "pretty"),
            ("JOURNAL_NUMBER_PREFIX", "GJ"),
            ("CASH_ACCOUNT_CODES", " 1-1100 , 1-1250,"),
        ]))
        .unwrap();

        assert_eq!(config.app_name, "Books");
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.journal_number_prefix, "GJ");
        assert_eq!(config.cash_account_codes, vec!["1-1100", "1-1250"]);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = AppConfig::from_lookup(lookup(&[("APP_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "APP_PORT", .. }));

        let err = AppConfig::from_lookup(lookup(&[("JOURNAL_NUMBER_PREFIX", "A/B")])).unwrap_err();
        assert!(err.to_string().starts_with("JOURNAL_NUMBER_PREFIX"));

        assert!(AppConfig::from_lookup(lookup(&[("CASH_ACCOUNT_CODES", ",,")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn persistence_needs_a_database_url() {
        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DATABASE_URL", .. }));

        let config = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://books@localhost/tallybook"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        assert!(config.use_persistent_stores);
        assert_eq!(config.database_url.as_deref(), Some("postgres://books@localhost/tallybook"));
        assert_eq!(config.database_max_connections, 4);

        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. }));
        assert!(AppConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "0")])).is_err());
    }
}
