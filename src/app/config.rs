use crate::error::ConfigError;
use crate::models::card::CardType;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// SQS caps a single receive at ten messages.
pub const MAX_BATCH_SIZE: usize = 10;
/// Longest long-poll SQS accepts.
pub const MAX_WAIT_TIME_SECS: u64 = 20;
/// SQS visibility timeout ceiling (12 hours).
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue_url: String,
    pub dead_letter_queue_url: Option<String>,
    pub batch_size: usize,
    pub wait_time_secs: u64,
    pub visibility_timeout_secs: u64,
    pub max_receive_count: u32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub slow_warn_ms: u64,
    pub slow_error_ms: u64,
    pub accepted_card_networks: Vec<CardType>,
    pub run_schema_setup: bool,
    pub database: DatabaseConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "payments".to_string(),
            password: String::new(),
            name: "payments".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_url: "memory://charge-requests".to_string(),
            dead_letter_queue_url: Some("memory://charge-requests-dlq".to_string()),
            batch_size: MAX_BATCH_SIZE,
            wait_time_secs: 20,
            visibility_timeout_secs: 30,
            max_receive_count: 5,
            jitter_min_ms: 1,
            jitter_max_ms: 1500,
            slow_warn_ms: 2700,
            slow_error_ms: 3600,
            accepted_card_networks: vec![CardType::Visa, CardType::Mastercard],
            run_schema_setup: false,
            database: DatabaseConfig::default(),
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

fn parse_networks(raw: &str) -> Result<Vec<CardType>, ConfigError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse().map_err(|reason| ConfigError::Invalid {
                key: "ACCEPTED_CARD_NETWORKS",
                reason,
            })
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Reads a TOML file, then applies environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)?.with_overrides(|key| env::var(key).ok())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QUEUE_URL") {
            self.queue_url = v;
        }
        if let Some(v) = lookup("DEAD_LETTER_QUEUE_URL") {
            self.dead_letter_queue_url = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            self.batch_size = parse_var("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("WAIT_TIME_SECONDS") {
            self.wait_time_secs = parse_var("WAIT_TIME_SECONDS", &v)?;
        }
        if let Some(v) = lookup("VISIBILITY_TIMEOUT_SECONDS") {
            self.visibility_timeout_secs = parse_var("VISIBILITY_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("MAX_RECEIVE_COUNT") {
            self.max_receive_count = parse_var("MAX_RECEIVE_COUNT", &v)?;
        }
        if let Some(v) = lookup("JITTER_MIN_MS") {
            self.jitter_min_ms = parse_var("JITTER_MIN_MS", &v)?;
        }
        if let Some(v) = lookup("JITTER_MAX_MS") {
            self.jitter_max_ms = parse_var("JITTER_MAX_MS", &v)?;
        }
        if let Some(v) = lookup("SLOW_WARN_MS") {
            self.slow_warn_ms = parse_var("SLOW_WARN_MS", &v)?;
        }
        if let Some(v) = lookup("SLOW_ERROR_MS") {
            self.slow_error_ms = parse_var("SLOW_ERROR_MS", &v)?;
        }
        if let Some(v) = lookup("ACCEPTED_CARD_NETWORKS") {
            self.accepted_card_networks = parse_networks(&v)?;
        }
        // INDEX_MADE=no is the legacy spelling of "schema setup still pending"
        if let Some(v) = lookup("INDEX_MADE") {
            self.run_schema_setup = v.trim() == "no";
        }
        if let Some(v) = lookup("RUN_SCHEMA_SETUP") {
            self.run_schema_setup = parse_bool("RUN_SCHEMA_SETUP", &v)?;
        }
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.queue_url).map_err(|e| ConfigError::Invalid {
            key: "queue_url",
            reason: e.to_string(),
        })?;
        if let Some(dlq) = &self.dead_letter_queue_url {
            Url::parse(dlq).map_err(|e| ConfigError::Invalid {
                key: "dead_letter_queue_url",
                reason: e.to_string(),
            })?;
            if dlq == &self.queue_url {
                return Err(ConfigError::Invalid {
                    key: "dead_letter_queue_url",
                    reason: "must differ from queue_url".to_string(),
                });
            }
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError::Invalid {
                key: "batch_size",
                reason: format!("must be between 1 and {}", MAX_BATCH_SIZE),
            });
        }
        if self.wait_time_secs > MAX_WAIT_TIME_SECS {
            return Err(ConfigError::Invalid {
                key: "wait_time_secs",
                reason: format!("must not exceed {}", MAX_WAIT_TIME_SECS),
            });
        }
        if self.visibility_timeout_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                key: "visibility_timeout_secs",
                reason: format!("must not exceed {}", MAX_VISIBILITY_TIMEOUT_SECS),
            });
        }
        if self.max_receive_count == 0 {
            return Err(ConfigError::Invalid {
                key: "max_receive_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(ConfigError::Invalid {
                key: "jitter_min_ms",
                reason: "must not exceed jitter_max_ms".to_string(),
            });
        }
        if self.slow_error_ms < self.slow_warn_ms {
            return Err(ConfigError::Invalid {
                key: "slow_error_ms",
                reason: "must not be below slow_warn_ms".to_string(),
            });
        }
        if self.accepted_card_networks.is_empty() {
            return Err(ConfigError::Invalid {
                key: "accepted_card_networks",
                reason: "at least one network is required".to_string(),
            });
        }
        if let Some(t) = self
            .accepted_card_networks
            .iter()
            .find(|t| matches!(t, CardType::Unknown | CardType::Invalid))
        {
            return Err(ConfigError::Invalid {
                key: "accepted_card_networks",
                reason: format!("'{}' is not a card network", t),
            });
        }
        Ok(())
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.wait_time(), Duration::from_secs(20));
        assert_eq!(
            config.accepted_card_networks,
            vec![CardType::Visa, CardType::Mastercard]
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup(&[
                ("QUEUE_URL", "https://sqs.us-west-2.amazonaws.com/123/payments"),
                ("BATCH_SIZE", "4"),
                ("ACCEPTED_CARD_NETWORKS", "visa, amex"),
                ("DEAD_LETTER_QUEUE_URL", ""),
                ("DB_PASSWORD", "hunter2"),
            ]))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.accepted_card_networks, vec![CardType::Visa, CardType::Amex]);
        assert!(config.dead_letter_queue_url.is_none());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_legacy_index_flag() {
        let pending = Config::default()
            .with_overrides(lookup(&[("INDEX_MADE", "no")]))
            .unwrap();
        assert!(pending.run_schema_setup);
        let done = Config::default()
            .with_overrides(lookup(&[("INDEX_MADE", "yes")]))
            .unwrap();
        assert!(!done.run_schema_setup);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::default()
            .with_overrides(lookup(&[("BATCH_SIZE", "ten")]))
            .is_err());
        assert!(Config::default()
            .with_overrides(lookup(&[("ACCEPTED_CARD_NETWORKS", "visa,diners")]))
            .is_err());

        let mut config = Config::default();
        config.batch_size = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.jitter_min_ms = 2000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.slow_error_ms = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.accepted_card_networks = vec![CardType::Unknown];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.queue_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wait_time_secs = 21;
        assert!(config.validate().is_err());
        config.wait_time_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.visibility_timeout_secs = MAX_VISIBILITY_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
        config.visibility_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.visibility_timeout_secs = MAX_VISIBILITY_TIMEOUT_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
queue_url = "memory://orders"
batch_size = 3
accepted_card_networks = ["visa"]
run_schema_setup = true

[database]
host = "db.internal"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.queue_url, "memory://orders");
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.accepted_card_networks, vec![CardType::Visa]);
        assert!(config.run_schema_setup);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.name, "payments");
        assert_eq!(config.wait_time_secs, 20);
    }
}
