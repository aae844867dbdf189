//! Runtime configuration: pool sizing, circuit breaker thresholds, retry
//! policy, and the store/queue connection strings. Generalizes the
//! teacher's plain `ServerConfig` struct (a flat `Default` impl) into a
//! `serde`-deserializable tree loadable from YAML or environment overlay,
//! per the external interfaces section.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("environment variable `{0}` could not be parsed as {1}")]
    InvalidEnvVar(String, &'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    /// Interval at which `Pool::spawn_validator`'s background task checks
    /// idle connections. `0` disables background validation.
    #[serde(default = "default_validation_interval_ms")]
    pub validation_interval_ms: u64,
}

fn default_validation_interval_ms() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_ms: 5_000,
            idle_timeout_ms: 300_000,
            validation_interval_ms: default_validation_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker trips from closed to open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a half-open probe.
    pub open_cooldown_ms: u64,
    /// Consecutive successes in half-open required to close the breaker.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown_ms: 30_000,
            half_open_success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventBusConfig {
    pub redis_url: String,
    pub worker_concurrency: u32,
    pub max_delivery_attempts: u32,
    pub dead_letter_stream: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            worker_concurrency: 4,
            max_delivery_attempts: 5,
            dead_letter_stream: "morm:dead_letter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub node_id: String,
    pub mongo_uri: String,
    pub database: String,
    pub pool: PoolConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub event_bus: EventBusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            mongo_uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "morm".to_string(),
            pool: PoolConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl Config {
    /// # Errors
    /// Returns [`ConfigError::Yaml`] if `source` is not valid YAML or does
    /// not match the `Config` shape.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Applies `MORM_*` environment variable overrides on top of `self`,
    /// mirroring the common "YAML base, env overlay" pattern: unset
    /// variables leave the corresponding field untouched.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidEnvVar`] if a set variable cannot be
    /// parsed into its target type.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = env::var("MORM_NODE_ID") {
            self.node_id = v;
        }
        if let Ok(v) = env::var("MORM_MONGO_URI") {
            self.mongo_uri = v;
        }
        if let Ok(v) = env::var("MORM_DATABASE") {
            self.database = v;
        }
        if let Ok(v) = env::var("MORM_REDIS_URL") {
            self.event_bus.redis_url = v;
        }
        if let Ok(v) = env::var("MORM_POOL_MAX_CONNECTIONS") {
            self.pool.max_connections = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("MORM_POOL_MAX_CONNECTIONS".into(), "u32"))?;
        }
        Ok(self)
    }

    /// Convenience entry point: parse YAML, then apply environment
    /// overrides.
    ///
    /// # Errors
    /// See [`Config::from_yaml_str`] and [`Config::apply_env_overrides`].
    pub fn load(yaml_source: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_str(yaml_source)?.apply_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.pool.max_connections >= cfg.pool.min_connections);
        assert!(cfg.retry.max_delay_ms >= cfg.retry.base_delay_ms);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = r"
node_id: n1
mongo_uri: mongodb://example/
database: appdb
pool:
  min_connections: 2
  max_connections: 20
  acquire_timeout_ms: 1000
  idle_timeout_ms: 60000
circuit_breaker:
  failure_threshold: 3
  open_cooldown_ms: 10000
  half_open_success_threshold: 1
retry:
  max_attempts: 3
  base_delay_ms: 10
  max_delay_ms: 1000
event_bus:
  redis_url: redis://example/
  worker_concurrency: 2
  max_delivery_attempts: 3
  dead_letter_stream: dlq
";
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.node_id, "n1");
        assert_eq!(cfg.pool.max_connections, 20);
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("MORM_NODE_ID", "from-env");
        let cfg = Config::default().apply_env_overrides().unwrap();
        assert_eq!(cfg.node_id, "from-env");
        std::env::remove_var("MORM_NODE_ID");
    }
}
