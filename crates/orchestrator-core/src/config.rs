use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration for the orchestrator core and its binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub security: SecurityConfig,

    pub blob: BlobConfig,

    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub sweeper: SweeperSettings,
}

impl Config {
    /// Load configuration from a TOML file. Fails fast on any missing or
    /// malformed value so the process never reaches a partial boot.
    pub fn load(path: &str) -> Result<Self, crate::Error> {
        use crate::Error;

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the `ORCHESTRATOR_CONFIG` env var, or one of
    /// the default locations. There is no zero-config default: a database
    /// DSN, JWT secret, and blob bucket are always required.
    pub fn from_env() -> Result<Self, crate::Error> {
        use crate::Error;

        if let Ok(config_path) = std::env::var("ORCHESTRATOR_CONFIG") {
            return Self::load(&config_path);
        }

        let default_paths = [
            "./config/default.toml",
            "./config/production.toml",
            "/etc/orchestrator/config.toml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        Err(Error::Config(
            "no configuration file found; set ORCHESTRATOR_CONFIG".to_string(),
        ))
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        use crate::Error;

        if self.server.port == 0 {
            return Err(Error::Config("invalid server port".to_string()));
        }

        if self.database.pool_size == 0 {
            return Err(Error::Config("database pool size must be > 0".to_string()));
        }

        if self.security.jwt.secret.trim().is_empty() {
            return Err(Error::Config("security.jwt.secret must be set".to_string()));
        }

        if self.security.principal.email.trim().is_empty()
            || self.security.principal.password.trim().is_empty()
        {
            return Err(Error::Config(
                "security.principal.email and password must be set".to_string(),
            ));
        }

        if self.blob.bucket.trim().is_empty() {
            return Err(Error::Config("blob.bucket must be set".to_string()));
        }

        for (class, cfg) in &self.manager.classes {
            if cfg.min_capacity > cfg.max_capacity {
                return Err(Error::Config(format!(
                    "manager.classes.{}: min_capacity must be <= max_capacity",
                    class
                )));
            }
        }

        if self.manager.poll_interval_ms < 1000 {
            return Err(Error::Config(
                "manager.poll_interval_ms must be >= 1000".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_graceful_shutdown")]
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            graceful_shutdown_timeout_secs: default_graceful_shutdown(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_graceful_shutdown() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    pub database: String,
    pub username: String,
    pub password: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_pool_size() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub jwt: JwtConfig,

    /// The single service-principal account the login endpoint accepts
    /// (spec §4.7, §6.4 `auth {email, password}`) — the Capacity Manager
    /// and external workers authenticate as this principal. There is no
    /// broader user-account system (see Non-goals).
    pub principal: ServicePrincipalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePrincipalConfig {
    pub email: String,
    pub password: String,

    #[serde(default = "default_principal_id")]
    pub user_id: uuid::Uuid,
}

fn default_principal_id() -> uuid::Uuid {
    uuid::Uuid::nil()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,

    #[serde(default = "default_access_expiry_secs")]
    pub access_expiry_secs: i64,

    #[serde(default = "default_refresh_expiry_secs")]
    pub refresh_expiry_secs: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_expiry_secs: default_access_expiry_secs(),
            refresh_expiry_secs: default_refresh_expiry_secs(),
        }
    }
}

fn default_access_expiry_secs() -> i64 {
    900
}

fn default_refresh_expiry_secs() -> i64 {
    86_400
}

/// Blob store coordinates, consumed only by the Blob Locator (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub bucket: String,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    pub region: String,

    #[serde(default = "default_presign_ttl")]
    pub default_presign_ttl_secs: u64,
}

fn default_prefix() -> String {
    "jobs".to_string()
}

fn default_presign_ttl() -> u64 {
    3600
}

/// Capacity Manager configuration (spec §6.4), keyed per job class.
/// Where the Payload Registry (C1) reads its class manifest from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_classes_file")]
    pub classes_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            classes_file: default_classes_file(),
        }
    }
}

fn default_classes_file() -> String {
    "./config/classes.json".to_string()
}

/// TIMED_OUT sweeper configuration (spec §4.5.6): how long after an
/// assignment's `expires_at` the sweeper waits before declaring the job
/// timed out, and how often it checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_sweep_grace_minutes")]
    pub grace_minutes: i64,

    #[serde(default = "default_sweep_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            grace_minutes: default_sweep_grace_minutes(),
            tick_secs: default_sweep_tick_secs(),
        }
    }
}

fn default_sweep_grace_minutes() -> i64 {
    15
}

fn default_sweep_tick_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManagerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub api_endpoint: String,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub vpc_id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub classes: HashMap<String, ClassConfig>,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfig {
    pub task_definition_arn: String,
    pub cluster_arn: String,
    pub security_group: String,

    #[serde(default)]
    pub min_capacity: u32,
    pub max_capacity: u32,

    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
}

fn default_sensitivity() -> f64 {
    2.0
}

fn default_factor() -> f64 {
    5.0
}

fn default_cooldown() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "orchestrator".to_string(),
                username: "orchestrator".to_string(),
                password: "secret".to_string(),
                pool_size: 10,
            },
            logging: LoggingConfig::default(),
            security: SecurityConfig {
                jwt: JwtConfig {
                    secret: "at-least-one-character".to_string(),
                    ..JwtConfig::default()
                },
                principal: ServicePrincipalConfig {
                    email: "manager@orchestrator.invalid".to_string(),
                    password: "hunter2".to_string(),
                    user_id: default_principal_id(),
                },
            },
            blob: BlobConfig {
                bucket: "orchestrator-artifacts".to_string(),
                prefix: default_prefix(),
                region: "us-east-1".to_string(),
                default_presign_ttl_secs: default_presign_ttl(),
            },
            manager: ManagerConfig {
                poll_interval_ms: 5000,
                ..ManagerConfig::default()
            },
            registry: RegistryConfig::default(),
            sweeper: SweeperSettings::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn empty_jwt_secret_fails_fast() {
        let mut config = minimal_config();
        config.security.jwt.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_bucket_fails_fast() {
        let mut config = minimal_config();
        config.blob.bucket = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn poll_interval_below_one_second_fails() {
        let mut config = minimal_config();
        config.manager.poll_interval_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_capacity_above_max_fails() {
        let mut config = minimal_config();
        config.manager.classes.insert(
            "TEST".to_string(),
            ClassConfig {
                task_definition_arn: "arn:aws:ecs:task-def".to_string(),
                cluster_arn: "arn:aws:ecs:cluster".to_string(),
                security_group: "sg-1".to_string(),
                min_capacity: 5,
                max_capacity: 1,
                sensitivity: 2.0,
                factor: 5.0,
                cooldown_seconds: 60,
            },
        );
        assert!(config.validate().is_err());
    }
}
