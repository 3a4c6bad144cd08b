//! Configuration for Courier

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "COURIER_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// UAA (identity) configuration
    #[serde(default)]
    pub uaa: UaaConfig,

    /// Cloud Controller configuration
    #[serde(default)]
    pub cloud_controller: CloudControllerConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Delivery worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Dispatch policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// UAA configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UaaConfig {
    /// UAA base URL
    #[serde(default = "default_uaa_url")]
    pub url: String,

    /// Client id used for the client_credentials grant
    #[serde(default = "default_uaa_client_id")]
    pub client_id: String,

    /// Client secret used for the client_credentials grant
    #[serde(default)]
    pub client_secret: String,

    /// Key used to verify inbound bearer tokens (PEM for RS*, shared secret for HS*)
    pub verification_key: Option<String>,

    /// Algorithm of inbound bearer tokens
    #[serde(default = "default_verification_algorithm")]
    pub verification_algorithm: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for UaaConfig {
    fn default() -> Self {
        Self {
            url: default_uaa_url(),
            client_id: default_uaa_client_id(),
            client_secret: String::new(),
            verification_key: None,
            verification_algorithm: default_verification_algorithm(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_uaa_url() -> String {
    "http://localhost:8080/uaa".to_string()
}

fn default_uaa_client_id() -> String {
    "notifications".to_string()
}

fn default_verification_algorithm() -> String {
    "RS256".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

/// Cloud Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudControllerConfig {
    /// Cloud Controller API base URL
    #[serde(default = "default_cc_url")]
    pub url: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudControllerConfig {
    fn default() -> Self {
        Self {
            url: default_cc_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_cc_url() -> String {
    "http://localhost:9022".to_string()
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for SMTP AUTH
    pub username: Option<String>,

    /// Password for SMTP AUTH
    pub password: Option<String>,

    /// Use implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Upgrade with STARTTLS
    #[serde(default)]
    pub use_starttls: bool,

    /// Envelope and `From` address
    #[serde(default = "default_sender")]
    pub sender: String,

    /// Connection timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: false,
            sender: default_sender(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_sender() -> String {
    "no-reply@notifications.example.com".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Delivery worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum jobs processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Seconds between queue polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Jobs reserved per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Attempts before a job is failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Seconds a reserved job may stay in processing before it is requeued
    #[serde(default = "default_lease")]
    pub lease_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            lease_secs: default_lease(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_poll_interval() -> u64 {
    1
}

fn default_batch_size() -> i64 {
    50
}

fn default_max_attempts() -> i32 {
    10
}

fn default_lease() -> i64 {
    300
}

/// Dispatch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// UAA scopes held by every user; broadcasting to them is refused
    #[serde(default = "default_scopes")]
    pub default_scopes: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_scopes: default_scopes(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    [
        "cloud_controller.read",
        "cloud_controller.write",
        "openid",
        "approvals.me",
        "cloud_controller_service_permissions.read",
        "scim.me",
        "uaa.user",
        "password.write",
        "scim.userids",
        "oauth.approvals",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
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

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first file found plus `COURIER__SECTION__KEY` overrides
    pub fn load() -> crate::Result<Self> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("./config.toml"));
        paths.push(PathBuf::from("/etc/courier/config.toml"));

        let mut builder = config::Config::builder();
        if let Some(path) = paths.into_iter().find(|p| p.exists()) {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        builder
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("dispatch.default_scopes")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }

    /// Socket address the HTTP server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
