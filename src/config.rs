//! Command line, environment and config file settings for both binaries
//!
//! Every setting is resolved from the first layer that names it:
//!
//! 1. command line flag
//! 2. environment variable
//! 3. JSON config file (`-c/--config` or `CONFIG`)
//! 4. built-in default
//!
//! clap covers the first two layers; [`AgentArgs::resolve`] and
//! [`CollectorArgs::resolve`] fold in the file and the defaults and validate
//! the result.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use ipnet::IpNet;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::trace;

use crate::agent::DispatchSettings;
use crate::api::{ApiConfig, IngressSecurity};
use crate::storage::StorageSettings;
use crate::transport::DeliveryTransport;
use crate::transport::crypto::{CryptoError, Decryptor, Encryptor};
use crate::transport::signing::{SigningKey, SigningKeyError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid trusted subnet {0:?}")]
    InvalidSubnet(String),

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error(transparent)]
    Key(#[from] CryptoError),

    #[error(transparent)]
    SigningKey(#[from] SigningKeyError),
}

fn read_config_file<T: for<'de> Deserialize<'de> + std::fmt::Debug>(
    path: &Path,
) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
        .inspect(|config| trace!("loaded config file: {config:?}"))
}

fn load_file<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + std::fmt::Debug + Default,
{
    match path {
        Some(path) => read_config_file(path),
        None => Ok(T::default()),
    }
}

fn parse_log_level(raw: &str) -> Result<LevelFilter, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidLogLevel(raw.to_string()))
}

fn check_address(address: &str) -> Result<(), ConfigError> {
    let valid = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidAddress(address.to_string()))
    }
}

fn seconds(value: u64, name: &'static str) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero(name));
    }
    Ok(Duration::from_secs(value))
}

/// Drop empty strings so `KEY=` behaves like an unset variable.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Metrics agent: samples this host and ships batches to a collector
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tally-agent", version)]
pub struct AgentArgs {
    /// JSON config file
    #[arg(short = 'c', long = "config", env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Collector address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between samples
    #[arg(short = 'p', long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds between reports
    #[arg(short = 'r', long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Number of concurrent sender workers
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    pub rate_limit: Option<usize>,

    /// Shared secret for HashSHA256 signatures
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Collector public key (PEM)
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Address announced in X-Real-IP (detected when absent)
    #[arg(long, env = "REAL_IP")]
    pub real_ip: Option<IpAddr>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentFile {
    pub address: Option<String>,
    pub poll_interval: Option<u64>,
    pub report_interval: Option<u64>,
    pub rate_limit: Option<usize>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub real_ip: Option<IpAddr>,
    pub log_level: Option<String>,
}

/// Resolved agent settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub rate_limit: usize,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub real_ip: Option<IpAddr>,
    pub log_level: LevelFilter,
}

impl AgentArgs {
    pub fn resolve(self) -> Result<AgentConfig, ConfigError> {
        let file: AgentFile = load_file(self.config.as_deref())?;
        self.merge(file)
    }

    fn merge(self, file: AgentFile) -> Result<AgentConfig, ConfigError> {
        let address = non_empty(self.address)
            .or(non_empty(file.address))
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        check_address(address.trim_start_matches("http://").trim_start_matches("https://"))?;

        let poll_interval = seconds(
            self.poll_interval.or(file.poll_interval).unwrap_or(2),
            "poll interval",
        )?;
        let report_interval = seconds(
            self.report_interval.or(file.report_interval).unwrap_or(10),
            "report interval",
        )?;

        let rate_limit = self.rate_limit.or(file.rate_limit).unwrap_or(2);
        if rate_limit == 0 {
            return Err(ConfigError::Zero("rate limit"));
        }

        let log_level = parse_log_level(
            &non_empty(self.log_level)
                .or(non_empty(file.log_level))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        )?;

        Ok(AgentConfig {
            address,
            poll_interval,
            report_interval,
            rate_limit,
            key: non_empty(self.key).or(non_empty(file.key)),
            crypto_key: self.crypto_key.or(file.crypto_key),
            real_ip: self.real_ip.or(file.real_ip),
            log_level,
        })
    }
}

impl AgentConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            poll_interval: self.poll_interval,
            report_interval: self.report_interval,
            rate_limit: self.rate_limit,
        }
    }

    /// Build the delivery transport, loading key material.
    ///
    /// `detected_ip` is used for `X-Real-IP` when no address was configured.
    pub fn transport(&self, detected_ip: Option<IpAddr>) -> anyhow::Result<DeliveryTransport> {
        let mut transport = DeliveryTransport::new(&self.address)?;

        if let Some(key) = &self.key {
            transport = transport.with_signing_key(SigningKey::new(key)?);
        }
        if let Some(path) = &self.crypto_key {
            transport = transport.with_encryptor(Encryptor::from_pem_file(path)?);
        }
        if let Some(ip) = self.real_ip.or(detected_ip) {
            transport = transport.with_real_ip(ip);
        }

        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Metrics collector: accepts updates and serves the merged state
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tally-collector", version)]
pub struct CollectorArgs {
    /// JSON config file
    #[arg(short = 'c', long = "config", env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between snapshots; 0 writes on every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot file
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Load the snapshot file on startup
    #[arg(short = 'r', long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// SQLite database; replaces the snapshot file when set
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Shared secret for HashSHA256 signatures
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Private key (PEM) for encrypted bodies
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Only accept requests whose X-Real-IP lies in this CIDR
    #[arg(short = 't', long, env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: Option<u64>,

    #[arg(short = 'l', long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectorFile {
    pub address: Option<String>,
    pub store_interval: Option<u64>,
    pub file_storage_path: Option<PathBuf>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
    pub shutdown_timeout: Option<u64>,
    pub log_level: Option<String>,
}

/// Resolved collector settings
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub address: String,
    pub storage: StorageSettings,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<IpNet>,
    pub shutdown_timeout: Duration,
    pub log_level: LevelFilter,
}

impl CollectorArgs {
    pub fn resolve(self) -> Result<CollectorConfig, ConfigError> {
        let file: CollectorFile = load_file(self.config.as_deref())?;
        self.merge(file)
    }

    fn merge(self, file: CollectorFile) -> Result<CollectorConfig, ConfigError> {
        let address = non_empty(self.address)
            .or(non_empty(file.address))
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        check_address(&address)?;

        let trusted_subnet = non_empty(self.trusted_subnet)
            .or(non_empty(file.trusted_subnet))
            .map(|raw| {
                raw.parse::<IpNet>()
                    .map_err(|_| ConfigError::InvalidSubnet(raw.clone()))
            })
            .transpose()?;

        let shutdown_timeout = seconds(
            self.shutdown_timeout.or(file.shutdown_timeout).unwrap_or(10),
            "shutdown timeout",
        )?;

        let log_level = parse_log_level(
            &non_empty(self.log_level)
                .or(non_empty(file.log_level))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        )?;

        let storage = StorageSettings {
            file_storage_path: self
                .file_storage_path
                .or(file.file_storage_path)
                .unwrap_or_else(|| PathBuf::from("data.json")),
            restore: self.restore.or(file.restore).unwrap_or(true),
            store_interval: Duration::from_secs(
                self.store_interval.or(file.store_interval).unwrap_or(300),
            ),
            database_dsn: non_empty(self.database_dsn).or(non_empty(file.database_dsn)),
        };

        Ok(CollectorConfig {
            address,
            storage,
            key: non_empty(self.key).or(non_empty(file.key)),
            crypto_key: self.crypto_key.or(file.crypto_key),
            trusted_subnet,
            shutdown_timeout,
            log_level,
        })
    }
}

impl CollectorConfig {
    /// Resolve the listen address to a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::InvalidAddress(self.address.clone()))
    }

    /// Load key material for the ingress stages.
    pub fn security(&self) -> Result<IngressSecurity, ConfigError> {
        let signing_key = self.key.as_deref().map(SigningKey::new).transpose()?;
        let decryptor = self
            .crypto_key
            .as_ref()
            .map(Decryptor::from_pem_file)
            .transpose()?;

        Ok(IngressSecurity {
            trusted_subnet: self.trusted_subnet,
            decryptor: decryptor.map(std::sync::Arc::new),
            signing_key,
        })
    }

    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        Ok(ApiConfig::new(self.bind_addr()?).with_security(self.security()?))
    }
}
