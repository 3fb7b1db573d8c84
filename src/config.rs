//! Configuration for the respd server.
//!
//! Settings come from an optional `redis.conf` style file and from the
//! command line. CLI arguments take precedence over file values, which take
//! precedence over the defaults.
//!
//! The file holds one `directive value` pair per line:
//!
//! ```text
//! # listen on every interface
//! bind 0.0.0.0
//! port 6379
//! loglevel debug
//! ```

use crate::server;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Config file read from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "redis.conf";

/// Command-line arguments for the server
#[derive(Parser, Debug, Default)]
#[command(name = "respd")]
#[command(version)]
#[command(about = "An in-memory key-value server speaking RESP", long_about = None)]
pub struct CliArgs {
    /// Path to a redis.conf style configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: directive '{key}' needs a value")]
    MissingValue { line: usize, key: String },

    #[error("line {line}: invalid value '{value}' for '{key}'")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    pub bind: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
        }
    }
}

impl ServerProperties {
    /// Resolves the configuration for `cli`.
    ///
    /// An explicit `--config` must exist; the default `redis.conf` is only
    /// read when present.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut props = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if let Some(bind) = &cli.bind {
            props.bind = bind.clone();
        }
        if let Some(port) = cli.port {
            props.port = port;
        }
        if let Some(level) = &cli.log_level {
            props.log_level = level.clone();
        }
        Ok(props)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parses `redis.conf` directives on top of the defaults. Unknown
    /// directives are skipped with a warning.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut props = Self::default();

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let mut parts = text.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default().to_ascii_lowercase();
            let value = parts.next().map(str::trim).unwrap_or_default();
            if value.is_empty() {
                return Err(ConfigError::MissingValue { line, key });
            }

            match key.as_str() {
                "bind" => props.bind = value.to_string(),
                "port" => {
                    props.port = value.parse().map_err(|_| ConfigError::InvalidValue {
                        line,
                        key: key.clone(),
                        value: value.to_string(),
                    })?
                }
                "loglevel" => props.log_level = value.to_string(),
                _ => warn!(line, directive = %key, "Ignoring unknown config directive"),
            }
        }

        Ok(props)
    }

    /// The `host:port` listen address.
    pub fn address(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    pub fn server_config(&self) -> server::Config {
        server::Config {
            address: self.address(),
        }
    }
}
