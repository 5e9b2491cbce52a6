//! Layered service configuration: defaults, TOML file, `CHAINKEY_*` env, CLI.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chainkey_rpc::{RpcConfig, DEFAULT_BODY_LIMIT_BYTES};
use config::{Config, ConfigError, Environment, File as ConfigFile};

pub const DEFAULT_CONFIG_PATH: &str = "config/chainkey.toml";
pub const ENV_PREFIX: &str = "CHAINKEY";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("log_format must be `pretty` or `json`, got `{other}`"),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        f.write_str(value)
    }
}

/// Values supplied on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl AppConfig {
    /// Load from the config file (if any) and the process environment.
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        Self::load_with_env(config_path_override, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(config_path_override: Option<&str>, environment: Environment) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(environment);

        let config = builder
            .build()
            .context("failed to assemble configuration sources")?;

        let port = match get_int_value(&config, "port")? {
            Some(value) => u16::try_from(value)
                .with_context(|| format!("port {value} is out of range"))?,
            None => DEFAULT_PORT,
        };

        let body_limit_bytes = match get_int_value(&config, "body_limit_bytes")? {
            Some(value) => usize::try_from(value)
                .with_context(|| format!("body_limit_bytes {value} is out of range"))?,
            None => DEFAULT_BODY_LIMIT_BYTES,
        };

        let log_format = get_string_value(&config, "log_format")
            .map(|value| value.parse::<LogFormat>())
            .transpose()?
            .unwrap_or(LogFormat::Pretty);

        Ok(Self {
            config_path: resolved_path,
            host: get_string_value(&config, "host").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            log_level: get_string_value(&config, "log_level")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format,
            allowed_origins: get_list_value(&config, "allowed_origins")
                .unwrap_or_else(|| vec!["*".to_string()]),
            body_limit_bytes,
        })
    }

    pub fn apply_overrides(&mut self, overrides: CliOverrides) -> Result<()> {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.log_format = log_format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("host must not be empty");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level must not be empty");
        }
        if self.allowed_origins.is_empty() {
            anyhow::bail!("allowed_origins must list at least one origin (use `*` for any)");
        }
        if self.body_limit_bytes == 0 {
            anyhow::bail!("body_limit_bytes must be greater than zero");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address to probe this service on from the local machine.
    pub fn probe_addr(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        format!("{}:{}", host, self.port)
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            allowed_origins: self.allowed_origins.clone(),
            body_limit_bytes: self.body_limit_bytes,
        }
    }
}

/// `None` when the key is unset; a value that is not an integer is an error.
fn get_int_value(config: &Config, key: &str) -> Result<Option<i64>> {
    match config.get_int(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("invalid value for `{key}`")),
    }
}

fn get_string_value(config: &Config, key: &str) -> Option<String> {
    config
        .get_string(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Accepts either a TOML array or a comma separated string.
fn get_list_value(config: &Config, key: &str) -> Option<Vec<String>> {
    let values = match config.get::<Vec<String>>(key) {
        Ok(values) => values,
        Err(_) => get_string_value(config, key)?
            .split(',')
            .map(str::to_string)
            .collect(),
    };

    let values: Vec<String> = values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    (!values.is_empty()).then_some(values)
}
