//! Configuration management for athena-console.
//!
//! Handles loading configuration from TOML files and environment variables:
//! where the query service lives, which workgroup to use by default, and how
//! patiently to poll running executions.

use crate::error::{ConsoleError, Result};
use crate::poller::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Query service connection settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Execution polling settings.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Query service connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service endpoint. Defaults to the regional public endpoint.
    pub endpoint: Option<String>,

    /// Region used to build the default endpoint. Defaults to `us-east-1`.
    pub region: Option<String>,

    /// Workgroup used when none is given explicitly.
    pub workgroup: Option<String>,

    /// Database context for submitted queries.
    pub database: Option<String>,

    /// Result location (e.g. `s3://bucket/prefix/`). Falls back to the workgroup setting.
    pub output_location: Option<String>,

    /// Value sent as the `Authorization` header, for signing proxies that expect one.
    pub auth_header: Option<String>,

    /// Request timeout in seconds. Defaults to 30.
    pub timeout_secs: Option<u64>,
}

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl ServiceConfig {
    /// Returns the configured region, or the default one.
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Returns the endpoint to send requests to.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://athena.{}.amazonaws.com/", self.region()),
        };

        let url = Url::parse(&raw)
            .map_err(|e| ConsoleError::config(format!("Invalid endpoint '{raw}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConsoleError::config(format!(
                "Invalid endpoint scheme '{}'. Expected 'http' or 'https'",
                url.scheme()
            )));
        }

        Ok(url)
    }

    /// Applies environment variables as defaults for unset fields.
    ///
    /// Every variable only fills a field that neither the command line nor
    /// the config file set.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|name| std::env::var(name).ok());
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields = [
            (&mut self.endpoint, "ATHENA_ENDPOINT"),
            (&mut self.region, "AWS_REGION"),
            (&mut self.workgroup, "ATHENA_WORKGROUP"),
            (&mut self.output_location, "ATHENA_OUTPUT_LOCATION"),
        ];
        for (field, name) in fields {
            if field.is_none() {
                *field = lookup(name);
            }
        }
    }

    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ServiceConfig) {
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint.clone();
        }
        if other.region.is_some() {
            self.region = other.region.clone();
        }
        if other.workgroup.is_some() {
            self.workgroup = other.workgroup.clone();
        }
        if other.database.is_some() {
            self.database = other.database.clone();
        }
        if other.output_location.is_some() {
            self.output_location = other.output_location.clone();
        }
        if other.auth_header.is_some() {
            self.auth_header = other.auth_header.clone();
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
    }

    /// Returns a display-safe string (no credentials) for log output.
    pub fn display_string(&self) -> String {
        let endpoint = self
            .endpoint_url()
            .map(|u| format!("{}://{}", u.scheme(), u.host_str().unwrap_or("?")))
            .unwrap_or_else(|_| "<invalid endpoint>".to_string());
        let workgroup = self.workgroup.as_deref().unwrap_or("<first available>");
        format!("{workgroup} @ {endpoint}")
    }
}

/// How running executions are polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before the second status check, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Factor applied to the delay after every check. 1.0 polls at a fixed interval.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on the delay, in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Maximum number of status checks before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_interval_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    600
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

const MAX_MULTIPLIER: f64 = 10.0;
const MAX_INTERVAL_MS: u64 = 10 * 60 * 1000;

impl PollingConfig {
    /// Converts the settings to a validated poll policy.
    pub fn to_policy(&self) -> Result<PollPolicy> {
        if self.max_attempts == 0 {
            return Err(ConsoleError::config("polling.max_attempts must be at least 1"));
        }
        if !(1..=MAX_INTERVAL_MS).contains(&self.interval_ms) {
            return Err(ConsoleError::config(format!(
                "polling.interval_ms must be between 1 and {MAX_INTERVAL_MS}, got {}",
                self.interval_ms
            )));
        }
        if !(1.0..=MAX_MULTIPLIER).contains(&self.multiplier) {
            return Err(ConsoleError::config(format!(
                "polling.multiplier must be between 1.0 and {MAX_MULTIPLIER}, got {}",
                self.multiplier
            )));
        }
        if self.max_interval_ms > MAX_INTERVAL_MS {
            return Err(ConsoleError::config(format!(
                "polling.max_interval_ms must be at most {MAX_INTERVAL_MS}, got {}",
                self.max_interval_ms
            )));
        }

        Ok(PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            multiplier: self.multiplier,
            max_interval: Duration::from_millis(self.max_interval_ms.max(self.interval_ms)),
            max_attempts: self.max_attempts,
        })
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athena-console")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConsoleError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConsoleError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
