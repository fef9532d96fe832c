//! Agent configuration: structs, parsing, overlay and validation.
//!
//! Precedence is deliberate: command-line flags form the base config and
//! values from the YAML file override them where the file sets one. The
//! serde defaults are zero values so a file can only override fields it
//! actually mentions.

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ASSETS_DIR, DEFAULT_CHAIN, DEFAULT_DATABASE_PATH, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_LISTEN, DEFAULT_WINDOW_SECS,
};

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("invalid config: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid value for {field}: '{value}' (expected {expected})")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

// ── Logging enums ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Flattened JSON lines for log aggregators.
    Json,
    /// Human-readable output for development.
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

// ── Typed selector enums ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallKind {
    Iptables,
    Ipset,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Redb,
    Memory,
}

// ── Sections ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Capture device; empty selects the first usable non-loopback one.
    pub interface: String,
    /// Comma-separated CIDRs hidden from the stats view (still captured).
    pub exclude_subnets: String,
    /// Sliding-window horizon in seconds; 0 falls back to the default.
    pub window: u64,
    /// Peer idle eviction horizon in seconds; 0 falls back to the default.
    pub timeout: u64,
}

impl MonitorConfig {
    pub fn effective_window(&self) -> Duration {
        Duration::from_secs(if self.window == 0 {
            DEFAULT_WINDOW_SECS
        } else {
            self.window
        })
    }

    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(if self.timeout == 0 {
            DEFAULT_IDLE_TIMEOUT_SECS
        } else {
            self.timeout
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallConfig {
    /// Backend selector: iptables, ipset or mock.
    #[serde(rename = "type")]
    pub kind: String,
    /// Managed chain name; required for the non-mock backends.
    pub chain: String,
    /// Set base name; required for the set-backed backend.
    pub ipset: String,
}

impl FirewallConfig {
    pub fn firewall_kind(&self) -> Result<FirewallKind, ConfigError> {
        match self.kind.to_ascii_lowercase().as_str() {
            "" | "iptables" => Ok(FirewallKind::Iptables),
            "ipset" => Ok(FirewallKind::Ipset),
            "mock" => Ok(FirewallKind::Mock),
            other => Err(ConfigError::InvalidValue {
                field: "firewall.type".to_string(),
                value: other.to_string(),
                expected: "iptables, ipset, mock".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebConfig {
    /// host:port the HTTP API binds to.
    pub listen: String,
    /// Directory holding the bundled UI assets.
    pub assets: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Storage engine selector: redb or memory.
    pub driver: String,
    /// Connection fields accepted for server-style engines; the embedded
    /// drivers ignore them.
    pub host: String,
    pub port: u64,
    pub username: String,
    pub password: String,
    /// Database file path (redb driver).
    pub database: String,
    /// Optional path override, kept for DSN-style deployment scripts.
    pub dsn: String,
}

impl DatabaseConfig {
    pub fn driver_kind(&self) -> Result<DatabaseDriver, ConfigError> {
        match self.driver.to_ascii_lowercase().as_str() {
            "" | "redb" => Ok(DatabaseDriver::Redb),
            "memory" => Ok(DatabaseDriver::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "database.driver".to_string(),
                value: other.to_string(),
                expected: "redb, memory".to_string(),
            }),
        }
    }

    /// Resolved database path: the DSN wins when set.
    pub fn effective_path(&self) -> &str {
        if self.dsn.is_empty() {
            &self.database
        } else {
            &self.dsn
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub monitor: MonitorConfig,
    pub firewall: FirewallConfig,
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

impl AgentConfig {
    /// Built-in defaults; also the `config generate` output.
    pub fn with_defaults() -> Self {
        Self {
            monitor: MonitorConfig {
                interface: String::new(),
                exclude_subnets: String::new(),
                window: DEFAULT_WINDOW_SECS,
                timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            },
            firewall: FirewallConfig {
                kind: "iptables".to_string(),
                chain: DEFAULT_CHAIN.to_string(),
                ipset: String::new(),
            },
            web: WebConfig {
                listen: DEFAULT_LISTEN.to_string(),
                assets: DEFAULT_ASSETS_DIR.to_string(),
            },
            database: DatabaseConfig {
                driver: "redb".to_string(),
                database: DEFAULT_DATABASE_PATH.to_string(),
                ..Default::default()
            },
            log: LogConfig {
                level: Some(LogLevel::Info),
                format: Some(LogFormat::Text),
            },
        }
    }

    /// Load and parse a YAML config file. No validation here; callers
    /// overlay first, then validate the merged result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Overlay `file` on top of this config. File values win wherever
    /// the file sets one; unset fields (empty strings, zero numbers)
    /// leave the base untouched.
    pub fn overlay(&mut self, file: AgentConfig) {
        fn take_str(base: &mut String, file: String) {
            if !file.is_empty() {
                *base = file;
            }
        }
        fn take_u64(base: &mut u64, file: u64) {
            if file != 0 {
                *base = file;
            }
        }

        take_str(&mut self.monitor.interface, file.monitor.interface);
        take_str(
            &mut self.monitor.exclude_subnets,
            file.monitor.exclude_subnets,
        );
        take_u64(&mut self.monitor.window, file.monitor.window);
        take_u64(&mut self.monitor.timeout, file.monitor.timeout);

        take_str(&mut self.firewall.kind, file.firewall.kind);
        take_str(&mut self.firewall.chain, file.firewall.chain);
        take_str(&mut self.firewall.ipset, file.firewall.ipset);

        take_str(&mut self.web.listen, file.web.listen);
        take_str(&mut self.web.assets, file.web.assets);

        take_str(&mut self.database.driver, file.database.driver);
        take_str(&mut self.database.host, file.database.host);
        take_u64(&mut self.database.port, file.database.port);
        take_str(&mut self.database.username, file.database.username);
        take_str(&mut self.database.password, file.database.password);
        take_str(&mut self.database.database, file.database.database);
        take_str(&mut self.database.dsn, file.database.dsn);

        if file.log.level.is_some() {
            self.log.level = file.log.level;
        }
        if file.log.format.is_some() {
            self.log.format = file.log.format;
        }
    }

    /// Validate the merged config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.firewall.firewall_kind()?;
        if kind != FirewallKind::Mock && self.firewall.chain.is_empty() {
            return Err(ConfigError::Validation {
                field: "firewall.chain".to_string(),
                message: "a chain name is required for non-mock backends".to_string(),
            });
        }
        if kind == FirewallKind::Ipset && self.firewall.ipset.is_empty() {
            return Err(ConfigError::Validation {
                field: "firewall.ipset".to_string(),
                message: "a set base name is required for the ipset backend".to_string(),
            });
        }

        if !self.monitor.exclude_subnets.is_empty() {
            domain::net::parse_ip_net_list(&self.monitor.exclude_subnets).map_err(|e| {
                ConfigError::Validation {
                    field: "monitor.exclude_subnets".to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        if self.web.listen.is_empty() {
            return Err(ConfigError::Validation {
                field: "web.listen".to_string(),
                message: "a listen address is required".to_string(),
            });
        }

        let driver = self.database.driver_kind()?;
        if driver == DatabaseDriver::Redb && self.database.effective_path().is_empty() {
            return Err(ConfigError::Validation {
                field: "database.database".to_string(),
                message: "a database path is required for the redb driver".to_string(),
            });
        }

        Ok(())
    }
}
