//! Server configuration.
//!
//! Sources, lowest priority first:
//! - Built-in defaults
//! - TOML configuration file
//! - Environment variables (`PARLEY_PORT`, `PARLEY_LIMITS__MAX_CHANNELS`, ...)
//! - Command line arguments

use anyhow::{anyhow, Context, Result};
use parley_core::HubConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "PARLEY";

/// Files searched, in order, when no path is given.
const CONFIG_PATHS: [&str; 3] = [
    "parley.toml",
    "/etc/parley/parley.toml",
    "~/.config/parley/parley.toml",
];

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Channels created at startup.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum number of channels.
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,

    /// Maximum chat message length in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Maximum WebSocket frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Startup channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Channel names created besides `general`.
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_channels() -> usize {
    parley_core::channel::DEFAULT_MAX_CHANNELS
}

fn default_max_message_length() -> usize {
    parley_core::message::DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            channels: ChannelsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_channels: default_max_channels(),
            max_message_length: default_max_message_length(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file, the environment, and defaults.
    ///
    /// Without an explicit `path` the first existing default location is
    /// used, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value cannot be
    /// parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(expand_path(path)?),
            None => find_config_file(),
        };
        Self::build(file.as_deref(), None)
    }

    /// Layer the file and environment over the defaults.
    ///
    /// `env` replaces the process environment when given.
    fn build(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("channels.bootstrap")
                .source(env),
        );

        let config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Render the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("No address for {}:{}", self.host, self.port))
    }

    /// Get the socket address of the metrics exporter.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        let mut addr = self.bind_addr()?;
        addr.set_port(self.metrics.port);
        Ok(addr)
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.limits.max_connections,
            max_channels: self.limits.max_channels,
            max_message_length: self.limits.max_message_length,
            bootstrap_channels: self.channels.bootstrap.clone(),
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand config path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("parley-{}-{name}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.max_message_length, 2000);
        assert!(config.channels.bootstrap.is_empty());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3001);
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_channels = 50

            [channels]
            bootstrap = ["random", "Dev Chat"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_channels, 50);
        assert_eq!(config.limits.max_connections, 10_000);
        assert_eq!(config.channels.bootstrap, ["random", "Dev Chat"]);
    }

    #[test]
    fn test_build_without_sources_is_default() {
        let config = Config::build(None, env(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = temp_config(
            "env",
            "port = 4000\n\n[limits]\nmax_channels = 10\nmax_connections = 7\n",
        );

        let config = Config::build(
            Some(path.as_path()),
            env(&[
                ("PARLEY_PORT", "5000"),
                ("PARLEY_LIMITS__MAX_CHANNELS", "20"),
                ("PARLEY_CHANNELS__BOOTSTRAP", "random,dev"),
            ]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 5000);
        assert_eq!(config.limits.max_channels, 20);
        assert_eq!(config.limits.max_connections, 7);
        assert_eq!(config.channels.bootstrap, ["random", "dev"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("parley-does-not-exist.toml");
        assert!(Config::build(Some(missing.as_path()), env(&[])).is_err());
    }

    #[test]
    fn test_toml_output_reloads() {
        let mut config = Config::default();
        config.channels.bootstrap = vec!["random".into()];

        let rendered = config.to_toml().unwrap();
        let reloaded: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_hub_config() {
        let mut config = Config::default();
        config.limits.max_connections = 3;
        config.channels.bootstrap = vec!["random".into()];

        let hub = config.hub_config();
        assert_eq!(hub.max_connections, 3);
        assert_eq!(hub.bootstrap_channels, ["random"]);
    }
}
