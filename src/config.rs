//! Service configuration module
//!
//! Layers built-in defaults, an optional TOML file, `NCDEV_*` environment
//! variables and the `PORT` variable into a single [`AppConfig`].

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `NCDEV_NEXTCLOUD__BASE_URL`.
pub const ENV_PREFIX: &str = "NCDEV";

/// Plain variable selecting the listen port.
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream Nextcloud instance
    #[serde(default)]
    pub nextcloud: NextcloudConfig,

    /// Log sinks
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Developer tool backend
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 { 9090 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextcloudConfig {
    /// Base URL; `/status.php` is appended for the status check
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for the status check in milliseconds
    #[serde(default = "default_status_timeout")]
    pub status_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://nextcloud_app".to_string()
}

fn default_status_timeout() -> u64 { 5000 }

impl Default for NextcloudConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            status_timeout_ms: default_status_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append-only JSON-lines log file
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("mcp-server.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// Canned responses, no contact with the platform
    Simulated,
    /// Runs `occ` and reads the platform log file
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_mode")]
    pub mode: ExecutorMode,

    /// Simulated cache-clear latency
    #[serde(default = "default_cache_clear_delay")]
    pub cache_clear_delay_ms: u64,

    /// Path to the platform's `occ` console script
    #[serde(default = "default_occ_path")]
    pub occ_path: PathBuf,

    /// Interpreter used to run `occ`
    #[serde(default = "default_php_binary")]
    pub php_binary: String,

    /// Arguments passed to `occ` to clear caches
    #[serde(default = "default_cache_clear_args")]
    pub cache_clear_args: Vec<String>,

    /// Platform log file (JSON lines)
    #[serde(default = "default_platform_log")]
    pub log_file: PathBuf,

    /// Number of entries returned by the log-tail tool
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

fn default_mode() -> ExecutorMode { ExecutorMode::Simulated }
fn default_cache_clear_delay() -> u64 { 1000 }
fn default_log_tail_lines() -> usize { 5 }

fn default_occ_path() -> PathBuf {
    PathBuf::from("/var/www/html/occ")
}

fn default_php_binary() -> String {
    "php".to_string()
}

fn default_cache_clear_args() -> Vec<String> {
    vec!["maintenance:repair".to_string()]
}

fn default_platform_log() -> PathBuf {
    PathBuf::from("/var/www/html/data/nextcloud.log")
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cache_clear_delay_ms: default_cache_clear_delay(),
            occ_path: default_occ_path(),
            php_binary: default_php_binary(),
            cache_clear_args: default_cache_clear_args(),
            log_file: default_platform_log(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// When `path` is `None` the per-user default location is tried and
    /// silently skipped if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let port_override = std::env::var(PORT_ENV).ok();
        Self::load_with(path, port_override.as_deref())
    }

    fn load_with(path: Option<&Path>, port_override: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => match Self::default_path() {
                Some(default) => builder.add_source(File::from(default).required(false)),
                None => builder,
            },
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = port_override {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid {} value: {:?}", PORT_ENV, port))?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let config: AppConfig = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.nextcloud.base_url.trim().is_empty() {
            bail!("nextcloud.base_url must not be empty");
        }
        if self.nextcloud.status_timeout_ms == 0 {
            bail!("nextcloud.status_timeout_ms must be greater than zero");
        }
        if self.executor.log_tail_lines == 0 {
            bail!("executor.log_tail_lines must be greater than zero");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ncdev").join("config.toml"))
    }

    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.nextcloud.base_url, "http://nextcloud_app");
        assert_eq!(config.nextcloud.status_timeout_ms, 5000);
        assert_eq!(config.logging.file, PathBuf::from("mcp-server.log"));
        assert_eq!(config.executor.mode, ExecutorMode::Simulated);
        assert_eq!(config.executor.cache_clear_delay_ms, 1000);
        assert_eq!(config.executor.log_tail_lines, 5);
        assert_eq!(config.listen_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8181

[nextcloud]
base_url = "http://cloud.internal"

[executor]
mode = "live"
"#
        )
        .unwrap();

        let config = AppConfig::load_with(Some(file.path()), None).unwrap();
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.nextcloud.base_url, "http://cloud.internal");
        assert_eq!(config.nextcloud.status_timeout_ms, 5000);
        assert_eq!(config.executor.mode, ExecutorMode::Live);
    }

    #[test]
    fn port_variable_wins_over_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 8181").unwrap();

        let config = AppConfig::load_with(Some(file.path()), Some("7070")).unwrap();
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn rejects_unparseable_port() {
        let err = AppConfig::load_with(None, Some("ninety")).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = AppConfig::load_with(Some(Path::new("/nonexistent/ncdev.toml")), None);
        assert!(result.is_err());
    }

    #[test]
    fn validation_catches_zero_timeout() {
        let mut config = AppConfig::default();
        config.nextcloud.status_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
