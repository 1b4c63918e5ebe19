//! Client configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/samo/config.toml)
//! 3. Environment variables (SAMO_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "SAMO";

/// Timer intervals used by the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait before retrying after an unexpected close
    pub reconnect_interval: Duration,
    /// Give up on an opening socket after this long
    pub open_timeout: Duration,
    /// How often a resume checks whether the frozen socket has closed
    pub resume_poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            open_timeout: Duration::from_millis(DEFAULT_OPEN_TIMEOUT_MS),
            resume_poll_interval: Duration::from_millis(DEFAULT_RESUME_POLL_MS),
        }
    }
}

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3000;
const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5000;
const DEFAULT_RESUME_POLL_MS: u64 = 500;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default address to subscribe to (host[:port]/mode/key)
    #[serde(default)]
    pub address: Option<String>,

    /// Use wss:// and https://
    #[serde(default)]
    pub tls: bool,

    /// WebSocket sub-protocols to request
    #[serde(default)]
    pub protocols: Vec<String>,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_resume_poll_ms")]
    pub resume_poll_ms: u64,

    /// Log level for the CLI (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            tls: false,
            protocols: Vec::new(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            resume_poll_ms: DEFAULT_RESUME_POLL_MS,
            log_level: default_log_level(),
        }
    }
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_open_timeout_ms() -> u64 {
    DEFAULT_OPEN_TIMEOUT_MS
}

fn default_resume_poll_ms() -> u64 {
    DEFAULT_RESUME_POLL_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SAMO_ADDRESS, SAMO_TLS, SAMO_*_MS, SAMO_LOG_LEVEL)
    /// 2. Config file (~/.config/samo/config.toml or SAMO_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path if given, otherwise the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resume_poll_ms == 0 {
            bail!("resume_poll_ms must be greater than zero");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_ADDRESS", ENV_PREFIX)) {
            self.address = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_TLS", ENV_PREFIX)) {
            self.tls = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // Unparseable numbers are ignored rather than failing the load
        if let Some(ms) = env_millis("RECONNECT_INTERVAL_MS") {
            self.reconnect_interval_ms = ms;
        }
        if let Some(ms) = env_millis("OPEN_TIMEOUT_MS") {
            self.open_timeout_ms = ms;
        }
        if let Some(ms) = env_millis("RESUME_POLL_MS").filter(|&ms| ms > 0) {
            self.resume_poll_ms = ms;
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.log_level = val;
            }
        }
    }

    /// Timer intervals for the client
    pub fn timings(&self) -> Timings {
        Timings {
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            resume_poll_interval: Duration::from_millis(self.resume_poll_ms),
        }
    }

    /// Set a value by key name, as given on the command line
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parse_ms = |value: &str| -> Result<u64> {
            value
                .parse()
                .with_context(|| format!("Invalid value for {}. Use milliseconds.", key))
        };

        match key {
            "address" => {
                self.address = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "tls" => {
                self.tls = value
                    .parse()
                    .context("Invalid value for tls. Use 'true' or 'false'.")?;
            }
            "protocols" => {
                self.protocols = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "reconnect_interval_ms" => self.reconnect_interval_ms = parse_ms(value)?,
            "open_timeout_ms" => self.open_timeout_ms = parse_ms(value)?,
            "resume_poll_ms" => {
                let ms = parse_ms(value)?;
                if ms == 0 {
                    bail!("Invalid value for resume_poll_ms. Use at least 1 millisecond.");
                }
                self.resume_poll_ms = ms;
            }
            "log_level" => self.log_level = value.to_string(),
            _ => {
                bail!(
                    "Unknown configuration key: '{}'\n\
                     Valid keys: address, tls, protocols, reconnect_interval_ms, \
                     open_timeout_ms, resume_poll_ms, log_level",
                    key
                );
            }
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SAMO_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("samo")
            .join("config.toml")
    }
}

fn env_millis(name: &str) -> Option<u64> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .and_then(|val| val.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SAMO_ADDRESS",
        "SAMO_TLS",
        "SAMO_RECONNECT_INTERVAL_MS",
        "SAMO_OPEN_TIMEOUT_MS",
        "SAMO_RESUME_POLL_MS",
        "SAMO_LOG_LEVEL",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.address.is_none());
        assert!(!config.tls);
        assert_eq!(config.timings(), Timings::default());
        assert_eq!(Timings::default().reconnect_interval, Duration::from_secs(3));
        assert_eq!(Timings::default().open_timeout, Duration::from_secs(5));
        assert_eq!(Timings::default().resume_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_env_override_address_and_tls() {
        let _guard = EnvGuard::new(ENV_VARS);
        let mut config = Config::default();

        env::set_var("SAMO_ADDRESS", "localhost:8880/sa/box");
        env::set_var("SAMO_TLS", "1");
        config.apply_env_overrides();
        assert_eq!(config.address.as_deref(), Some("localhost:8880/sa/box"));
        assert!(config.tls);

        // Empty string clears it
        env::set_var("SAMO_ADDRESS", "");
        env::set_var("SAMO_TLS", "false");
        config.apply_env_overrides();
        assert!(config.address.is_none());
        assert!(!config.tls);
    }

    #[test]
    fn test_env_override_timings() {
        let _guard = EnvGuard::new(ENV_VARS);
        let mut config = Config::default();

        env::set_var("SAMO_RECONNECT_INTERVAL_MS", "100");
        env::set_var("SAMO_OPEN_TIMEOUT_MS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.timings().reconnect_interval, Duration::from_millis(100));
        assert_eq!(config.open_timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            address = "example.com/mo/things"
            tls = true
            protocols = ["samo"]
            resume_poll_ms = 250
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.address.as_deref(), Some("example.com/mo/things"));
        assert!(config.tls);
        assert_eq!(config.protocols, vec!["samo".to_string()]);
        assert_eq!(config.resume_poll_ms, 250);
        assert_eq!(config.reconnect_interval_ms, 3000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set_value("address", "localhost:8880/time").unwrap();
        config.set_value("protocols", "a, b,").unwrap();
        config.set_value("open_timeout_ms", "1500").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.protocols, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set_value("tls", "maybe").is_err());
        assert!(config.set_value("resume_poll_ms", "-1").is_err());
        assert!(config.set_value("favorite_tag", "x").is_err());

        config.set_value("address", "none").unwrap();
        assert!(config.address.is_none());
    }

    #[test]
    fn test_zero_resume_poll_rejected() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.set_value("resume_poll_ms", "0").is_err());
        assert_eq!(config.resume_poll_ms, 500);

        env::set_var("SAMO_RESUME_POLL_MS", "0");
        config.apply_env_overrides();
        assert_eq!(config.resume_poll_ms, 500);
        env::remove_var("SAMO_RESUME_POLL_MS");

        assert!(Config::load_from_str("resume_poll_ms = 0").is_err());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "resume_poll_ms = 0\n").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }
}
