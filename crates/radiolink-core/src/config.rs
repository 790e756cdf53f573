//! Configuration for the plugin subsystem.
//!
//! Defaults live in [`defaults`], environment variable names in [`env_vars`].
//! Both structs can be read from TOML and then overlaid from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default values.
pub mod defaults {
    /// Pause before a supervised task is restarted.
    pub const RESTART_DELAY_MS: u64 = 250;
}

/// Environment variable names.
pub mod env_vars {
    /// TOML file with a `[plugins]` and/or `[supervisor]` table.
    pub const CONFIG_FILE: &str = "RADIOLINK_PLUGIN_CONFIG";
    /// Path list (platform separator) of directories plugins may be loaded from.
    pub const PLUGIN_DIRS: &str = "RADIOLINK_PLUGIN_DIRS";
    pub const RESTART_DELAY_MS: &str = "RADIOLINK_RESTART_DELAY_MS";
    pub const MAX_RESTARTS: &str = "RADIOLINK_MAX_RESTARTS";
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiolinkConfig {
    pub plugins: PluginConfig,
    pub supervisor: SupervisorConfig,
}

impl RadiolinkConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `RADIOLINK_PLUGIN_CONFIG` (if any), then apply
    /// the individual environment overrides.
    ///
    /// A broken config file is logged and ignored so the host still starts.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os(env_vars::CONFIG_FILE) {
            Some(path) => Self::from_file(&path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring plugin config file");
                Self::default()
            }),
            None => Self::default(),
        };
        config.plugins.apply_env();
        config.supervisor.apply_env();
        config
    }
}

/// Plugin loading policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directories plugins may be loaded from. Empty means unrestricted.
    pub allowed_dirs: Vec<PathBuf>,
}

impl PluginConfig {
    /// Defaults overlaid from the environment.
    pub fn from_env() -> Self {
        RadiolinkConfig::from_env().plugins
    }

    /// Add an allowed directory.
    pub fn with_allowed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_dirs.push(dir.into());
        self
    }

    /// Check a canonical plugin path against the allowed directories.
    pub fn is_path_allowed(&self, canonical: &Path) -> bool {
        if self.allowed_dirs.is_empty() {
            return true;
        }
        self.allowed_dirs.iter().any(|dir| {
            dir.canonicalize()
                .map(|dir| canonical.starts_with(dir))
                .unwrap_or(false)
        })
    }

    fn apply_env(&mut self) {
        if let Some(dirs) = std::env::var_os(env_vars::PLUGIN_DIRS) {
            self.allowed_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
    }
}

/// Restart policy for supervised plugin tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Pause between an unexpected exit and the restart.
    pub restart_delay_ms: u64,
    /// Give up after this many restarts. `None` restarts forever.
    pub max_restarts: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: defaults::RESTART_DELAY_MS,
            max_restarts: None,
        }
    }
}

impl SupervisorConfig {
    /// Defaults overlaid from the environment.
    pub fn from_env() -> Self {
        RadiolinkConfig::from_env().supervisor
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    fn apply_env(&mut self) {
        if let Some(delay) = env_number::<u64>(env_vars::RESTART_DELAY_MS) {
            self.restart_delay_ms = delay;
        }
        if let Some(max) = env_number::<u32>(env_vars::MAX_RESTARTS) {
            self.max_restarts = Some(max);
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Ignoring non-numeric environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RadiolinkConfig::default();
        assert!(config.plugins.allowed_dirs.is_empty());
        assert_eq!(config.supervisor.restart_delay(), Duration::from_millis(250));
        assert_eq!(config.supervisor.max_restarts, None);
    }

    #[test]
    fn test_from_toml() {
        let config = RadiolinkConfig::from_toml_str(
            r#"
            [plugins]
            allowed_dirs = ["/usr/lib/radiolink/plugins"]

            [supervisor]
            restart_delay_ms = 10
            max_restarts = 3
            "#,
        )
        .unwrap();

        assert_eq!(
            config.plugins.allowed_dirs,
            vec![PathBuf::from("/usr/lib/radiolink/plugins")]
        );
        assert_eq!(config.supervisor.restart_delay_ms, 10);
        assert_eq!(config.supervisor.max_restarts, Some(3));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RadiolinkConfig::from_toml_str("[supervisor]\nmax_restarts = 1\n").unwrap();
        assert_eq!(config.supervisor.restart_delay_ms, defaults::RESTART_DELAY_MS);
        assert_eq!(config.supervisor.max_restarts, Some(1));
    }

    #[test]
    fn test_invalid_toml() {
        let err = RadiolinkConfig::from_toml_str("[supervisor]\nrestart_delay_ms = \"soon\"\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = RadiolinkConfig::from_file("/nonexistent/radiolink.toml");
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_path_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().canonicalize().unwrap().join("series2.so");

        assert!(PluginConfig::default().is_path_allowed(&inside));

        let config = PluginConfig::default().with_allowed_dir(dir.path());
        assert!(config.is_path_allowed(&inside));
        assert!(!config.is_path_allowed(Path::new("/elsewhere/series2.so")));
    }
}
