//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSHELL_CONFIG` (environment variable)
//! 2. `~/.config/mailshell/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailshell\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Session and scheduling settings.
    pub session: SessionConfig,
    /// HTML-to-text rendering.
    pub render: RenderConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Session and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connect to the server at all. `false` runs offline from the cache.
    pub connect: bool,
    /// Folder watched by IDLE until the UI selects another one.
    pub initial_folder: String,
    /// Upper bound for a single IDLE wait before it is re-issued.
    pub idle_timeout_secs: u64,
}

/// HTML-to-text rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// External converter; the input file path is appended as last argument
    /// and the text is read from its standard output.
    pub html_to_text_cmd: String,
    /// Leading columns removed from every line of the converter output.
    pub reduce_indent: usize,
    /// Use the in-process converter instead of `html_to_text_cmd`.
    pub builtin: bool,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of headers and of bodies kept in the in-memory cache.
    pub cache_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect: true,
            initial_folder: "INBOX".to_string(),
            idle_timeout_secs: 20 * 60, // re-issue before the usual 29 min server cutoff
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            html_to_text_cmd: "lynx -assume_charset=utf-8 -display_charset=utf-8 -dump"
                .to_string(),
            reduce_indent: 3,
            builtin: false,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { cache_size: 200 }
    }
}

impl SessionConfig {
    /// IDLE timeout as a `Duration` (never zero).
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSHELL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailshell").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailshell")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailshell.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert!(cfg.session.connect);
        assert_eq!(cfg.session.initial_folder, "INBOX");
        assert_eq!(cfg.render.reduce_indent, 3);
        assert!(!cfg.render.builtin);
        assert_eq!(cfg.performance.cache_size, 200);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.render.html_to_text_cmd, cfg.render.html_to_text_cmd);
        assert_eq!(
            parsed.session.idle_timeout_secs,
            cfg.session.idle_timeout_secs
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[session]
connect = false

[render]
builtin = true
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(!cfg.session.connect);
        assert!(cfg.render.builtin);
        // Other fields use defaults
        assert_eq!(cfg.session.initial_folder, "INBOX");
        assert_eq!(cfg.render.reduce_indent, 3);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_idle_timeout_never_zero() {
        let cfg = SessionConfig {
            idle_timeout_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_log_file_in_cache_dir() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailshell-test"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mailshell-test/mailshell.log")
        );
    }
}
