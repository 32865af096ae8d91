//! TOML configuration with compiled-in defaults.
//!
//! Layering: the `PAGEWATCH_CONFIG` environment variable, then
//! `/etc/pagewatch/pagewatch.toml`, then defaults. Every section and field
//! is optional in the file; missing values fall back to the defaults below.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Root configuration for the pagewatch process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagewatchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Connection + read timeout for page fetches, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    #[serde(default = "default_robots_timeout")]
    pub timeout_secs: u64,
    /// When robots.txt cannot be fetched or parsed, treat access as allowed.
    /// Operators who want a fail-closed posture set this to false.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
    /// Identity string the consent check evaluates against robots.txt groups.
    #[serde(default = "default_robots_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the generateContent API. Overridable for self-hosted
    /// gateways and for tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Character budget for page content embedded in the prompt.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_db_path() -> String {
    "data/pagewatch.db".to_string()
}
fn default_fetch_timeout() -> u64 {
    15
}
fn default_max_redirects() -> usize {
    5
}
fn default_robots_timeout() -> u64 {
    10
}
fn default_fail_open() -> bool {
    true
}
fn default_robots_agent() -> String {
    format!("pagewatch-bot/{}", env!("CARGO_PKG_VERSION"))
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_max_content_chars() -> usize {
    8000
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    1000
}
fn default_summarizer_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_robots_timeout(),
            fail_open: default_fail_open(),
            user_agent: default_robots_agent(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            max_content_chars: default_max_content_chars(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_summarizer_timeout(),
        }
    }
}

impl PagewatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `PAGEWATCH_CONFIG` environment variable.
    /// 2. `/etc/pagewatch/pagewatch.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("PAGEWATCH_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PAGEWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/pagewatch/pagewatch.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(error = %e, "system config unreadable, using defaults");
                }
            }
        }

        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PagewatchConfig::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.fetch.timeout_secs, 15);
        assert_eq!(cfg.fetch.max_redirects, 5);
        assert_eq!(cfg.robots.timeout_secs, 10);
        assert!(cfg.robots.fail_open);
        assert_eq!(cfg.summarizer.max_content_chars, 8000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: PagewatchConfig = toml::from_str(
            r#"
            [robots]
            fail_open = false

            [summarizer]
            model = "gemini-1.5-pro"
            "#,
        )
        .unwrap();
        assert!(!cfg.robots.fail_open);
        assert_eq!(cfg.summarizer.model, "gemini-1.5-pro");
        // untouched sections keep defaults
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.summarizer.temperature, 0.2);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let cfg: PagewatchConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.storage.db_path, "data/pagewatch.db");
    }
}
