//! Configuration management for WebDistill.
//!
//! Consolidates the handful of process-level knobs the core needs (routing
//! YAML path, template root, default timeout, user agent, log format) into
//! one loader that reads from environment variables with a `WEBDISTILL_`
//! prefix, mirroring the teacher's environment config loader pattern.
//!
//! The core itself never reads dotfiles or user-home paths; that is the
//! CLI collaborator's job. This crate only knows how to turn environment
//! variables (plus explicit overrides, e.g. from CLI flags) into a
//! [`CoreConfig`].

mod env;

pub use env::{EnvConfigLoader, EnvError};

use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration the Orchestrator needs to construct the routing
/// store, template store, and fetchers.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub routing_path: PathBuf,
    pub template_root: PathBuf,
    pub default_timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub max_body_bytes: usize,
    pub log_format: LogFormat,
    pub browser_attach_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            routing_path: PathBuf::from("config/routing.yaml"),
            template_root: PathBuf::from("templates"),
            default_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (compatible; WebDistill/0.1; +https://example.invalid/bot)"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
            log_format: LogFormat::Compact,
            browser_attach_endpoint: None,
        }
    }
}

impl CoreConfig {
    /// Build a `CoreConfig` from `WEBDISTILL_*` environment variables,
    /// falling back to defaults for anything unset. Never fails: an
    /// unparsable numeric variable is logged and the default is kept,
    /// matching the "never surfaced at request time" spirit applied to
    /// process bring-up as well.
    pub fn from_env() -> Self {
        let loader = EnvConfigLoader::new().with_prefix("WEBDISTILL");
        let mut config = CoreConfig::default();

        if let Some(v) = loader.get_optional("ROUTING_PATH") {
            config.routing_path = PathBuf::from(v);
        }
        if let Some(v) = loader.get_optional("TEMPLATE_ROOT") {
            config.template_root = PathBuf::from(v);
        }
        if let Some(v) = loader.get_optional("DEFAULT_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => config.default_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %v, "invalid WEBDISTILL_DEFAULT_TIMEOUT_MS, keeping default"),
            }
        }
        if let Some(v) = loader.get_optional("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = loader.get_optional("ACCEPT_LANGUAGE") {
            config.accept_language = v;
        }
        if let Some(v) = loader.get_optional("MAX_BODY_BYTES") {
            match v.parse::<usize>() {
                Ok(n) => config.max_body_bytes = n,
                Err(_) => tracing::warn!(value = %v, "invalid WEBDISTILL_MAX_BODY_BYTES, keeping default"),
            }
        }
        if let Some(v) = loader.get_optional("LOG_FORMAT") {
            config.log_format = match v.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            };
        }
        config.browser_attach_endpoint = loader.get_optional("BROWSER_ATTACH_ENDPOINT");

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeout_and_cap() {
        let config = CoreConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }
}
