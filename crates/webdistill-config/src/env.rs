//! Environment variable loading, adapted from the teacher's
//! `EnvConfigLoader` (prefix + required + defaults) down to the subset
//! WebDistill's core actually needs.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

/// Environment loading errors.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("environment variable not found: {var}")]
    NotFound { var: String },
}

/// Environment configuration loader with an optional variable name prefix
/// and per-key string defaults.
pub struct EnvConfigLoader {
    prefix: Option<String>,
    defaults: HashMap<String, String>,
}

impl EnvConfigLoader {
    pub fn new() -> Self {
        Self {
            prefix: None,
            defaults: HashMap::new(),
        }
    }

    /// Set the prefix prepended (with an underscore) to every variable name
    /// looked up, e.g. `"WEBDISTILL"` turns `get("ROUTING_PATH")` into a
    /// lookup of `WEBDISTILL_ROUTING_PATH`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn default(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(var.into(), value.into());
        self
    }

    fn make_var_name(&self, var: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{var}"),
            None => var.to_string(),
        }
    }

    /// Required lookup: errors if neither the environment nor a registered
    /// default supplies a value.
    pub fn get(&self, var: &str) -> Result<String, EnvError> {
        let full_var = self.make_var_name(var);
        env::var(&full_var).or_else(|_| {
            self.defaults
                .get(var)
                .cloned()
                .ok_or(EnvError::NotFound { var: full_var })
        })
    }

    /// Optional lookup: `None` if neither the environment nor a default
    /// supplies a value.
    pub fn get_optional(&self, var: &str) -> Option<String> {
        let full_var = self.make_var_name(var);
        env::var(&full_var).ok().or_else(|| self.defaults.get(var).cloned())
    }
}

impl Default for EnvConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fills_in_when_env_var_absent() {
        let loader = EnvConfigLoader::new()
            .with_prefix("WEBDISTILL_TEST_NONCE")
            .default("FOO", "bar");
        assert_eq!(loader.get("FOO").unwrap(), "bar");
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let loader = EnvConfigLoader::new().with_prefix("WEBDISTILL_TEST_NONCE");
        assert!(matches!(
            loader.get("DEFINITELY_NOT_SET"),
            Err(EnvError::NotFound { .. })
        ));
    }
}
