//! Operator process configuration
//!
//! Read once at startup from environment variables.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default manifest root
pub const DEFAULT_MANIFEST_DIR: &str = "/manifests";

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Operator configuration
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Root holding `packages/` and `channels/` (`MANIFEST_DIR`)
    pub manifest_dir: PathBuf,
    /// Port for `/metrics` and probes (`METRICS_PORT`)
    pub metrics_port: u16,
    /// Let the apply client validate objects (`APPLY_VALIDATE`)
    pub apply_validate: bool,
    /// Prune objects missing from the desired set (`ENABLE_PRUNE`)
    pub enable_prune: bool,
    /// Render through kustomize (`USE_KUSTOMIZE`)
    pub use_kustomize: bool,
    /// Webhook receiving apply notifications (`NOTIFY_URL`)
    pub notify_url: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
            metrics_port: DEFAULT_METRICS_PORT,
            apply_validate: true,
            enable_prune: false,
            use_kustomize: false,
            notify_url: None,
        }
    }
}

impl OperatorConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let metrics_port = match lookup("METRICS_PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::config(format!("METRICS_PORT '{}': {}", v, e)))?,
            None => defaults.metrics_port,
        };

        Ok(Self {
            manifest_dir: lookup("MANIFEST_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.manifest_dir),
            metrics_port,
            apply_validate: parse_bool("APPLY_VALIDATE", lookup("APPLY_VALIDATE"))?
                .unwrap_or(defaults.apply_validate),
            enable_prune: parse_bool("ENABLE_PRUNE", lookup("ENABLE_PRUNE"))?
                .unwrap_or(defaults.enable_prune),
            use_kustomize: parse_bool("USE_KUSTOMIZE", lookup("USE_KUSTOMIZE"))?
                .unwrap_or(defaults.use_kustomize),
            notify_url: lookup("NOTIFY_URL"),
        })
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(Error::config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<OperatorConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OperatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(load(&[]).unwrap(), OperatorConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MANIFEST_DIR", "/srv/manifests"),
            ("METRICS_PORT", "9090"),
            ("APPLY_VALIDATE", "false"),
            ("ENABLE_PRUNE", "yes"),
            ("USE_KUSTOMIZE", "1"),
            ("NOTIFY_URL", "http://hooks.local/applied"),
        ])
        .unwrap();

        assert_eq!(config.manifest_dir, PathBuf::from("/srv/manifests"));
        assert_eq!(config.metrics_port, 9090);
        assert!(!config.apply_validate);
        assert!(config.enable_prune);
        assert!(config.use_kustomize);
        assert_eq!(config.notify_url.as_deref(), Some("http://hooks.local/applied"));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = load(&[("METRICS_PORT", ""), ("NOTIFY_URL", "  ")]).unwrap();
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.notify_url, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("METRICS_PORT", "eighty")]),
            Err(Error::Config(_))
        ));
        let err = load(&[("ENABLE_PRUNE", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("ENABLE_PRUNE"));
    }
}
