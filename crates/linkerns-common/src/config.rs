//! Configuration model for the isolated loader.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_NAMESPACE_COPY, HOOK_PARAM_SYMBOL, PATCHED_EXTENSION, TRAMPOLINE_SCAN_LIMIT,
};
use crate::error::{LinkerNsError, Result};

/// Tunables for symbol resolution and isolated loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Extension used for `<counter>_patched.<ext>` copies.
    pub patched_extension: String,
    /// Name given to the escaped copy of the default namespace.
    pub default_namespace_name: String,
    /// Symbol looked up in hook libraries to receive the hook parameter.
    pub hook_param_symbol: String,
    /// Maximum instruction words scanned while locating the internal open routine.
    pub trampoline_scan_limit: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            patched_extension: PATCHED_EXTENSION.into(),
            default_namespace_name: DEFAULT_NAMESPACE_COPY.into(),
            hook_param_symbol: HOOK_PARAM_SYMBOL.into(),
            trampoline_scan_limit: TRAMPOLINE_SCAN_LIMIT,
        }
    }
}

impl LoaderConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.patched_extension.is_empty() || self.patched_extension.contains('/') {
            return Err(LinkerNsError::Config {
                message: format!("invalid patched extension: {:?}", self.patched_extension),
            });
        }
        if self.default_namespace_name.is_empty() {
            return Err(LinkerNsError::Config {
                message: "default namespace name is empty".into(),
            });
        }
        if self.hook_param_symbol.is_empty() {
            return Err(LinkerNsError::Config {
                message: "hook parameter symbol is empty".into(),
            });
        }
        if self.trampoline_scan_limit == 0 {
            return Err(LinkerNsError::Config {
                message: "trampoline scan limit must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        LoaderConfig::default().validate().expect("default validates");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LoaderConfig::from_json(r#"{"patched_extension": "bin"}"#).expect("parse");
        assert_eq!(config.patched_extension, "bin");
        assert_eq!(config.hook_param_symbol, HOOK_PARAM_SYMBOL);
        assert_eq!(config.trampoline_scan_limit, TRAMPOLINE_SCAN_LIMIT);
    }

    #[test]
    fn zero_scan_limit_is_rejected() {
        let err = LoaderConfig::from_json(r#"{"trampoline_scan_limit": 0}"#).unwrap_err();
        assert!(matches!(err, LinkerNsError::Config { .. }));
    }

    #[test]
    fn extension_with_separator_is_rejected() {
        let config = LoaderConfig {
            patched_extension: "../so".into(),
            ..LoaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = LoaderConfig::from_json("{").unwrap_err();
        assert!(matches!(err, LinkerNsError::Serialization { .. }));
    }
}
