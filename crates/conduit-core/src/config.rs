//! Bridge configuration.
//!
//! These structs are populated by whoever hosts the bridge; nothing here
//! discovers or reads files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Script namespace the content layer's runtime shim installs its handlers on.
pub const DEFAULT_NAMESPACE: &str = "window.NativeBridge";

/// Client-side call timeout when none is given per call.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Errors produced while building a [`BridgeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid script namespace {0:?}: expected dotted identifiers")]
    InvalidNamespace(String),
}

/// Named on/off switches used to gate module registration.
///
/// Flags that were never set count as enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags {
    flags: BTreeMap<String, bool>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.set(name, enabled);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.flags.insert(name.into(), enabled);
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(true)
    }

    /// Names explicitly switched off, sorted.
    pub fn disabled(&self) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Top-level bridge settings shared by host and client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Script namespace for delivered calls.
    pub namespace: String,
    /// Default client call timeout in milliseconds.
    pub default_timeout_ms: u64,
    /// Module feature flags.
    pub flags: FeatureFlags,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            flags: FeatureFlags::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse from JSON text, filling gaps with defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject namespaces that would corrupt the generated script text.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_valid_namespace(&self.namespace) {
            Ok(())
        } else {
            Err(ConfigError::InvalidNamespace(self.namespace.clone()))
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// A namespace is one or more dot-separated script identifiers.
pub fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
