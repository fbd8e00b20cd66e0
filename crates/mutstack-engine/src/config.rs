use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mutstack_delta::PATH_SEPARATOR;

use crate::error::{EngineError, EngineResult};

/// Engine settings, loadable from TOML.
///
/// ```toml
/// namespace = "mutstack"
/// settle_delay_ms = 100
/// max_link_depth = 16
/// remote_revert = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Flag scope the history lives under.
    pub namespace: String,
    /// Pause between embedded writes and the top-level write.
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// How many links deep a revert cascade may follow.
    pub max_link_depth: usize,
    /// Hand reverts on unowned documents to the remote reverter.
    pub remote_revert: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "mutstack".to_string(),
            settle_delay: Duration::from_millis(100),
            max_link_depth: 16,
            remote_revert: true,
        }
    }
}

impl EngineConfig {
    /// Defaults with no settle delay.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(EngineError::Config("namespace must not be empty".into()));
        }
        if self.namespace.contains(PATH_SEPARATOR) {
            return Err(EngineError::Config(format!(
                "namespace {:?} must not contain '{PATH_SEPARATOR}'",
                self.namespace
            )));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
