//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial document deserializes fine:
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json(r#"{ "reentry_limit": 10 }"#)?;
/// let runtime = Runtime::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times one reaction may fire inside a single outermost batch
    /// before it is treated as a cycle.
    pub reentry_limit: u32,

    /// Prefix for the generated labels of unlabeled nodes.
    pub label_prefix: String,
}

impl RuntimeConfig {
    pub const DEFAULT_REENTRY_LIMIT: u32 = 100;

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reentry_limit: Self::DEFAULT_REENTRY_LIMIT,
            label_prefix: "ripple".to_string(),
        }
    }
}
