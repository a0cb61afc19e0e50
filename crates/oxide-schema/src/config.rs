//! Synthesis configuration.
//!
//! Variable bindings used when compiling conditions are configuration, not
//! global state: a [`SynthesisConfig`] is handed to the
//! [`Synthesizer`](crate::synth::Synthesizer) and passed into every compile
//! call.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Options controlling migration synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Bound variables available to conditions (name to SQL expression).
    pub variables: BTreeMap<String, String>,
    /// Whether removed tables are dropped with CASCADE where supported.
    pub drop_cascade: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let variables = BTreeMap::from([
            (
                "auth.uid".to_string(),
                "current_setting('request.jwt.claim.sub', true)".to_string(),
            ),
            (
                "auth.role".to_string(),
                "current_setting('request.jwt.claim.role', true)".to_string(),
            ),
        ]);
        Self {
            variables,
            drop_cascade: true,
        }
    }
}

impl SynthesisConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable, replacing any previous binding.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.variables.insert(name.into(), sql.into());
        self
    }

    /// Reads a configuration from a JSON file. Missing keys keep their
    /// defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}
