//! Quality-check definitions
//!
//! A quality check is an arbitrary read query attached to a pipeline; its
//! full result set is captured as a report payload when the run reaches the
//! quality-report phase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a quality check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckId(pub Uuid);

impl CheckId {
    /// Create a new random check ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A read query reported against the run's schema after all step groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
    pub id: CheckId,

    /// Case-insensitively unique display name
    pub name: String,

    pub sql: String,

    #[serde(default)]
    pub params: Map<String, Value>,
}

impl QualityCheck {
    /// Create a quality check with the given name and SQL template
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: CheckId::new(),
            name: name.into(),
            sql: sql.into(),
            params: Map::new(),
        }
    }

    /// Set the check's parameter map
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}
