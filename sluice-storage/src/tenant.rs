//! Multi-tenancy support
//!
//! Every run executes inside a physical schema owned by one tenant. Tenant
//! identifiers and derived schema names are both constrained to the
//! unquoted-SQL-identifier grammar so they can be embedded in DDL safely.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Invalid regex pattern"));

/// Whether a string is safe to embed as an unquoted SQL identifier
pub(crate) fn is_identifier(candidate: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(candidate)
}

/// Tenant identifier for multi-tenant isolation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Create a tenant ID, validating the identifier grammar
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if !is_identifier(&id) {
            return Err(crate::Error::ValidationError(format!(
                "tenant id `{id}` is not a valid SQL identifier"
            )));
        }
        Ok(Self(id))
    }

    /// Get the tenant ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The name of one run's isolated schema: `{tenant}_{pipeline_slug}_run_{id8}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaName(String);

impl SchemaName {
    /// Derive the schema name for a run
    pub fn derive(tenant: &TenantId, pipeline_slug: &str, run_id: Uuid) -> crate::Result<Self> {
        if !is_identifier(pipeline_slug) {
            return Err(crate::Error::ValidationError(format!(
                "pipeline slug `{pipeline_slug}` is not a valid SQL identifier"
            )));
        }
        let short = run_id.simple().to_string();
        let name = format!("{}_{}_run_{}", tenant.as_str(), pipeline_slug, &short[..8]);
        Ok(Self(name))
    }

    /// Wrap an already-derived name, re-validating the grammar
    pub fn parse(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(crate::Error::ValidationError(format!(
                "schema name `{name}` is not a valid SQL identifier"
            )));
        }
        Ok(Self(name))
    }

    /// Get the schema name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
