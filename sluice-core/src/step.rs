//! Step definitions
//!
//! A step is one named transformation inside a pipeline: a kind tag, a SQL
//! template, a parameter map, an optional object-store file reference, and
//! business-rule validations that run after the step body.

use crate::objectref::ObjectRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub Uuid);

impl StepId {
    /// Create a new random step ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed enumeration of step kinds.
///
/// The serialized tags are wire-stable; `validation` and `quality-report`
/// exist only for internal dispatch and are never user-selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    SchemaMigration,
    AutoLoad,
    BulkImport,
    SqlStatement,
    BulkExport,
    Validation,
    QualityReport,
}

impl StepKind {
    /// The wire-stable tag string for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            StepKind::SchemaMigration => "schema-migration",
            StepKind::AutoLoad => "auto-load",
            StepKind::BulkImport => "bulk-import",
            StepKind::SqlStatement => "sql-statement",
            StepKind::BulkExport => "bulk-export",
            StepKind::Validation => "validation",
            StepKind::QualityReport => "quality-report",
        }
    }

    /// Parse a wire tag back into a kind
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag {
            "schema-migration" => Some(StepKind::SchemaMigration),
            "auto-load" => Some(StepKind::AutoLoad),
            "bulk-import" => Some(StepKind::BulkImport),
            "sql-statement" => Some(StepKind::SqlStatement),
            "bulk-export" => Some(StepKind::BulkExport),
            "validation" => Some(StepKind::Validation),
            "quality-report" => Some(StepKind::QualityReport),
            _ => None,
        }
    }

    /// Kinds a pipeline author may assign to a step
    pub fn user_selectable(&self) -> bool {
        !matches!(self, StepKind::Validation | StepKind::QualityReport)
    }

    /// Kinds that read a file from the object store
    pub fn is_import(&self) -> bool {
        matches!(self, StepKind::AutoLoad | StepKind::BulkImport)
    }

    /// Kinds that write a file to the object store
    pub fn is_export(&self) -> bool {
        matches!(self, StepKind::BulkExport)
    }

    /// Kinds that require an object-store file reference
    pub fn requires_object_ref(&self) -> bool {
        self.is_import() || self.is_export()
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A named business-rule query attached to a step.
///
/// The query returns the identifiers of rows that violate the rule; a
/// non-empty result fails the step. Parameters default from the owning
/// step's parameter map, with the validation's own entries winning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepValidation {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StepValidation {
    /// Create an enabled validation
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            params: Map::new(),
            enabled: true,
        }
    }

    /// Set the validation's own parameters
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Enable or disable the validation
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Step params merged under the validation's own params
    pub fn effective_params(&self, step_params: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = step_params.clone();
        for (key, value) in &self.params {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// One transformation step belonging to a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,

    /// Case-insensitively unique display name
    pub name: String,

    pub kind: StepKind,

    /// SQL template; interpolated at plan-compile time except for
    /// schema migrations, which run verbatim
    pub sql: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    /// Required for import/export kinds, cleared otherwise
    #[serde(default)]
    pub object_ref: Option<ObjectRef>,

    #[serde(default)]
    pub validations: Vec<StepValidation>,
}

impl Step {
    /// Create a step with the given name, kind, and SQL template
    pub fn new(name: impl Into<String>, kind: StepKind, sql: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            kind,
            sql: sql.into(),
            params: Map::new(),
            object_ref: None,
            validations: Vec::new(),
        }
    }

    /// Set the parameter map
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Set the object-store file reference
    pub fn with_object_ref(mut self, object_ref: ObjectRef) -> Self {
        self.object_ref = Some(object_ref);
        self
    }

    /// Attach a validation
    pub fn with_validation(mut self, validation: StepValidation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Normalize authored state: kinds that never touch the object store
    /// drop any stray file reference, and auto-load steps get placeholder
    /// SQL since their DDL is generated at run time.
    pub fn normalized(mut self) -> Self {
        if !self.kind.requires_object_ref() {
            self.object_ref = None;
        }
        if self.kind == StepKind::AutoLoad && self.sql.trim().is_empty() {
            self.sql = "-- Generated at run time by the auto-load runner".to_string();
        }
        self
    }

    /// Check authoring invariants for this step in isolation
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidDefinition(
                "step name may not be blank".to_string(),
            ));
        }
        if !self.kind.user_selectable() {
            return Err(crate::Error::InvalidDefinition(format!(
                "step `{}` uses internal-only kind `{}`",
                self.name, self.kind
            )));
        }
        if self.kind.requires_object_ref() && self.object_ref.is_none() {
            return Err(crate::Error::InvalidDefinition(format!(
                "step `{}` of kind `{}` requires an object-store file reference",
                self.name, self.kind
            )));
        }
        if self.sql.trim().is_empty() && self.kind != StepKind::AutoLoad {
            return Err(crate::Error::InvalidDefinition(format!(
                "step `{}` has no SQL",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in [
            StepKind::SchemaMigration,
            StepKind::AutoLoad,
            StepKind::BulkImport,
            StepKind::SqlStatement,
            StepKind::BulkExport,
            StepKind::Validation,
            StepKind::QualityReport,
        ] {
            assert_eq!(StepKind::parse_tag(kind.tag()), Some(kind));
        }
        assert_eq!(StepKind::parse_tag("mystery"), None);
    }

    #[test]
    fn test_kind_serde_uses_kebab_tags() {
        let json = serde_json::to_string(&StepKind::SchemaMigration).unwrap();
        assert_eq!(json, "\"schema-migration\"");
        let kind: StepKind = serde_json::from_str("\"bulk-export\"").unwrap();
        assert_eq!(kind, StepKind::BulkExport);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(StepKind::AutoLoad.is_import());
        assert!(StepKind::BulkImport.is_import());
        assert!(StepKind::BulkExport.is_export());
        assert!(!StepKind::SqlStatement.requires_object_ref());
        assert!(StepKind::AutoLoad.requires_object_ref());
        assert!(!StepKind::Validation.user_selectable());
        assert!(!StepKind::QualityReport.user_selectable());
        assert!(StepKind::SchemaMigration.user_selectable());
    }

    #[test]
    fn test_normalized_clears_stray_object_ref() {
        let step = Step::new("cleanup", StepKind::SqlStatement, "DELETE FROM stale")
            .with_object_ref(ObjectRef::new("bucket", "unused/path.csv"))
            .normalized();
        assert!(step.object_ref.is_none());
    }

    #[test]
    fn test_normalized_adds_auto_load_placeholder_sql() {
        let step = Step::new("load", StepKind::AutoLoad, "")
            .with_object_ref(ObjectRef::new("bucket", "loads/data.csv"))
            .normalized();
        assert!(!step.sql.is_empty());
    }

    #[test]
    fn test_validate_requires_object_ref_for_imports() {
        let step = Step::new("load", StepKind::BulkImport, "COPY t FROM STDIN WITH CSV");
        assert!(step.validate().is_err());

        let step = step.with_object_ref(ObjectRef::new("bucket", "loads/data.csv"));
        assert!(step.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_internal_kinds() {
        let step = Step::new("sneaky", StepKind::Validation, "SELECT id FROM broken");
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_effective_params_validation_wins() {
        let mut step_params = Map::new();
        step_params.insert("table_name".into(), "orders".into());
        step_params.insert("threshold".into(), 10.into());

        let validation = StepValidation::new("has rows", "SELECT 1").with_params({
            let mut p = Map::new();
            p.insert("threshold".into(), 99.into());
            p
        });

        let merged = validation.effective_params(&step_params);
        assert_eq!(merged["table_name"], "orders");
        assert_eq!(merged["threshold"], 99);
    }
}
