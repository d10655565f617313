//! Pipeline definitions
//!
//! A pipeline is a named, versionable workflow of steps. Its slug doubles as
//! a SQL identifier fragment (it is embedded in run schema names), so it is
//! validated against the unquoted-identifier grammar.

use crate::graph::DependencyGraph;
use crate::params::is_sql_identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    /// Create a new random pipeline ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named workflow definition. Name and slug are case-insensitively unique
/// across the system (enforced here at definition load and by lower() unique
/// indexes in storage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,

    pub name: String,

    /// Valid SQL identifier, embedded in run schema names
    pub slug: String,

    /// Declared parameter map, merged under each step's own params at
    /// plan-compile time
    #[serde(default)]
    pub params: Map<String, Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Create a pipeline with the given name and slug
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PipelineId::new(),
            name: name.into(),
            slug: slug.into(),
            params: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the declared parameter map
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Check authoring invariants
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidDefinition(
                "pipeline name may not be blank".to_string(),
            ));
        }
        if !is_sql_identifier(&self.slug) {
            return Err(crate::Error::InvalidDefinition(format!(
                "pipeline slug `{}` is not a valid SQL identifier",
                self.slug
            )));
        }
        Ok(())
    }
}

/// Build the validated global pipeline-inclusion graph from
/// (included, including) edges.
///
/// The same builder that orders steps validates inclusions: the authoring
/// surface asks the result for `available_prerequisites` to offer only the
/// pipelines that would not close an inclusion cycle, and the compiler
/// asserts a stored inclusion set is still acyclic before merging plans.
pub fn inclusion_graph(
    pipelines: &[Pipeline],
    inclusions: &[(PipelineId, PipelineId)],
) -> crate::Result<DependencyGraph> {
    let nodes = pipelines
        .iter()
        .map(|pipeline| (pipeline.id.0, pipeline.name.clone()));
    let edges: Vec<(Uuid, Uuid)> = inclusions
        .iter()
        .map(|(included, including)| (included.0, including.0))
        .collect();
    Ok(DependencyGraph::from_edges(
        "pipeline inclusions",
        nodes,
        &edges,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slug_passes() {
        assert!(Pipeline::new("Nightly Finance", "nightly_finance").validate().is_ok());
    }

    #[test]
    fn test_invalid_slug_fails() {
        assert!(Pipeline::new("Bad", "Nightly-Finance").validate().is_err());
        assert!(Pipeline::new("Bad", "9lives").validate().is_err());
        assert!(Pipeline::new("Bad", "").validate().is_err());
    }

    #[test]
    fn test_blank_name_fails() {
        assert!(Pipeline::new("   ", "fine_slug").validate().is_err());
    }

    #[test]
    fn test_inclusion_graph_rejects_cycles() {
        let a = Pipeline::new("A", "a");
        let b = Pipeline::new("B", "b");
        let pipelines = vec![a.clone(), b.clone()];

        assert!(inclusion_graph(&pipelines, &[(a.id, b.id)]).is_ok());
        assert!(inclusion_graph(&pipelines, &[(a.id, b.id), (b.id, a.id)]).is_err());
    }

    #[test]
    fn test_inclusion_graph_eligible_prerequisites() {
        let a = Pipeline::new("A", "a");
        let b = Pipeline::new("B", "b");
        let c = Pipeline::new("C", "c");
        let pipelines = vec![a.clone(), b.clone(), c.clone()];

        // a is included by b; b may no longer be included by a's includers
        let graph = inclusion_graph(&pipelines, &[(a.id, b.id)]).unwrap();
        let eligible = graph.available_prerequisites(a.id.0).unwrap();
        assert_eq!(eligible, vec![c.id.0]);
    }
}
