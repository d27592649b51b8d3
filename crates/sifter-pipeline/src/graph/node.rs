use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use sifter_core::error::SifterError;

use super::state::{Field, PipelineState, StateUpdate};

/// Identity of a node in the literature graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeId {
    Retrieve,
    Classify,
    Extract,
    Validate,
    Refine,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Retrieve => "retrieve",
            NodeId::Classify => "classify",
            NodeId::Extract => "extract",
            NodeId::Validate => "validate",
            NodeId::Refine => "refine",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node that could not produce an update.
///
/// The executor logs it and continues as if the node returned an empty update.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Collaborator(#[from] SifterError),
    #[error("{0}")]
    Invalid(String),
}

/// A processing step of the graph.
///
/// A node reads the current state and returns only the fields it changes.
/// Those fields must be a subset of [`Node::writes`].
pub trait Node: Send + Sync + 'static {
    fn id(&self) -> NodeId;

    /// Fields this node may set.
    fn writes(&self) -> &'static [Field];

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>>;
}
