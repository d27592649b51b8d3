use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::executor::ExecutorError;
use super::node::NodeId;
use super::state::{Field, PipelineState};

/// Where control goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Node(NodeId),
    /// Terminal marker. Has no outgoing edges.
    End,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Node(id) => write!(f, "{}", id),
            Target::End => f.write_str("END"),
        }
    }
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Node(id)
    }
}

/// A named decision over the merged state.
pub trait Predicate: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Every outcome `evaluate` can return.
    fn outcomes(&self) -> &[&'static str];

    /// Fields the decision depends on.
    fn reads(&self) -> &[Field];

    fn evaluate(&self, state: &PipelineState) -> &'static str;
}

type Decide = dyn Fn(&PipelineState) -> &'static str + Send + Sync;

/// A predicate backed by a closure.
pub struct FnPredicate {
    name: String,
    outcomes: Vec<&'static str>,
    reads: Vec<Field>,
    decide: Box<Decide>,
}

impl FnPredicate {
    pub fn new<F>(
        name: impl Into<String>,
        outcomes: &[&'static str],
        reads: &[Field],
        decide: F,
    ) -> Self
    where
        F: Fn(&PipelineState) -> &'static str + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            outcomes: outcomes.to_vec(),
            reads: reads.to_vec(),
            decide: Box::new(decide),
        }
    }
}

impl Predicate for FnPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn outcomes(&self) -> &[&'static str] {
        &self.outcomes
    }

    fn reads(&self) -> &[Field] {
        &self.reads
    }

    fn evaluate(&self, state: &PipelineState) -> &'static str {
        (self.decide)(state)
    }
}

/// How to pick the successor of a node.
#[derive(Clone)]
pub enum Route {
    /// Always taken.
    Always(Target),
    /// Evaluate the predicate and follow the branch named by its outcome.
    Branch {
        predicate: Arc<dyn Predicate>,
        branches: HashMap<&'static str, Target>,
    },
}

impl Route {
    /// Resolve the next target against the post-merge state.
    pub fn resolve(&self, state: &PipelineState) -> Result<Target, ExecutorError> {
        match self {
            Route::Always(target) => Ok(*target),
            Route::Branch {
                predicate,
                branches,
            } => {
                let outcome = predicate.evaluate(state);
                branches
                    .get(outcome)
                    .copied()
                    .ok_or_else(|| ExecutorError::UnknownBranch {
                        predicate: predicate.name().to_string(),
                        outcome: outcome.to_string(),
                    })
            }
        }
    }

    /// Every target this route can lead to.
    pub fn targets(&self) -> Vec<Target> {
        match self {
            Route::Always(target) => vec![*target],
            Route::Branch { branches, .. } => branches.values().copied().collect(),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Always(target) => f.debug_tuple("Always").field(target).finish(),
            Route::Branch {
                predicate,
                branches,
            } => f
                .debug_struct("Branch")
                .field("predicate", &predicate.name())
                .field("branches", branches)
                .finish(),
        }
    }
}

/// An outgoing route from one node.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeId,
    pub route: Route,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: NodeId, to: impl Into<Target>) -> Self {
        Self {
            from,
            route: Route::Always(to.into()),
        }
    }

    /// Create a conditional edge with one branch per predicate outcome.
    pub fn branch(
        from: NodeId,
        predicate: Arc<dyn Predicate>,
        branches: impl IntoIterator<Item = (&'static str, Target)>,
    ) -> Self {
        Self {
            from,
            route: Route::Branch {
                predicate,
                branches: branches.into_iter().collect(),
            },
        }
    }
}
