//! Graph execution engine.
//!
//! A workflow is a fixed set of [`Node`]s connected by [`Edge`]s. Each node
//! reads the shared [`PipelineState`] and returns a partial [`StateUpdate`]
//! that is merged field by field. Edges are either unconditional or branch
//! on a named [`Predicate`] evaluated against the merged state.
//!
//! The [`GraphExecutor`] validates the wiring once at construction and then
//! walks the graph from its entry node until the terminal [`Target::End`],
//! failing with [`ExecutorError::StepLimitExceeded`] if a run does not
//! converge.

pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use edge::{Edge, FnPredicate, Predicate, Route, Target};
pub use executor::{
    Execution, ExecutionResult, ExecutorError, GraphError, GraphExecutor, StepEvent,
};
pub use node::{Node, NodeError, NodeId};
pub use state::{Field, MergeRule, PipelineState, StateUpdate};
