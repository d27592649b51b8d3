//! The literature workflow: graph engine, pipeline nodes, and job runner.

pub mod graph;
pub mod nodes;
pub mod pipeline;
pub mod run_log;
pub mod runner;

pub use graph::{ExecutorError, GraphError, GraphExecutor, NodeId, PipelineState, StateUpdate};
pub use pipeline::{build_graph, seed_state, BuildError};
pub use run_log::RunLog;
pub use runner::{JobInfo, JobRegistry, JobRunner};
