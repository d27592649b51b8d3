use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::edge::{Edge, Route, Target};
use super::node::{Node, NodeId};
use super::state::{Field, PipelineState, StateUpdate};

/// Steps allowed per node when no explicit ceiling is configured.
pub const STEPS_PER_NODE: usize = 25;

/// The graph is wired incorrectly.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("node '{0}' registered twice")]
    DuplicateNode(NodeId),
    #[error("entry node '{0}' is not in the graph")]
    MissingEntry(NodeId),
    #[error("edge from unknown node '{0}'")]
    UnknownSource(NodeId),
    #[error("edge from '{from}' targets unknown node '{to}'")]
    UnknownTarget { from: NodeId, to: NodeId },
    #[error("node '{0}' has more than one outgoing route")]
    DuplicateRoute(NodeId),
    #[error("node '{0}' has no outgoing route")]
    NoRoute(NodeId),
    #[error("branches from '{from}' ({found:?}) do not match outcomes of predicate '{predicate}' ({expected:?})")]
    BranchMismatch {
        from: NodeId,
        predicate: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("node '{0}' is unreachable from the entry")]
    Unreachable(NodeId),
    #[error("predicate '{predicate}' reads '{field}' but no node writes it")]
    UnsatisfiedRead { predicate: String, field: Field },
    #[error("max steps must be at least 1")]
    ZeroStepLimit,
}

/// A run of the graph failed.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: usize },
    #[error("predicate '{predicate}' returned undeclared outcome '{outcome}'")]
    UnknownBranch { predicate: String, outcome: String },
}

/// One completed node execution.
#[derive(Debug, Clone)]
pub struct StepEvent {
    /// Zero-based position in the run.
    pub step_index: usize,
    pub node: NodeId,
    /// The update as merged, after undeclared fields were dropped.
    pub update: StateUpdate,
    /// State after the merge.
    pub state: PipelineState,
    pub next: Target,
}

/// Result of running a graph to the end.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Nodes in execution order.
    pub path: Vec<NodeId>,
    pub state: PipelineState,
    pub total_elapsed_ms: u64,
}

/// Executes the literature graph.
///
/// Built once from nodes and edges and validated up front. Each run walks
/// from the entry node, merging every node's update into the state and
/// following the node's route, until it reaches [`Target::End`].
pub struct GraphExecutor {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    routes: HashMap<NodeId, Route>,
    entry: NodeId,
    max_steps: usize,
}

impl GraphExecutor {
    /// Build and validate a graph. The step ceiling defaults to
    /// `node count × STEPS_PER_NODE`.
    pub fn new(
        nodes: Vec<Arc<dyn Node>>,
        edges: Vec<Edge>,
        entry: NodeId,
    ) -> Result<Self, GraphError> {
        let mut node_map: HashMap<NodeId, Arc<dyn Node>> = HashMap::new();
        for node in nodes {
            let id = node.id();
            if node_map.insert(id, node).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }
        if !node_map.contains_key(&entry) {
            return Err(GraphError::MissingEntry(entry));
        }

        let mut routes: HashMap<NodeId, Route> = HashMap::new();
        for edge in edges {
            if !node_map.contains_key(&edge.from) {
                return Err(GraphError::UnknownSource(edge.from));
            }
            for target in edge.route.targets() {
                if let Target::Node(to) = target {
                    if !node_map.contains_key(&to) {
                        return Err(GraphError::UnknownTarget {
                            from: edge.from,
                            to,
                        });
                    }
                }
            }
            if routes.insert(edge.from, edge.route).is_some() {
                return Err(GraphError::DuplicateRoute(edge.from));
            }
        }

        let graph = Self {
            max_steps: node_map.len() * STEPS_PER_NODE,
            nodes: node_map,
            routes,
            entry,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Override the step ceiling.
    pub fn with_max_steps(mut self, max_steps: usize) -> Result<Self, GraphError> {
        if max_steps == 0 {
            return Err(GraphError::ZeroStepLimit);
        }
        self.max_steps = max_steps;
        Ok(self)
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn validate(&self) -> Result<(), GraphError> {
        // Sorted for deterministic error reporting
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());

        for id in &ids {
            if !self.routes.contains_key(id) {
                return Err(GraphError::NoRoute(*id));
            }
        }

        let written: HashSet<Field> = self
            .nodes
            .values()
            .flat_map(|n| n.writes().iter().copied())
            .collect();

        for (from, route) in &self.routes {
            if let Route::Branch {
                predicate,
                branches,
            } = route
            {
                let mut expected: Vec<String> =
                    predicate.outcomes().iter().map(|s| s.to_string()).collect();
                let mut found: Vec<String> = branches.keys().map(|s| s.to_string()).collect();
                expected.sort();
                expected.dedup();
                found.sort();
                if expected != found {
                    return Err(GraphError::BranchMismatch {
                        from: *from,
                        predicate: predicate.name().to_string(),
                        expected,
                        found,
                    });
                }
                for field in predicate.reads() {
                    if !field.is_seed() && !written.contains(field) {
                        return Err(GraphError::UnsatisfiedRead {
                            predicate: predicate.name().to_string(),
                            field: *field,
                        });
                    }
                }
            }
        }

        let mut reached: HashSet<NodeId> = HashSet::from([self.entry]);
        let mut queue = VecDeque::from([self.entry]);
        while let Some(id) = queue.pop_front() {
            if let Some(route) = self.routes.get(&id) {
                for target in route.targets() {
                    if let Target::Node(next) = target {
                        if reached.insert(next) {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }
        if let Some(id) = ids.into_iter().find(|id| !reached.contains(id)) {
            return Err(GraphError::Unreachable(id));
        }

        Ok(())
    }

    /// Begin a run over `state`. Drive it with [`Execution::step`].
    pub fn start(&self, state: PipelineState) -> Execution<'_> {
        Execution {
            graph: self,
            state,
            current: Target::Node(self.entry),
            steps: 0,
        }
    }

    /// Run to the end and return the final state.
    pub async fn execute(&self, state: PipelineState) -> Result<ExecutionResult, ExecutorError> {
        let start = Instant::now();
        let mut execution = self.start(state);
        let mut path = Vec::new();
        while let Some(event) = execution.step().await? {
            path.push(event.node);
        }
        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(steps = path.len(), total_elapsed_ms, "Graph execution complete");
        Ok(ExecutionResult {
            path,
            state: execution.into_state(),
            total_elapsed_ms,
        })
    }
}

/// An in-progress run of a [`GraphExecutor`].
pub struct Execution<'g> {
    graph: &'g GraphExecutor,
    state: PipelineState,
    current: Target,
    steps: usize,
}

impl Execution<'_> {
    /// Run the current node and advance. `Ok(None)` once the run reached END.
    pub async fn step(&mut self) -> Result<Option<StepEvent>, ExecutorError> {
        let Target::Node(id) = self.current else {
            return Ok(None);
        };
        if self.steps >= self.graph.max_steps {
            warn!(limit = self.graph.max_steps, node = %id, "Step limit exceeded");
            return Err(ExecutorError::StepLimitExceeded {
                limit: self.graph.max_steps,
            });
        }

        let (Some(node), Some(route)) = (self.graph.nodes.get(&id), self.graph.routes.get(&id))
        else {
            // Construction guarantees both exist
            self.current = Target::End;
            return Ok(None);
        };

        let started = Instant::now();
        let mut update = match node.apply(&self.state).await {
            Ok(update) => update,
            Err(e) => {
                warn!(node = %id, error = %e, "Node failed, continuing with empty update");
                StateUpdate::default()
            }
        };

        let writes = node.writes();
        for field in update.fields() {
            if !writes.contains(&field) {
                warn!(node = %id, field = %field, "Dropping write to undeclared field");
                update.clear(field);
            }
        }

        self.state.merge(update.clone());
        let next = route.resolve(&self.state)?;

        debug!(
            step = self.steps,
            node = %id,
            next = %next,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Node complete"
        );

        let event = StepEvent {
            step_index: self.steps,
            node: id,
            update,
            state: self.state.clone(),
            next,
        };
        self.steps += 1;
        self.current = next;
        Ok(Some(event))
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.current == Target::End
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::super::edge::FnPredicate;
    use super::super::node::NodeError;
    use super::*;

    /// Bumps `search_rounds` on every run.
    struct Counter(NodeId);

    impl Node for Counter {
        fn id(&self) -> NodeId {
            self.0
        }
        fn writes(&self) -> &'static [Field] {
            &[Field::SearchRounds]
        }
        fn apply<'a>(
            &'a self,
            state: &'a PipelineState,
        ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
            Box::pin(async move {
                Ok(StateUpdate {
                    search_rounds: Some(state.search_rounds + 1),
                    ..Default::default()
                })
            })
        }
    }

    /// Always fails.
    struct Broken(NodeId);

    impl Node for Broken {
        fn id(&self) -> NodeId {
            self.0
        }
        fn writes(&self) -> &'static [Field] {
            &[Field::Candidates]
        }
        fn apply<'a>(
            &'a self,
            _state: &'a PipelineState,
        ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
            Box::pin(async { Err(NodeError::Invalid("broken".into())) })
        }
    }

    /// Writes a field it did not declare.
    struct Sneaky(NodeId);

    impl Node for Sneaky {
        fn id(&self) -> NodeId {
            self.0
        }
        fn writes(&self) -> &'static [Field] {
            &[Field::SearchRounds]
        }
        fn apply<'a>(
            &'a self,
            _state: &'a PipelineState,
        ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
            Box::pin(async {
                Ok(StateUpdate {
                    search_rounds: Some(7),
                    search_query: Some("hijacked".into()),
                    ..Default::default()
                })
            })
        }
    }

    fn until(rounds: usize) -> Arc<FnPredicate> {
        Arc::new(FnPredicate::new(
            "until",
            &["done", "again"],
            &[Field::SearchRounds],
            move |s| if s.search_rounds >= rounds { "done" } else { "again" },
        ))
    }

    fn looping(rounds: usize) -> GraphExecutor {
        GraphExecutor::new(
            vec![
                Arc::new(Counter(NodeId::Retrieve)),
                Arc::new(Counter(NodeId::Refine)),
            ],
            vec![
                Edge::branch(
                    NodeId::Retrieve,
                    until(rounds),
                    [("done", Target::End), ("again", NodeId::Refine.into())],
                ),
                Edge::always(NodeId::Refine, NodeId::Retrieve),
            ],
            NodeId::Retrieve,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn loop_terminates_on_predicate() {
        let graph = looping(5);
        let result = graph.execute(PipelineState::default()).await.unwrap();
        assert_eq!(result.state.search_rounds, 5);
        assert_eq!(
            result.path,
            vec![
                NodeId::Retrieve,
                NodeId::Refine,
                NodeId::Retrieve,
                NodeId::Refine,
                NodeId::Retrieve
            ]
        );
    }

    #[tokio::test]
    async fn steps_are_indexed_from_zero() {
        let graph = looping(3);
        let mut execution = graph.start(PipelineState::default());
        let mut indexes = Vec::new();
        while let Some(event) = execution.step().await.unwrap() {
            assert_eq!(event.state.search_rounds, event.update.search_rounds.unwrap());
            indexes.push(event.step_index);
        }
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(execution.is_finished());
        assert!(execution.step().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_terminating_graph_hits_step_limit() {
        let graph = looping(usize::MAX);
        assert_eq!(graph.max_steps(), 2 * STEPS_PER_NODE);
        let err = graph.execute(PipelineState::default()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::StepLimitExceeded { limit: 50 }));

        let graph = looping(usize::MAX).with_max_steps(4).unwrap();
        let mut execution = graph.start(PipelineState::default());
        for _ in 0..4 {
            assert!(execution.step().await.unwrap().is_some());
        }
        let err = execution.step().await.unwrap_err();
        assert!(matches!(err, ExecutorError::StepLimitExceeded { limit: 4 }));
        assert_eq!(execution.state().search_rounds, 4);
    }

    #[tokio::test]
    async fn failing_node_degrades_to_empty_update() {
        let graph = GraphExecutor::new(
            vec![
                Arc::new(Broken(NodeId::Extract)),
                Arc::new(Counter(NodeId::Validate)),
            ],
            vec![
                Edge::always(NodeId::Extract, NodeId::Validate),
                Edge::always(NodeId::Validate, Target::End),
            ],
            NodeId::Extract,
        )
        .unwrap();
        let result = graph.execute(PipelineState::default()).await.unwrap();
        assert_eq!(result.path, vec![NodeId::Extract, NodeId::Validate]);
        assert_eq!(result.state.search_rounds, 1);
    }

    #[tokio::test]
    async fn undeclared_writes_are_dropped() {
        let graph = GraphExecutor::new(
            vec![Arc::new(Sneaky(NodeId::Refine))],
            vec![Edge::always(NodeId::Refine, Target::End)],
            NodeId::Refine,
        )
        .unwrap();
        let mut execution = graph.start(PipelineState::default());
        let event = execution.step().await.unwrap().unwrap();
        assert_eq!(event.update.fields(), vec![Field::SearchRounds]);
        assert_eq!(event.state.search_query, "");
        assert_eq!(event.next, Target::End);
    }

    #[tokio::test]
    async fn unknown_branch_fails_the_run() {
        let liar = Arc::new(FnPredicate::new(
            "liar",
            &["yes"],
            &[],
            |_| "maybe",
        ));
        let graph = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![Edge::branch(NodeId::Retrieve, liar, [("yes", Target::End)])],
            NodeId::Retrieve,
        )
        .unwrap();
        let err = graph.execute(PipelineState::default()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::UnknownBranch { .. }));
    }

    #[test]
    fn rejects_branch_mismatch() {
        let err = GraphExecutor::new(
            vec![
                Arc::new(Counter(NodeId::Retrieve)),
                Arc::new(Counter(NodeId::Refine)),
            ],
            vec![
                Edge::branch(NodeId::Retrieve, until(1), [("done", Target::End)]),
                Edge::always(NodeId::Refine, NodeId::Retrieve),
            ],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert!(matches!(err, GraphError::BranchMismatch { .. }));
    }

    #[test]
    fn rejects_unknown_target_and_source() {
        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![Edge::always(NodeId::Retrieve, NodeId::Classify)],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            GraphError::UnknownTarget {
                from: NodeId::Retrieve,
                to: NodeId::Classify
            }
        );

        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![Edge::always(NodeId::Extract, Target::End)],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert_eq!(err, GraphError::UnknownSource(NodeId::Extract));
    }

    #[test]
    fn rejects_missing_entry_and_routes() {
        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![Edge::always(NodeId::Retrieve, Target::End)],
            NodeId::Refine,
        )
        .err()
        .unwrap();
        assert_eq!(err, GraphError::MissingEntry(NodeId::Refine));

        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert_eq!(err, GraphError::NoRoute(NodeId::Retrieve));

        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![
                Edge::always(NodeId::Retrieve, Target::End),
                Edge::always(NodeId::Retrieve, Target::End),
            ],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert_eq!(err, GraphError::DuplicateRoute(NodeId::Retrieve));
    }

    #[test]
    fn rejects_unreachable_node() {
        let err = GraphExecutor::new(
            vec![
                Arc::new(Counter(NodeId::Retrieve)),
                Arc::new(Counter(NodeId::Refine)),
            ],
            vec![
                Edge::always(NodeId::Retrieve, Target::End),
                Edge::always(NodeId::Refine, NodeId::Retrieve),
            ],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert_eq!(err, GraphError::Unreachable(NodeId::Refine));
    }

    #[test]
    fn rejects_predicate_reading_unwritten_field() {
        let wants_candidates = Arc::new(FnPredicate::new(
            "enough",
            &["yes", "no"],
            &[Field::Candidates],
            |s| if s.candidates.is_empty() { "no" } else { "yes" },
        ));
        let err = GraphExecutor::new(
            vec![Arc::new(Counter(NodeId::Retrieve))],
            vec![Edge::branch(
                NodeId::Retrieve,
                wants_candidates,
                [("yes", Target::End), ("no", NodeId::Retrieve.into())],
            )],
            NodeId::Retrieve,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            GraphError::UnsatisfiedRead {
                field: Field::Candidates,
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_step_limit() {
        assert_eq!(
            looping(1).with_max_steps(0).err(),
            Some(GraphError::ZeroStepLimit)
        );
    }
}
