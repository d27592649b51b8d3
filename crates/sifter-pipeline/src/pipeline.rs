use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use sifter_core::config::PipelineConfig;
use sifter_sources::Sources;

use crate::graph::{
    Edge, Field, FnPredicate, GraphError, GraphExecutor, Node, NodeError, NodeId, PipelineState,
    Target,
};
use crate::nodes::{ClassifyNode, ExtractNode, RefineNode, RetrieveNode, ValidateNode};

/// Enough candidates collected.
pub const ENOUGH: &str = "enough";
/// Search budget spent.
pub const EXHAUSTED: &str = "exhausted";
/// Keep searching.
pub const MORE: &str = "more";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Decide whether the job has what it needs after a round.
pub fn progress(state: &PipelineState) -> &'static str {
    if state.candidates.len() >= state.target_candidate_count {
        ENOUGH
    } else if state.search_rounds >= state.max_search_rounds {
        EXHAUSTED
    } else {
        MORE
    }
}

fn progress_predicate() -> Arc<FnPredicate> {
    Arc::new(FnPredicate::new(
        "progress",
        &[ENOUGH, EXHAUSTED, MORE],
        &[
            Field::Candidates,
            Field::TargetCandidateCount,
            Field::SearchRounds,
            Field::MaxSearchRounds,
        ],
        progress,
    ))
}

/// Assemble the literature graph:
///
/// ```text
/// retrieve -> classify -> extract -> validate -> progress?
///     enough    -> END
///     exhausted -> END
///     more      -> refine -> retrieve
/// ```
pub fn build_graph(sources: &Sources, config: &PipelineConfig) -> Result<GraphExecutor, BuildError> {
    let nodes: Vec<Arc<dyn Node>> = vec![
        Arc::new(RetrieveNode::new(sources.search.clone())),
        Arc::new(ClassifyNode::new(sources.classifier.clone())),
        Arc::new(ExtractNode::new(
            sources.extractor.clone(),
            sources.full_text.clone(),
        )),
        Arc::new(ValidateNode::new(sources.accessions.clone())),
        Arc::new(RefineNode::new(config.broadening_terms.clone())?),
    ];

    let edges = vec![
        Edge::always(NodeId::Retrieve, NodeId::Classify),
        Edge::always(NodeId::Classify, NodeId::Extract),
        Edge::always(NodeId::Extract, NodeId::Validate),
        Edge::branch(
            NodeId::Validate,
            progress_predicate(),
            [
                (ENOUGH, Target::End),
                (EXHAUSTED, Target::End),
                (MORE, Target::Node(NodeId::Refine)),
            ],
        ),
        Edge::always(NodeId::Refine, NodeId::Retrieve),
    ];

    let mut graph = GraphExecutor::new(nodes, edges, NodeId::Retrieve)?;
    if let Some(max_steps) = config.max_steps {
        graph = graph.with_max_steps(max_steps)?;
    }
    info!(
        nodes = graph.node_count(),
        max_steps = graph.max_steps(),
        "Literature graph ready"
    );
    Ok(graph)
}

/// Initial state for a job.
pub fn seed_state(query: &str, config: &PipelineConfig) -> PipelineState {
    let query = query.trim().to_string();
    PipelineState {
        original_query: query.clone(),
        search_query: query,
        requirement: config.requirement.clone(),
        target_candidate_count: config.target_candidate_count,
        search_batch_size: config.search_batch_size,
        max_search_rounds: config.max_search_rounds,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use sifter_test_utils::{StubClassifier, StubExtractor, StubSearch};

    use super::*;

    fn sources() -> Sources {
        Sources {
            search: Arc::new(StubSearch::one_new_per_call()),
            classifier: Arc::new(StubClassifier::all_relevant()),
            extractor: Arc::new(StubExtractor::one_per_text()),
            full_text: None,
            accessions: None,
        }
    }

    #[test]
    fn progress_outcomes() {
        let mut state = PipelineState {
            target_candidate_count: 1,
            max_search_rounds: 2,
            search_rounds: 1,
            ..Default::default()
        };
        assert_eq!(progress(&state), MORE);
        state.search_rounds = 2;
        assert_eq!(progress(&state), EXHAUSTED);
        state.candidates.push(sifter_core::types::Candidate::new("Cyp51", "x"));
        assert_eq!(progress(&state), ENOUGH);
    }

    #[test]
    fn seed_fills_configured_fields() {
        let config = PipelineConfig::default();
        let state = seed_state("  coccidioides targets ", &config);
        assert_eq!(state.original_query, "coccidioides targets");
        assert_eq!(state.search_query, state.original_query);
        assert_eq!(state.target_candidate_count, config.target_candidate_count);
        assert_eq!(state.search_rounds, 0);
        assert!(state.retrieved_articles.is_empty());
    }

    #[test]
    fn default_step_ceiling_scales_with_nodes() {
        let graph = build_graph(&sources(), &PipelineConfig::default()).unwrap();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.max_steps(), 125);

        let config = PipelineConfig {
            max_steps: Some(7),
            ..Default::default()
        };
        assert_eq!(build_graph(&sources(), &config).unwrap().max_steps(), 7);
    }

    #[test]
    fn empty_broadening_terms_are_rejected() {
        let config = PipelineConfig {
            broadening_terms: vec![],
            ..Default::default()
        };
        assert!(matches!(
            build_graph(&sources(), &config),
            Err(BuildError::Node(_))
        ));
    }

    #[tokio::test]
    async fn three_rounds_then_end() {
        let search = Arc::new(StubSearch::one_new_per_call());
        let sources = Sources {
            search: search.clone(),
            ..sources()
        };
        let config = PipelineConfig {
            target_candidate_count: 3,
            search_batch_size: 1,
            max_search_rounds: 10,
            ..Default::default()
        };
        let graph = build_graph(&sources, &config).unwrap();
        let result = graph.execute(seed_state("q", &config)).await.unwrap();

        assert_eq!(search.calls(), 3);
        assert_eq!(result.state.search_rounds, 3);
        assert_eq!(result.state.candidates.len(), 3);
        assert_eq!(result.path.last(), Some(&NodeId::Validate));
        assert_eq!(
            result.path.iter().filter(|n| **n == NodeId::Refine).count(),
            2
        );
        assert_eq!(
            search.queries(),
            vec!["q", "q OR related enzymes", "q OR essential genes"]
        );
    }
}
