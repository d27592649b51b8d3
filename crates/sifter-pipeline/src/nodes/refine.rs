use futures::future::BoxFuture;
use tracing::info;

use crate::graph::{Field, Node, NodeError, NodeId, PipelineState, StateUpdate};

/// Broadens the search query before another round.
pub struct RefineNode {
    terms: Vec<String>,
}

impl RefineNode {
    pub fn new(terms: Vec<String>) -> Result<Self, NodeError> {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Err(NodeError::Invalid("at least one broadening term is required".into()));
        }
        Ok(Self { terms })
    }

    /// `<original> OR <term>`, cycling through the terms by round.
    fn broaden(&self, state: &PipelineState) -> String {
        let index = state.search_rounds.saturating_sub(1) % self.terms.len();
        format!("{} OR {}", state.original_query, self.terms[index])
    }
}

impl Node for RefineNode {
    fn id(&self) -> NodeId {
        NodeId::Refine
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::SearchQuery]
    }

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
        Box::pin(async move {
            let query = self.broaden(state);
            info!(query = %query, "Broadening search");
            Ok(StateUpdate {
                search_query: Some(query),
                ..Default::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_terms_by_round() {
        let node = RefineNode::new(vec!["a".into(), "b".into()]).unwrap();
        let mut state = PipelineState {
            original_query: "cocci".into(),
            search_query: "cocci OR a".into(),
            search_rounds: 1,
            ..Default::default()
        };
        let update = node.apply(&state).await.unwrap();
        assert_eq!(update.search_query.as_deref(), Some("cocci OR a"));

        state.search_rounds = 2;
        let update = node.apply(&state).await.unwrap();
        assert_eq!(update.search_query.as_deref(), Some("cocci OR b"));

        state.search_rounds = 3;
        let update = node.apply(&state).await.unwrap();
        assert_eq!(update.search_query.as_deref(), Some("cocci OR a"));
    }

    #[test]
    fn requires_a_term() {
        assert!(RefineNode::new(vec![" ".into()]).is_err());
    }
}
