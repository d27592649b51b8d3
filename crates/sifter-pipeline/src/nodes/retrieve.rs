use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use sifter_core::traits::LiteratureSearch;
use sifter_core::types::Article;

use crate::graph::{Field, Node, NodeError, NodeId, PipelineState, StateUpdate};

/// Runs one search round and queues the articles not seen before.
pub struct RetrieveNode {
    search: Arc<dyn LiteratureSearch>,
}

impl RetrieveNode {
    pub fn new(search: Arc<dyn LiteratureSearch>) -> Self {
        Self { search }
    }
}

/// Articles with an identifier whose key is neither already known nor repeated.
fn fresh_articles(known: &[Article], found: Vec<Article>) -> Vec<Article> {
    let mut seen: HashSet<String> = known.iter().map(Article::key).collect();
    found
        .into_iter()
        .filter(|a| a.has_identifier() && seen.insert(a.key()))
        .collect()
}

impl Node for RetrieveNode {
    fn id(&self) -> NodeId {
        NodeId::Retrieve
    }

    fn writes(&self) -> &'static [Field] {
        &[
            Field::RetrievedArticles,
            Field::ArticlesToProcess,
            Field::TotalArticlesFetched,
            Field::SearchRounds,
        ]
    }

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
        Box::pin(async move {
            let round = state.search_rounds + 1;
            info!(
                round,
                query = %state.search_query,
                backend = self.search.name(),
                "Searching literature"
            );

            let found = match self
                .search
                .search(&state.search_query, state.search_batch_size)
                .await
            {
                Ok(articles) => articles,
                Err(e) => {
                    warn!(round, error = %e, "Search failed, treating round as empty");
                    vec![]
                }
            };

            let new = fresh_articles(&state.retrieved_articles, found);
            let total = state.retrieved_articles.len() + new.len();
            info!(round, new = new.len(), total, "Search round complete");

            Ok(StateUpdate {
                retrieved_articles: Some(new.clone()),
                articles_to_process: Some(new),
                total_articles_fetched: Some(total),
                search_rounds: Some(round),
                ..Default::default()
            })
        })
    }
}
