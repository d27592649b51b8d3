use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use sifter_core::traits::{EntityExtractor, FullTextFetcher};
use sifter_core::types::{Article, Candidate};

use crate::graph::{Field, Node, NodeError, NodeId, PipelineState, StateUpdate};

/// Extracts candidates from every queued article, then clears the queue.
pub struct ExtractNode {
    extractor: Arc<dyn EntityExtractor>,
    full_text: Option<Arc<dyn FullTextFetcher>>,
}

impl ExtractNode {
    pub fn new(
        extractor: Arc<dyn EntityExtractor>,
        full_text: Option<Arc<dyn FullTextFetcher>>,
    ) -> Self {
        Self {
            extractor,
            full_text,
        }
    }

    /// Full text for open-access articles, the abstract otherwise.
    async fn text_for(&self, article: &Article) -> String {
        if let (true, Some(fetcher)) = (article.is_open_access, &self.full_text) {
            let identifier = article
                .pmid
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .or(article.doi.as_deref());
            if let Some(identifier) = identifier {
                match fetcher.fetch(identifier).await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        debug!(article = %article.key(), chars = text.len(), "Using full text");
                        return text;
                    }
                    Ok(_) => debug!(article = %article.key(), "No full text, using abstract"),
                    Err(e) => {
                        warn!(article = %article.key(), error = %e, "Full-text fetch failed, using abstract")
                    }
                }
            }
        }
        article.abstract_text.clone()
    }
}

impl Node for ExtractNode {
    fn id(&self) -> NodeId {
        NodeId::Extract
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Candidates, Field::ArticlesToProcess]
    }

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
        Box::pin(async move {
            let mut candidates: Vec<Candidate> = Vec::new();

            for article in &state.articles_to_process {
                let key = article.key();
                let text = self.text_for(article).await;
                if text.trim().is_empty() {
                    debug!(article = %key, "No text to extract from");
                    continue;
                }
                match self.extractor.extract(&text).await {
                    Ok(found) => {
                        debug!(article = %key, count = found.len(), "Extracted candidates");
                        candidates.extend(found.into_iter().map(|c| c.from_article(key.clone())));
                    }
                    Err(e) => warn!(article = %key, error = %e, "Extraction failed"),
                }
            }

            info!(
                articles = state.articles_to_process.len(),
                candidates = candidates.len(),
                "Extraction round complete"
            );

            Ok(StateUpdate {
                candidates: Some(candidates),
                articles_to_process: Some(vec![]),
                ..Default::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use sifter_test_utils::{StubExtractor, StubFullText};

    use super::*;

    #[tokio::test]
    async fn stamps_source_and_clears_queue() {
        let node = ExtractNode::new(Arc::new(StubExtractor::one_per_text()), None);
        let state = PipelineState {
            articles_to_process: vec![
                Article::new(Some("10.1/A".into()), None, "a").with_abstract("Cyp51 binds"),
                Article::new(None, Some("42".into()), "b").with_abstract("Hsp90 folds"),
                Article::new(Some("10.1/c".into()), None, "c"),
            ],
            ..Default::default()
        };

        let update = node.apply(&state).await.unwrap();
        let candidates = update.candidates.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_article, "10.1/a");
        assert_eq!(candidates[1].source_article, "pmid:42");
        assert_eq!(update.articles_to_process, Some(vec![]));
    }

    #[tokio::test]
    async fn prefers_full_text_for_open_access() {
        let full_text = Arc::new(StubFullText::new(vec![("42", "Erg11 in the body")]));
        let extractor = Arc::new(StubExtractor::one_per_text());
        let node = ExtractNode::new(extractor.clone(), Some(full_text.clone()));
        let state = PipelineState {
            articles_to_process: vec![
                Article::new(Some("10.1/a".into()), Some("42".into()), "a")
                    .with_abstract("abstract only")
                    .with_open_access(None),
                Article::new(Some("10.1/b".into()), None, "b")
                    .with_abstract("closed abstract"),
            ],
            ..Default::default()
        };

        node.apply(&state).await.unwrap();
        assert_eq!(
            extractor.texts(),
            vec!["Erg11 in the body".to_string(), "closed abstract".to_string()]
        );
        assert_eq!(full_text.requests(), vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn missing_full_text_falls_back_to_abstract() {
        let extractor = Arc::new(StubExtractor::one_per_text());
        let node = ExtractNode::new(
            extractor.clone(),
            Some(Arc::new(StubFullText::new(vec![]))),
        );
        let state = PipelineState {
            articles_to_process: vec![Article::new(Some("10.1/a".into()), None, "a")
                .with_abstract("the abstract")
                .with_open_access(None)],
            ..Default::default()
        };
        node.apply(&state).await.unwrap();
        assert_eq!(extractor.texts(), vec!["the abstract".to_string()]);
    }
}
