use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use sifter_core::traits::RelevanceClassifier;
use sifter_core::types::{Article, Classification, Relevance};

use crate::graph::{Field, Node, NodeError, NodeId, PipelineState, StateUpdate};

/// Labels the queued articles and narrows the queue to the ones worth reading.
pub struct ClassifyNode {
    classifier: Arc<dyn RelevanceClassifier>,
}

impl ClassifyNode {
    pub fn new(classifier: Arc<dyn RelevanceClassifier>) -> Self {
        Self { classifier }
    }
}

/// Pair every queued article with a label. Articles the classifier skipped
/// are ambiguous.
fn label_all(articles: &[Article], records: Vec<Classification>) -> Vec<(Article, Classification)> {
    let mut by_key: HashMap<String, Classification> = records
        .into_iter()
        .map(|c| (c.article.trim().to_lowercase(), c))
        .collect();
    articles
        .iter()
        .map(|article| {
            let key = article.key();
            let record = by_key.remove(&key).unwrap_or_else(|| {
                Classification::new(key, Relevance::Ambiguous, "not classified")
            });
            (article.clone(), record)
        })
        .collect()
}

impl Node for ClassifyNode {
    fn id(&self) -> NodeId {
        NodeId::Classify
    }

    fn writes(&self) -> &'static [Field] {
        &[
            Field::Classifications,
            Field::ConfirmedArticles,
            Field::UnclearArticles,
            Field::ArticlesToProcess,
        ]
    }

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
        Box::pin(async move {
            let queue = &state.articles_to_process;
            if queue.is_empty() {
                info!("No articles to classify");
                return Ok(StateUpdate::default());
            }

            let records = match self.classifier.classify(queue, &state.requirement).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(count = queue.len(), error = %e, "Classification failed");
                    return Ok(StateUpdate::default());
                }
            };

            let mut classifications = Vec::with_capacity(queue.len());
            let mut confirmed = Vec::new();
            let mut unclear = Vec::new();
            for (article, record) in label_all(queue, records) {
                match record.label {
                    Relevance::Relevant => confirmed.push(article),
                    Relevance::Ambiguous => unclear.push(article),
                    Relevance::Irrelevant => {}
                }
                classifications.push(record);
            }

            info!(
                relevant = confirmed.len(),
                ambiguous = unclear.len(),
                irrelevant = queue.len() - confirmed.len() - unclear.len(),
                "Classification complete"
            );

            let to_process: Vec<Article> = confirmed.iter().chain(&unclear).cloned().collect();
            Ok(StateUpdate {
                classifications: Some(classifications),
                confirmed_articles: Some(confirmed),
                unclear_articles: Some(unclear),
                articles_to_process: Some(to_process),
                ..Default::default()
            })
        })
    }
}
