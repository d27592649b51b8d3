use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use sifter_core::config::{RetryConfig, SearchConfig};
use sifter_core::error::Result;
use sifter_core::traits::LiteratureSearch;
use sifter_core::types::Article;

use crate::http::{check_status, join, parse_error, transport_error};
use crate::retry::with_retry;

const SERVICE: &str = "paper_finder";
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Search via a locally running Asta Paper Finder agent service.
///
/// Paper Finder reports Semantic Scholar corpus ids rather than DOIs; they
/// are carried in the DOI slot as `CorpusId:<id>` so articles stay keyable.
pub struct PaperFinderSearch {
    base_url: String,
    retry: RetryConfig,
    http: reqwest::Client,
}

impl PaperFinderSearch {
    pub fn new(config: &SearchConfig, retry: RetryConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry,
            // "fast" mode routinely takes 30-60s
            http: crate::build_http(config.timeout_secs.max(120)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoundResponse {
    #[serde(default)]
    doc_collection: DocCollection,
}

#[derive(Debug, Default, Deserialize)]
struct DocCollection {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    corpus_id: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    relevance_judgement: Option<RelevanceJudgement>,
}

#[derive(Debug, Deserialize)]
struct RelevanceJudgement {
    #[serde(default)]
    relevance_score: f64,
}

fn to_articles(response: RoundResponse, limit: usize) -> Vec<Article> {
    response
        .doc_collection
        .documents
        .into_iter()
        .filter_map(|d| {
            let corpus_id = match d.corpus_id? {
                serde_json::Value::String(s) if !s.is_empty() => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let mut article = Article::new(
                Some(format!("CorpusId:{}", corpus_id)),
                None,
                d.title.unwrap_or_default(),
            )
            .with_abstract(d.abstract_text.unwrap_or_default())
            .with_relevance(d.relevance_judgement.map_or(0.0, |r| r.relevance_score));
            article.full_text_url = d.url;
            Some(article)
        })
        .take(limit)
        .collect()
}

impl LiteratureSearch for PaperFinderSearch {
    fn name(&self) -> &str {
        SERVICE
    }

    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Article>>> {
        Box::pin(async move {
            info!(query, limit, "Calling Paper Finder");

            let response = with_retry(&self.retry, SERVICE, || {
                let request = self
                    .http
                    .post(join(&self.base_url, "api/2/rounds"))
                    .header("Accept", "application/json")
                    .json(&json!({
                        "paper_description": query,
                        "operation_mode": "fast",
                    }));
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| transport_error(SERVICE, e))?;
                    let resp = check_status(SERVICE, resp).await?;
                    resp.json::<RoundResponse>()
                        .await
                        .map_err(|e| parse_error(SERVICE, e))
                }
            })
            .await?;

            let articles = to_articles(response, limit);
            info!(count = articles.len(), "Paper Finder search complete");
            Ok(articles)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_documents_and_truncates() {
        let raw = serde_json::json!({
            "doc_collection": {
                "documents": [
                    {"corpus_id": 123, "title": "A", "abstract": "x",
                     "url": "https://s2/a", "relevance_judgement": {"relevance_score": 0.7}},
                    {"corpus_id": "456", "title": "B"},
                    {"title": "no id"},
                    {"corpus_id": "789", "title": "C"}
                ]
            }
        });
        let response: RoundResponse = serde_json::from_value(raw).unwrap();
        let articles = to_articles(response, 2);

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].doi.as_deref(), Some("CorpusId:123"));
        assert_eq!(articles[0].relevance_score, 0.7);
        assert_eq!(articles[0].full_text_url.as_deref(), Some("https://s2/a"));
        assert_eq!(articles[1].key(), "corpusid:456");
    }

    #[test]
    fn empty_collection() {
        let response: RoundResponse = serde_json::from_str("{}").unwrap();
        assert!(to_articles(response, 10).is_empty());
    }
}
