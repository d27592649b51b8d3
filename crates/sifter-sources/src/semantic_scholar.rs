use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, info};

use sifter_core::config::{RetryConfig, SearchConfig};
use sifter_core::error::Result;
use sifter_core::traits::LiteratureSearch;
use sifter_core::types::Article;

use crate::http::{check_status, join, parse_error, transport_error};
use crate::retry::with_retry;

const SERVICE: &str = "semantic_scholar";
const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org";
const ARTICLE_FIELDS: &str = "paperId,externalIds,title,abstract,isOpenAccess,url,citationCount";

/// Paper search against the Semantic Scholar Graph API.
pub struct SemanticScholarSearch {
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
    http: reqwest::Client,
}

impl SemanticScholarSearch {
    pub fn new(config: &SearchConfig, retry: RetryConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            retry,
            http: crate::build_http(config.timeout_secs),
        }
    }

    fn request(&self, query: &str, limit: usize) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(join(&self.base_url, "graph/v1/paper/search"))
            .header("Accept", "application/json")
            .query(&[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("fields", ARTICLE_FIELDS.to_string()),
            ]);
        if let Some(ref key) = self.api_key {
            req = req.header("x-api-key", key);
        }
        req
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    #[serde(default)]
    paper_id: Option<String>,
    #[serde(default)]
    external_ids: Option<ExternalIds>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    is_open_access: Option<bool>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    citation_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI", default)]
    doi: Option<String>,
    #[serde(rename = "PubMed", default)]
    pubmed: Option<String>,
}

/// Map raw papers to articles, dropping records without a DOI or PMID.
fn to_articles(response: SearchResponse) -> Vec<Article> {
    response
        .data
        .into_iter()
        .filter_map(|p| {
            let ids = p.external_ids.unwrap_or_default();
            let url = p.url.or_else(|| {
                p.paper_id
                    .as_ref()
                    .map(|id| format!("https://www.semanticscholar.org/paper/{}", id))
            });
            let relevance = p.citation_count.map_or(0.0, |c| c as f64 / 100.0);

            let mut article = Article::new(ids.doi, ids.pubmed, p.title.unwrap_or_default())
                .with_abstract(p.abstract_text.unwrap_or_default())
                .with_relevance(relevance);
            if p.is_open_access.unwrap_or(false) {
                article = article.with_open_access(url);
            } else {
                article.full_text_url = url;
            }

            if article.has_identifier() {
                Some(article)
            } else {
                debug!(title = %article.title, "Dropping paper without DOI or PMID");
                None
            }
        })
        .collect()
}

impl LiteratureSearch for SemanticScholarSearch {
    fn name(&self) -> &str {
        SERVICE
    }

    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Article>>> {
        Box::pin(async move {
            info!(query, limit, "Searching Semantic Scholar");

            let response = with_retry(&self.retry, SERVICE, || {
                let request = self.request(query, limit);
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| transport_error(SERVICE, e))?;
                    let resp = check_status(SERVICE, resp).await?;
                    resp.json::<SearchResponse>()
                        .await
                        .map_err(|e| parse_error(SERVICE, e))
                }
            })
            .await?;

            let articles = to_articles(response);
            info!(count = articles.len(), "Semantic Scholar search complete");
            Ok(articles)
        })
    }
}
