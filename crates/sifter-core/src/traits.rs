use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Literature search. Returns candidate articles for a query.
pub trait LiteratureSearch: Send + Sync + 'static {
    /// Backend name for logs (e.g., "semantic_scholar").
    fn name(&self) -> &str;

    /// Search for at most `limit` articles.
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Article>>>;
}

/// Relevance classification. Labels each article against a requirement.
///
/// Implementations should return one record per input article. Callers
/// treat any article without a record as ambiguous.
pub trait RelevanceClassifier: Send + Sync + 'static {
    fn classify<'a>(
        &'a self,
        articles: &'a [Article],
        requirement: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Classification>>>;
}

/// Entity extraction. Pulls candidate entities out of free text.
///
/// Empty input yields an empty list. The returned candidates do not need
/// `source_article` set; the caller stamps it.
pub trait EntityExtractor: Send + Sync + 'static {
    fn extract<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<Candidate>>>;
}

/// Full-text retrieval by article identifier (PMID or DOI).
pub trait FullTextFetcher: Send + Sync + 'static {
    /// `Ok(None)` when no full text is available.
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Accession lookup. Checks that an accession id exists upstream.
pub trait AccessionLookup: Send + Sync + 'static {
    fn exists<'a>(&'a self, accession: &'a str) -> BoxFuture<'a, Result<bool>>;
}
