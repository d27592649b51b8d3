//! Stub collaborators and fixtures for Sifter tests.
//!
//! Every stub records how it was called so tests can assert on the
//! interaction as well as the outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use sifter_core::error::{Result, SifterError};
use sifter_core::traits::{
    AccessionLookup, EntityExtractor, FullTextFetcher, LiteratureSearch, RelevanceClassifier,
};
use sifter_core::types::{Article, Candidate, Classification, Relevance};

enum SearchMode {
    /// Replay batches in order, then return nothing.
    Sequence(Mutex<Vec<Vec<Article>>>),
    /// One never-seen article per call.
    OneNewPerCall,
    /// The same article on every call.
    Repeat(Article),
    /// One never-seen article per call, then a panic once the budget is spent.
    PanicAfter(usize),
}

/// Scripted literature search.
pub struct StubSearch {
    mode: SearchMode,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    fn with_mode(mode: SearchMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn sequence(batches: Vec<Vec<Article>>) -> Self {
        let mut batches = batches;
        batches.reverse();
        Self::with_mode(SearchMode::Sequence(Mutex::new(batches)))
    }

    pub fn one_new_per_call() -> Self {
        Self::with_mode(SearchMode::OneNewPerCall)
    }

    pub fn repeating(article: Article) -> Self {
        Self::with_mode(SearchMode::Repeat(article))
    }

    /// Behaves like `one_new_per_call` for `calls` calls, then panics.
    pub fn panic_after(calls: usize) -> Self {
        Self::with_mode(SearchMode::PanicAfter(calls))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl LiteratureSearch for StubSearch {
    fn name(&self) -> &str {
        "stub"
    }

    fn search<'a>(&'a self, query: &'a str, _limit: usize) -> BoxFuture<'a, Result<Vec<Article>>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.queries.lock().unwrap().push(query.to_string());
            Ok(match &self.mode {
                SearchMode::Sequence(batches) => batches.lock().unwrap().pop().unwrap_or_default(),
                SearchMode::OneNewPerCall => vec![fixture_article(n)],
                SearchMode::Repeat(article) => vec![article.clone()],
                SearchMode::PanicAfter(budget) => {
                    if n > *budget {
                        panic!("search stub exhausted after {} calls", budget);
                    }
                    vec![fixture_article(n)]
                }
            })
        })
    }
}

/// A search backend that is always down.
pub struct FailingSearch;

impl LiteratureSearch for FailingSearch {
    fn name(&self) -> &str {
        "failing"
    }

    fn search<'a>(&'a self, _query: &'a str, _limit: usize) -> BoxFuture<'a, Result<Vec<Article>>> {
        Box::pin(async {
            Err(SifterError::Http {
                service: "failing".into(),
                message: "status 503: unavailable".into(),
            })
        })
    }
}

/// Classifier with fixed labels per article key.
pub struct StubClassifier {
    labels: HashMap<String, Relevance>,
    default: Option<Relevance>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubClassifier {
    /// Label every article relevant.
    pub fn all_relevant() -> Self {
        Self {
            labels: HashMap::new(),
            default: Some(Relevance::Relevant),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Label only the listed keys; other articles get no record.
    pub fn labels(labels: Vec<(&str, Relevance)>) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, l)| (k.to_string(), l))
                .collect(),
            default: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            labels: HashMap::new(),
            default: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RelevanceClassifier for StubClassifier {
    fn classify<'a>(
        &'a self,
        articles: &'a [Article],
        _requirement: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Classification>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SifterError::Classification("stub failure".into()));
            }
            Ok(articles
                .iter()
                .filter_map(|a| {
                    let key = a.key();
                    let label = self.labels.get(&key).copied().or(self.default)?;
                    Some(Classification::new(key, label, "stub"))
                })
                .collect())
        })
    }
}

/// Extractor that returns one candidate per non-empty text, named after the
/// text's first word.
pub struct StubExtractor {
    texts: Mutex<Vec<String>>,
}

impl StubExtractor {
    pub fn one_per_text() -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Texts received, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl EntityExtractor for StubExtractor {
    fn extract<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(async move {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(text
                .split_whitespace()
                .next()
                .map(|name| vec![Candidate::new(name, "Coccidioides immitis")])
                .unwrap_or_default())
        })
    }
}

/// Full-text source backed by a fixed map of identifier to text.
pub struct StubFullText {
    texts: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl StubFullText {
    pub fn new(texts: Vec<(&str, &str)>) -> Self {
        Self {
            texts: texts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl FullTextFetcher for StubFullText {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(identifier.to_string());
            Ok(self.texts.get(identifier).cloned())
        })
    }
}

/// Accession lookup that knows a fixed set of ids.
pub struct StubAccessions {
    known: Vec<String>,
}

impl StubAccessions {
    pub fn known(ids: &[&str]) -> Self {
        Self {
            known: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AccessionLookup for StubAccessions {
    fn exists<'a>(&'a self, accession: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.known.iter().any(|k| k == accession)) })
    }
}

/// An article with a deterministic DOI and abstract.
pub fn fixture_article(n: usize) -> Article {
    Article::new(Some(format!("10.1000/fixture.{}", n)), None, format!("Article {}", n))
        .with_abstract(format!("Target{} is essential for fungal growth.", n))
}

