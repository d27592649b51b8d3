//! Concrete collaborators for the literature pipeline.
//!
//! Every client here implements one of the traits in `sifter_core::traits`
//! and talks to a remote HTTP service. Transient failures are retried via
//! [`retry::with_retry`]; anything else surfaces as a `SifterError` for the
//! calling node to absorb.

pub mod classifier;
pub mod extractor;
pub mod llm;
pub mod paper_finder;
pub mod pmc;
pub mod retry;
pub mod semantic_scholar;
pub mod uniprot;

mod http;

use std::sync::Arc;
use std::time::Duration;

use sifter_core::config::{AppConfig, SearchProvider};
use sifter_core::traits::{
    AccessionLookup, EntityExtractor, FullTextFetcher, LiteratureSearch, RelevanceClassifier,
};

pub use classifier::LlmClassifier;
pub use extractor::LlmExtractor;
pub use llm::ChatClient;
pub use paper_finder::PaperFinderSearch;
pub use pmc::PmcFullText;
pub use semantic_scholar::SemanticScholarSearch;
pub use uniprot::UniProtLookup;

/// The full set of collaborators a pipeline needs.
#[derive(Clone)]
pub struct Sources {
    pub search: Arc<dyn LiteratureSearch>,
    pub classifier: Arc<dyn RelevanceClassifier>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub full_text: Option<Arc<dyn FullTextFetcher>>,
    pub accessions: Option<Arc<dyn AccessionLookup>>,
}

impl Sources {
    /// Build the HTTP collaborators described by the config.
    pub fn from_config(config: &AppConfig) -> Self {
        let search: Arc<dyn LiteratureSearch> = match config.search.provider {
            SearchProvider::SemanticScholar => Arc::new(SemanticScholarSearch::new(
                &config.search,
                config.retry.clone(),
            )),
            SearchProvider::PaperFinder => {
                Arc::new(PaperFinderSearch::new(&config.search, config.retry.clone()))
            }
        };

        let chat = Arc::new(ChatClient::new(&config.llm, config.retry.clone()));

        let full_text: Option<Arc<dyn FullTextFetcher>> = if config.full_text.enabled {
            Some(Arc::new(PmcFullText::new(&config.full_text, config.retry.clone())))
        } else {
            None
        };

        let accessions: Option<Arc<dyn AccessionLookup>> = if config.uniprot.enabled {
            Some(Arc::new(UniProtLookup::new(&config.uniprot, config.retry.clone())))
        } else {
            None
        };

        Self {
            search,
            classifier: Arc::new(LlmClassifier::new(chat.clone())),
            extractor: Arc::new(LlmExtractor::new(chat)),
            full_text,
            accessions,
        }
    }
}

pub(crate) fn build_http(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("sifter/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
