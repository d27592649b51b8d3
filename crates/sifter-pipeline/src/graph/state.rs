use std::collections::HashSet;
use std::hash::Hash;

use serde::Serialize;

use sifter_core::types::{Article, Candidate, Classification};

/// A named field of [`PipelineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    OriginalQuery,
    SearchQuery,
    Requirement,
    TargetCandidateCount,
    SearchBatchSize,
    MaxSearchRounds,
    SearchRounds,
    TotalArticlesFetched,
    RetrievedArticles,
    ArticlesToProcess,
    Classifications,
    ConfirmedArticles,
    UnclearArticles,
    Candidates,
    ValidatedAccessions,
}

/// How an update to a field combines with the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// The update overwrites the field.
    Replace,
    /// Items are appended, skipping any whose identity is already present.
    Append,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::OriginalQuery,
        Field::SearchQuery,
        Field::Requirement,
        Field::TargetCandidateCount,
        Field::SearchBatchSize,
        Field::MaxSearchRounds,
        Field::SearchRounds,
        Field::TotalArticlesFetched,
        Field::RetrievedArticles,
        Field::ArticlesToProcess,
        Field::Classifications,
        Field::ConfirmedArticles,
        Field::UnclearArticles,
        Field::Candidates,
        Field::ValidatedAccessions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::OriginalQuery => "original_query",
            Field::SearchQuery => "search_query",
            Field::Requirement => "requirement",
            Field::TargetCandidateCount => "target_candidate_count",
            Field::SearchBatchSize => "search_batch_size",
            Field::MaxSearchRounds => "max_search_rounds",
            Field::SearchRounds => "search_rounds",
            Field::TotalArticlesFetched => "total_articles_fetched",
            Field::RetrievedArticles => "retrieved_articles",
            Field::ArticlesToProcess => "articles_to_process",
            Field::Classifications => "classifications",
            Field::ConfirmedArticles => "confirmed_articles",
            Field::UnclearArticles => "unclear_articles",
            Field::Candidates => "candidates",
            Field::ValidatedAccessions => "validated_accessions",
        }
    }

    pub fn merge_rule(&self) -> MergeRule {
        match self {
            Field::RetrievedArticles
            | Field::Classifications
            | Field::ConfirmedArticles
            | Field::UnclearArticles
            | Field::Candidates => MergeRule::Append,
            _ => MergeRule::Replace,
        }
    }

    /// Fields populated when a job is created, before any node runs.
    pub fn is_seed(&self) -> bool {
        matches!(
            self,
            Field::OriginalQuery
                | Field::SearchQuery
                | Field::Requirement
                | Field::TargetCandidateCount
                | Field::SearchBatchSize
                | Field::MaxSearchRounds
        )
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The record threaded through every step of a job.
///
/// Every field always has a value; a fresh state is all defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineState {
    pub original_query: String,
    pub search_query: String,
    pub requirement: String,
    pub target_candidate_count: usize,
    pub search_batch_size: usize,
    pub max_search_rounds: usize,
    pub search_rounds: usize,
    pub total_articles_fetched: usize,
    pub retrieved_articles: Vec<Article>,
    pub articles_to_process: Vec<Article>,
    pub classifications: Vec<Classification>,
    pub confirmed_articles: Vec<Article>,
    pub unclear_articles: Vec<Article>,
    pub candidates: Vec<Candidate>,
    pub validated_accessions: Vec<String>,
}

/// A partial update returned by a node. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_candidate_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_search_rounds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_rounds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_articles_fetched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_articles: Option<Vec<Article>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_to_process: Option<Vec<Article>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<Classification>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_articles: Option<Vec<Article>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unclear_articles: Option<Vec<Article>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_accessions: Option<Vec<String>>,
}

fn append_unique<T, K, F>(existing: &mut Vec<T>, incoming: Vec<T>, key: F)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = existing.iter().map(&key).collect();
    for item in incoming {
        if seen.insert(key(&item)) {
            existing.push(item);
        }
    }
}

impl PipelineState {
    /// Apply an update field by field according to each field's merge rule.
    pub fn merge(&mut self, update: StateUpdate) {
        if let Some(v) = update.original_query {
            self.original_query = v;
        }
        if let Some(v) = update.search_query {
            self.search_query = v;
        }
        if let Some(v) = update.requirement {
            self.requirement = v;
        }
        if let Some(v) = update.target_candidate_count {
            self.target_candidate_count = v;
        }
        if let Some(v) = update.search_batch_size {
            self.search_batch_size = v;
        }
        if let Some(v) = update.max_search_rounds {
            self.max_search_rounds = v;
        }
        if let Some(v) = update.search_rounds {
            self.search_rounds = v;
        }
        if let Some(v) = update.total_articles_fetched {
            self.total_articles_fetched = v;
        }
        if let Some(v) = update.retrieved_articles {
            append_unique(&mut self.retrieved_articles, v, Article::key);
        }
        if let Some(v) = update.articles_to_process {
            self.articles_to_process = v;
        }
        if let Some(v) = update.classifications {
            append_unique(&mut self.classifications, v, |c| c.article.clone());
        }
        if let Some(v) = update.confirmed_articles {
            append_unique(&mut self.confirmed_articles, v, Article::key);
        }
        if let Some(v) = update.unclear_articles {
            append_unique(&mut self.unclear_articles, v, Article::key);
        }
        if let Some(v) = update.candidates {
            append_unique(&mut self.candidates, v, Candidate::dedup_key);
        }
        if let Some(v) = update.validated_accessions {
            self.validated_accessions = v;
        }
    }
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// The fields this update sets, in schema order.
    pub fn fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.sets(*f))
            .collect()
    }

    pub fn sets(&self, field: Field) -> bool {
        match field {
            Field::OriginalQuery => self.original_query.is_some(),
            Field::SearchQuery => self.search_query.is_some(),
            Field::Requirement => self.requirement.is_some(),
            Field::TargetCandidateCount => self.target_candidate_count.is_some(),
            Field::SearchBatchSize => self.search_batch_size.is_some(),
            Field::MaxSearchRounds => self.max_search_rounds.is_some(),
            Field::SearchRounds => self.search_rounds.is_some(),
            Field::TotalArticlesFetched => self.total_articles_fetched.is_some(),
            Field::RetrievedArticles => self.retrieved_articles.is_some(),
            Field::ArticlesToProcess => self.articles_to_process.is_some(),
            Field::Classifications => self.classifications.is_some(),
            Field::ConfirmedArticles => self.confirmed_articles.is_some(),
            Field::UnclearArticles => self.unclear_articles.is_some(),
            Field::Candidates => self.candidates.is_some(),
            Field::ValidatedAccessions => self.validated_accessions.is_some(),
        }
    }

    /// Drop one field from the update.
    pub fn clear(&mut self, field: Field) {
        match field {
            Field::OriginalQuery => self.original_query = None,
            Field::SearchQuery => self.search_query = None,
            Field::Requirement => self.requirement = None,
            Field::TargetCandidateCount => self.target_candidate_count = None,
            Field::SearchBatchSize => self.search_batch_size = None,
            Field::MaxSearchRounds => self.max_search_rounds = None,
            Field::SearchRounds => self.search_rounds = None,
            Field::TotalArticlesFetched => self.total_articles_fetched = None,
            Field::RetrievedArticles => self.retrieved_articles = None,
            Field::ArticlesToProcess => self.articles_to_process = None,
            Field::Classifications => self.classifications = None,
            Field::ConfirmedArticles => self.confirmed_articles = None,
            Field::UnclearArticles => self.unclear_articles = None,
            Field::Candidates => self.candidates = None,
            Field::ValidatedAccessions => self.validated_accessions = None,
        }
    }

    /// One-line human summary, used as the progress detail.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(round) = self.search_rounds {
            parts.push(format!("search round {}", round));
        }
        if let Some(ref q) = self.search_query {
            parts.push(format!("query \"{}\"", q));
        }
        if let Some(ref v) = self.retrieved_articles {
            parts.push(format!("{} new articles", v.len()));
        }
        if let Some(total) = self.total_articles_fetched {
            parts.push(format!("{} fetched in total", total));
        }
        if let Some(ref v) = self.classifications {
            parts.push(format!("{} classified", v.len()));
        }
        if let Some(ref v) = self.confirmed_articles {
            parts.push(format!("{} relevant", v.len()));
        }
        if let Some(ref v) = self.unclear_articles {
            parts.push(format!("{} ambiguous", v.len()));
        }
        if let Some(ref v) = self.candidates {
            parts.push(format!("{} candidates", v.len()));
        }
        if let Some(ref v) = self.validated_accessions {
            parts.push(format!("{} validated accessions", v.len()));
        }
        if let Some(ref v) = self.articles_to_process {
            parts.push(format!("{} queued", v.len()));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}
