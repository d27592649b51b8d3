use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A retrieved scientific article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub pmid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub is_open_access: bool,
    #[serde(default)]
    pub full_text_url: Option<String>,
    #[serde(default)]
    pub relevance_score: f64,
}

impl Article {
    pub fn new(doi: Option<String>, pmid: Option<String>, title: impl Into<String>) -> Self {
        Self {
            doi,
            pmid,
            title: title.into(),
            abstract_text: String::new(),
            is_open_access: false,
            full_text_url: None,
            relevance_score: 0.0,
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn with_open_access(mut self, url: Option<String>) -> Self {
        self.is_open_access = true;
        self.full_text_url = url;
        self
    }

    /// Set the relevance score, clamped to [0, 1].
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        self
    }

    /// Whether the article carries at least one external identifier.
    pub fn has_identifier(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.trim().is_empty())
            || self.pmid.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// Stable key used to associate annotations with this article.
    ///
    /// The DOI (lowercased) when present, otherwise `pmid:<id>`.
    pub fn key(&self) -> String {
        match (&self.doi, &self.pmid) {
            (Some(doi), _) if !doi.trim().is_empty() => doi.trim().to_lowercase(),
            (_, Some(pmid)) if !pmid.trim().is_empty() => format!("pmid:{}", pmid.trim()),
            _ => String::new(),
        }
    }
}

/// Three-way relevance label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    #[serde(alias = "true")]
    Relevant,
    #[serde(alias = "false")]
    Irrelevant,
    #[serde(alias = "unclear")]
    Ambiguous,
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Relevance::Relevant => "relevant",
            Relevance::Irrelevant => "irrelevant",
            Relevance::Ambiguous => "ambiguous",
        };
        write!(f, "{}", s)
    }
}

/// Relevance decision for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub article: String,
    pub label: Relevance,
    #[serde(default)]
    pub rationale: String,
}

impl Classification {
    pub fn new(article: impl Into<String>, label: Relevance, rationale: impl Into<String>) -> Self {
        Self {
            article: article.into(),
            label,
            rationale: rationale.into(),
        }
    }
}

/// An extracted entity candidate (e.g. a protein drug target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(alias = "protein_name")]
    pub name: String,
    #[serde(default, alias = "species")]
    pub organism: String,
    #[serde(default)]
    pub accession_id: Option<String>,
    #[serde(default)]
    pub source_article: String,
}

impl Candidate {
    pub fn new(name: impl Into<String>, organism: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            organism: organism.into(),
            accession_id: None,
            source_article: String::new(),
        }
    }

    pub fn with_accession(mut self, accession: impl Into<String>) -> Self {
        self.accession_id = Some(accession.into());
        self
    }

    pub fn from_article(mut self, article_key: impl Into<String>) -> Self {
        self.source_article = article_key.into();
        self
    }

    /// Identity used for deduplication: (article key, case-folded entity name).
    pub fn dedup_key(&self) -> (String, String) {
        (self.source_article.clone(), self.name.trim().to_lowercase())
    }
}

/// Terminal status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Observer-facing event for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    /// The job's runner task has started.
    Started,
    /// One graph node completed.
    Progress {
        node: String,
        detail: String,
        step: u64,
    },
    /// Final (or partial, after a failure) candidate list.
    Results { items: Vec<Candidate> },
    /// The executor failed.
    Error { message: String },
    /// Terminal marker, always the last event of a job.
    Complete,
}

impl JobEvent {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Started => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Results { .. } => "results",
            JobEvent::Error { .. } => "error",
            JobEvent::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete)
    }
}

/// A job event stamped with its job id and per-job sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub job_id: JobId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: JobEvent,
}
