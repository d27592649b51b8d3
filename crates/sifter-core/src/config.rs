use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SifterError};

/// Top-level Sifter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub full_text: FullTextConfig,
    #[serde(default)]
    pub uniprot: UniProtConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Seed values for every job and the loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stop searching once this many unique candidates are collected.
    #[serde(default = "default_target_candidate_count")]
    pub target_candidate_count: usize,
    /// Articles requested per search round.
    #[serde(default = "default_search_batch_size")]
    pub search_batch_size: usize,
    /// Give up after this many search rounds.
    #[serde(default = "default_max_search_rounds")]
    pub max_search_rounds: usize,
    /// Hard executor step ceiling. Derived from the graph size when unset.
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// Requirement each article is classified against.
    #[serde(default = "default_requirement")]
    pub requirement: String,
    /// Terms OR-ed onto the query when a round comes up short.
    #[serde(default = "default_broadening_terms")]
    pub broadening_terms: Vec<String>,
    /// Finished jobs kept for status queries. The oldest are evicted first.
    #[serde(default = "default_max_retained_jobs")]
    pub max_retained_jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_candidate_count: default_target_candidate_count(),
            search_batch_size: default_search_batch_size(),
            max_search_rounds: default_max_search_rounds(),
            max_steps: None,
            requirement: default_requirement(),
            broadening_terms: default_broadening_terms(),
            max_retained_jobs: default_max_retained_jobs(),
        }
    }
}

fn default_target_candidate_count() -> usize { 5 }
fn default_search_batch_size() -> usize { 2 }
fn default_max_search_rounds() -> usize { 3 }
fn default_requirement() -> String {
    "The article must relate to potential drug, vaccine, or antifungal targets.".to_string()
}
fn default_broadening_terms() -> Vec<String> {
    vec!["related enzymes".to_string(), "essential genes".to_string()]
}
fn default_max_retained_jobs() -> usize { 1000 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    #[default]
    SemanticScholar,
    PaperFinder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProvider,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::default(),
            base_url: None,
            api_key: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_timeout() -> u64 { 30 }

/// OpenAI-compatible chat endpoint used for classification and extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 120 }

/// NCBI E-utilities full-text retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTextConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_eutils_base_url")]
    pub base_url: String,
    /// NCBI asks clients to identify themselves.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for FullTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_eutils_base_url(),
            email: None,
            api_key: None,
        }
    }
}

fn default_eutils_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniProtConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_uniprot_base_url")]
    pub base_url: String,
}

impl Default for UniProtConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_uniprot_base_url(),
        }
    }
}

fn default_uniprot_base_url() -> String { "https://rest.uniprot.org".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:18790".to_string() }

/// Plain-text run log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory for run logs. One file per process run.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
        }
    }
}

fn default_true() -> bool { true }
fn default_log_dir() -> String { "logs".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SifterError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| SifterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.search_batch_size == 0 {
            return Err(SifterError::Config(
                "pipeline.search_batch_size must be at least 1".into(),
            ));
        }
        if self.pipeline.max_search_rounds == 0 {
            return Err(SifterError::Config(
                "pipeline.max_search_rounds must be at least 1".into(),
            ));
        }
        if self.pipeline.max_steps == Some(0) {
            return Err(SifterError::Config("pipeline.max_steps must be positive".into()));
        }
        if self.pipeline.max_retained_jobs == 0 {
            return Err(SifterError::Config(
                "pipeline.max_retained_jobs must be at least 1".into(),
            ));
        }
        if self.pipeline.broadening_terms.iter().all(|t| t.trim().is_empty()) {
            return Err(SifterError::Config(
                "pipeline.broadening_terms needs at least one term".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the run-log directory (expand ~).
    pub fn log_dir(&self) -> PathBuf {
        let dir = &self.log.dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay verbatim
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SIFTER_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SIFTER_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SIFTER_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SIFTER_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SIFTER_VAR}\"");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.target_candidate_count, 5);
        assert_eq!(config.pipeline.search_batch_size, 2);
        assert_eq!(config.pipeline.max_search_rounds, 3);
        assert!(config.pipeline.max_steps.is_none());
        assert_eq!(config.pipeline.max_retained_jobs, 1000);
        assert_eq!(config.search.provider, SearchProvider::SemanticScholar);
        assert!(config.full_text.enabled);
        assert!(!config.uniprot.enabled);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.gateway.bind, "127.0.0.1:18790");
        assert!(config.log.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_provider_parsing() {
        let config: AppConfig = toml::from_str(
            r#"
[search]
provider = "paper_finder"
base_url = "http://localhost:8000"
"#,
        )
        .unwrap();
        assert_eq!(config.search.provider, SearchProvider::PaperFinder);
        assert_eq!(config.search.base_url.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config: AppConfig = toml::from_str(
            r#"
[pipeline]
search_batch_size = 0
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(SifterError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let config: AppConfig = toml::from_str(
            r#"
[pipeline]
max_retained_jobs = 0
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(SifterError::Config(_))));
    }
}
