use std::io::Write;

use sifter_core::config::{AppConfig, SearchProvider};
use sifter_core::error::SifterError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[pipeline]
target_candidate_count = 8
search_batch_size = 4
max_search_rounds = 6
max_steps = 200
requirement = "Must name an antifungal target."
broadening_terms = ["virulence factors"]

[search]
provider = "semantic_scholar"
base_url = "https://api.semanticscholar.org"
api_key = "s2-test-key"
timeout_secs = 15

[llm]
base_url = "http://localhost:11434/v1"
model = "llama3.2"
temperature = 0.2

[full_text]
enabled = false
email = "lab@example.org"

[uniprot]
enabled = true

[retry]
max_retries = 5
initial_backoff_ms = 200

[gateway]
bind = "0.0.0.0:9999"

[log]
enabled = false
dir = "/tmp/sifter-logs"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.pipeline.target_candidate_count, 8);
    assert_eq!(config.pipeline.search_batch_size, 4);
    assert_eq!(config.pipeline.max_search_rounds, 6);
    assert_eq!(config.pipeline.max_steps, Some(200));
    assert_eq!(config.pipeline.broadening_terms, vec!["virulence factors"]);
    assert_eq!(config.search.provider, SearchProvider::SemanticScholar);
    assert_eq!(config.search.api_key.as_deref(), Some("s2-test-key"));
    assert_eq!(config.search.timeout_secs, 15);
    assert_eq!(config.llm.model, "llama3.2");
    assert!(!config.full_text.enabled);
    assert_eq!(config.full_text.email.as_deref(), Some("lab@example.org"));
    assert!(config.uniprot.enabled);
    assert_eq!(config.uniprot.base_url, "https://rest.uniprot.org");
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.max_backoff_ms, 30000);
    assert_eq!(config.gateway.bind, "0.0.0.0:9999");
    assert!(!config.log.enabled);
    assert_eq!(config.log_dir().to_str(), Some("/tmp/sifter-logs"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SIFTER_TEST_LLM_KEY", "expanded-key-value");

    let toml_content = r#"
[llm]
api_key = "${SIFTER_TEST_LLM_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.llm.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SIFTER_TEST_LLM_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[search]
provider = "paper_finder"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.search.provider, SearchProvider::PaperFinder);
    assert_eq!(config.pipeline.target_candidate_count, 5);
    assert_eq!(config.pipeline.search_batch_size, 2);
    assert_eq!(config.pipeline.max_search_rounds, 3);
    assert!(config.pipeline.max_steps.is_none());
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert!(config.full_text.enabled);
    assert!(!config.uniprot.enabled);
    assert_eq!(config.gateway.bind, "127.0.0.1:18790");
    assert!(config.log.enabled);
}

#[test]
fn test_invalid_values_are_rejected() {
    let toml_content = r#"
[pipeline]
max_steps = 0
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, SifterError::Config(_)));
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SifterError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[pipeline\nsearch_batch_size = ").expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, SifterError::Config(_)));
}
