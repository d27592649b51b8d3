use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use sifter_core::error::{Result, SifterError};
use sifter_core::traits::RelevanceClassifier;
use sifter_core::types::{Article, Classification};

use crate::llm::ChatClient;

const SYSTEM_PROMPT: &str = "\
You review scientific abstracts against a requirement.
For each article, classify its potential to discuss a drug target:
- \"relevant\": the abstract clearly discusses one or more specific targets.
- \"irrelevant\": the abstract is off-topic, a review, or a pure methods paper.
- \"ambiguous\": on-topic but no explicit target; it may be in the full text.
Reply with a JSON object of the form
{\"classifications\": [{\"article\": \"<ID>\", \"label\": \"relevant|irrelevant|ambiguous\", \"rationale\": \"<one sentence>\"}]}
with exactly one entry per article ID.";

/// Relevance classification backed by an LLM.
pub struct LlmClassifier {
    chat: Arc<ChatClient>,
}

#[derive(Deserialize)]
struct ClassificationBatch {
    #[serde(default)]
    classifications: Vec<serde_json::Value>,
}

impl LlmClassifier {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

fn build_prompt(articles: &[Article], requirement: &str) -> String {
    let mut prompt = format!("Requirement: {}\n\n", requirement);
    for article in articles {
        prompt.push_str(&format!(
            "ID: {}\nTITLE: {}\nABSTRACT: {}\n\n",
            article.key(),
            article.title,
            article.abstract_text
        ));
    }
    prompt
}

/// Parse each record on its own. A malformed record is dropped, which leaves
/// its article unclassified.
fn parse_records(batch: ClassificationBatch) -> Vec<Classification> {
    batch
        .classifications
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Classification>(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Dropping malformed classification record");
                None
            }
        })
        .collect()
}

/// Keep one record per known article, normalizing the ids the model echoed.
fn reconcile(records: Vec<Classification>, articles: &[Article]) -> Vec<Classification> {
    let known: HashSet<String> = articles.iter().map(|a| a.key()).collect();
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|mut c| {
            c.article = c.article.trim().to_lowercase();
            if known.contains(&c.article) && seen.insert(c.article.clone()) {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

impl RelevanceClassifier for LlmClassifier {
    fn classify<'a>(
        &'a self,
        articles: &'a [Article],
        requirement: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Classification>>> {
        Box::pin(async move {
            if articles.is_empty() {
                return Ok(vec![]);
            }

            info!(count = articles.len(), model = %self.chat.model(), "Classifying articles");
            let reply = self
                .chat
                .complete_json(SYSTEM_PROMPT, &build_prompt(articles, requirement))
                .await?;

            let batch: ClassificationBatch = serde_json::from_value(reply)
                .map_err(|e| SifterError::Classification(e.to_string()))?;
            let records = reconcile(parse_records(batch), articles);
            if records.len() < articles.len() {
                warn!(
                    expected = articles.len(),
                    got = records.len(),
                    "Classifier skipped some articles"
                );
            }
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use sifter_core::types::Relevance;

    use super::*;

    fn article(doi: &str) -> Article {
        Article::new(Some(doi.into()), None, "t").with_abstract("a")
    }

    #[test]
    fn prompt_lists_every_article() {
        let prompt = build_prompt(&[article("10.1/A"), article("10.1/b")], "targets");
        assert!(prompt.starts_with("Requirement: targets"));
        assert!(prompt.contains("ID: 10.1/a"));
        assert!(prompt.contains("ID: 10.1/b"));
    }

    #[test]
    fn reconcile_drops_unknown_and_duplicate_ids() {
        let batch: ClassificationBatch = serde_json::from_value(serde_json::json!({
            "classifications": [
                {"article": "10.1/A", "label": "relevant", "rationale": "mentions Cyp51"},
                {"article": "10.1/a", "label": "irrelevant", "rationale": "dup"},
                {"article": "10.9/zzz", "label": "relevant", "rationale": "hallucinated"},
                {"article": "10.1/b", "label": "unclear"}
            ]
        }))
        .unwrap();
        let records = reconcile(parse_records(batch), &[article("10.1/a"), article("10.1/b")]);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].article, "10.1/a");
        assert_eq!(records[0].label, Relevance::Relevant);
        assert_eq!(records[1].label, Relevance::Ambiguous);
        assert_eq!(records[1].rationale, "");
    }

    #[test]
    fn bad_label_drops_only_its_own_record() {
        let batch: ClassificationBatch = serde_json::from_value(serde_json::json!({
            "classifications": [
                {"article": "10.1/a", "label": "relevant", "rationale": "names Cyp51"},
                {"article": "10.1/b", "label": "maybe"},
                "not a record"
            ]
        }))
        .unwrap();
        let records = reconcile(parse_records(batch), &[article("10.1/a"), article("10.1/b")]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].article, "10.1/a");
        assert_eq!(records[0].label, Relevance::Relevant);
    }
}
