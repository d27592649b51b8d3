use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use sifter_core::error::{Result, SifterError};
use sifter_core::traits::EntityExtractor;
use sifter_core::types::Candidate;

use crate::llm::ChatClient;

const SYSTEM_PROMPT: &str = "\
You are a biomedical named entity recognition specialist.
Extract every potential drug target protein from the provided text.
For each one report:
- name: the protein name (e.g. \"Cyp51\", \"Hsp90\")
- organism: the source species (e.g. \"Coccidioides immitis\")
- accession_id: a UniProt or other accession id if the text mentions one, else null
Reply with a JSON object {\"candidates\": [...]}. Use an empty list if none are found.";

/// Longest text forwarded to the model, in characters.
const MAX_TEXT_CHARS: usize = 60_000;

/// Entity extraction backed by an LLM.
pub struct LlmExtractor {
    chat: Arc<ChatClient>,
}

#[derive(Deserialize)]
struct CandidateBatch {
    #[serde(default, alias = "protein_candidates")]
    candidates: Vec<Candidate>,
}

impl LlmExtractor {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

fn clean(batch: CandidateBatch) -> Vec<Candidate> {
    batch
        .candidates
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .map(|mut c| {
            c.name = c.name.trim().to_string();
            c.organism = c.organism.trim().to_string();
            c.accession_id = c
                .accession_id
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());
            c
        })
        .collect()
}

impl EntityExtractor for LlmExtractor {
    fn extract<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(async move {
            if text.trim().is_empty() {
                warn!("Extraction called with empty text");
                return Ok(vec![]);
            }

            let text: String = text.chars().take(MAX_TEXT_CHARS).collect();
            info!(chars = text.len(), "Extracting entities");

            let reply = self
                .chat
                .complete_json(SYSTEM_PROMPT, &format!("Here is the text:\n\n{}", text))
                .await?;
            let batch: CandidateBatch = serde_json::from_value(reply)
                .map_err(|e| SifterError::Extraction(e.to_string()))?;

            let candidates = clean(batch);
            info!(count = candidates.len(), "Extraction complete");
            Ok(candidates)
        })
    }
}
