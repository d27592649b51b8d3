use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use sifter_core::traits::AccessionLookup;

use crate::graph::{Field, Node, NodeError, NodeId, PipelineState, StateUpdate};

/// Collects the distinct accession ids of all candidates, optionally keeping
/// only those an upstream database knows.
pub struct ValidateNode {
    lookup: Option<Arc<dyn AccessionLookup>>,
}

impl ValidateNode {
    pub fn new(lookup: Option<Arc<dyn AccessionLookup>>) -> Self {
        Self { lookup }
    }
}

impl Node for ValidateNode {
    fn id(&self) -> NodeId {
        NodeId::Validate
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::ValidatedAccessions]
    }

    fn apply<'a>(
        &'a self,
        state: &'a PipelineState,
    ) -> BoxFuture<'a, Result<StateUpdate, NodeError>> {
        Box::pin(async move {
            let accessions: BTreeSet<String> = state
                .candidates
                .iter()
                .filter_map(|c| c.accession_id.as_deref())
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();

            let validated: Vec<String> = match &self.lookup {
                None => accessions.into_iter().collect(),
                Some(lookup) => {
                    let mut kept = Vec::new();
                    for accession in accessions {
                        match lookup.exists(&accession).await {
                            Ok(true) => kept.push(accession),
                            Ok(false) => info!(accession = %accession, "Accession not found"),
                            Err(e) => {
                                warn!(accession = %accession, error = %e, "Accession lookup failed")
                            }
                        }
                    }
                    kept
                }
            };

            info!(
                candidates = state.candidates.len(),
                validated = validated.len(),
                "Validation complete"
            );
            Ok(StateUpdate {
                validated_accessions: Some(validated),
                ..Default::default()
            })
        })
    }
}
