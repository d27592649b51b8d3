use futures::future::BoxFuture;
use reqwest::StatusCode;
use tracing::debug;

use sifter_core::config::{RetryConfig, UniProtConfig};
use sifter_core::error::{Result, SifterError};
use sifter_core::traits::AccessionLookup;

use crate::http::{check_status, join, transport_error};
use crate::retry::with_retry;

const SERVICE: &str = "uniprot";

/// Accession existence checks against the UniProt REST API.
pub struct UniProtLookup {
    base_url: String,
    retry: RetryConfig,
    http: reqwest::Client,
}

impl UniProtLookup {
    pub fn new(config: &UniProtConfig, retry: RetryConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            retry,
            http: crate::build_http(30),
        }
    }
}

/// UniProtKB accessions are 6 or 10 alphanumeric characters.
pub(crate) fn looks_like_accession(accession: &str) -> bool {
    matches!(accession.len(), 6 | 10) && accession.chars().all(|c| c.is_ascii_alphanumeric())
}

impl AccessionLookup for UniProtLookup {
    fn exists<'a>(&'a self, accession: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let accession = accession.trim();
            if accession.is_empty() {
                return Err(SifterError::Lookup("empty accession".into()));
            }
            if !looks_like_accession(accession) {
                debug!(accession, "Not a UniProtKB accession");
                return Ok(false);
            }

            let url = join(&self.base_url, &format!("uniprotkb/{}.json", accession));
            let found = with_retry(&self.retry, SERVICE, || {
                let request = self.http.get(&url).query(&[("fields", "accession")]);
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| transport_error(SERVICE, e))?;
                    if resp.status() == StatusCode::NOT_FOUND {
                        return Ok(false);
                    }
                    check_status(SERVICE, resp).await?;
                    Ok(true)
                }
            })
            .await?;

            debug!(accession, found, "UniProt lookup");
            Ok(found)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accession_shape() {
        assert!(looks_like_accession("P12345"));
        assert!(looks_like_accession("A0A024RBG1"));
        assert!(!looks_like_accession("Cyp51"));
        assert!(!looks_like_accession("P1234-5"));
    }

    #[tokio::test]
    async fn empty_accession_is_an_error() {
        let lookup = UniProtLookup::new(&UniProtConfig::default(), RetryConfig::default());
        assert!(lookup.exists("  ").await.is_err());
        assert!(!lookup.exists("not-an-id").await.unwrap());
    }
}
