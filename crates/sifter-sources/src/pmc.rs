use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use sifter_core::config::{FullTextConfig, RetryConfig};
use sifter_core::error::{Result, SifterError};
use sifter_core::traits::FullTextFetcher;

use crate::http::{check_status, join, parse_error, transport_error};
use crate::retry::with_retry;

const SERVICE: &str = "ncbi_eutils";
const TOOL_NAME: &str = "sifter";

/// Full text from PubMed Central via NCBI E-utilities.
///
/// Accepts a PMID or a DOI. DOIs are resolved to a PMID with `esearch`,
/// the PMID is linked to a PMC id with `elink`, and the article XML is
/// fetched with `efetch`. Paragraphs inside `<body>` become the text.
pub struct PmcFullText {
    base_url: String,
    email: Option<String>,
    api_key: Option<String>,
    retry: RetryConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Deserialize)]
struct LinkEnvelope {
    #[serde(default)]
    linksets: Vec<LinkSet>,
}

#[derive(Deserialize)]
struct LinkSet {
    #[serde(default)]
    linksetdbs: Vec<LinkSetDb>,
}

#[derive(Deserialize)]
struct LinkSetDb {
    #[serde(default)]
    links: Vec<serde_json::Value>,
}

impl PmcFullText {
    pub fn new(config: &FullTextConfig, retry: RetryConfig) -> Self {
        if config.email.is_none() {
            warn!("full_text.email not set; NCBI may throttle anonymous clients");
        }
        Self {
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            retry,
            http: crate::build_http(60),
        }
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("tool", TOOL_NAME));
        if let Some(ref email) = self.email {
            query.push(("email", email));
        }
        if let Some(ref key) = self.api_key {
            query.push(("api_key", key));
        }
        self.http.get(join(&self.base_url, endpoint)).query(&query)
    }

    async fn send_text(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
        with_retry(&self.retry, SERVICE, || {
            let request = self.get(endpoint, params);
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| transport_error(SERVICE, e))?;
                let resp = check_status(SERVICE, resp).await?;
                resp.text().await.map_err(|e| transport_error(SERVICE, e))
            }
        })
        .await
    }

    async fn resolve_pmid(&self, identifier: &str) -> Result<Option<String>> {
        if identifier.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(identifier.to_string()));
        }
        let term = format!("{}[doi]", identifier);
        let body = self
            .send_text(
                "esearch.fcgi",
                &[("db", "pubmed"), ("term", &term), ("retmode", "json")],
            )
            .await?;
        let envelope: SearchEnvelope =
            serde_json::from_str(&body).map_err(|e| parse_error(SERVICE, e))?;
        Ok(envelope.esearchresult.idlist.into_iter().next())
    }

    async fn link_pmc(&self, pmid: &str) -> Result<Option<String>> {
        let body = self
            .send_text(
                "elink.fcgi",
                &[
                    ("dbfrom", "pubmed"),
                    ("db", "pmc"),
                    ("id", pmid),
                    ("linkname", "pubmed_pmc"),
                    ("retmode", "json"),
                ],
            )
            .await?;
        let envelope: LinkEnvelope =
            serde_json::from_str(&body).map_err(|e| parse_error(SERVICE, e))?;
        Ok(first_link(envelope))
    }
}

fn first_link(envelope: LinkEnvelope) -> Option<String> {
    envelope
        .linksets
        .into_iter()
        .flat_map(|s| s.linksetdbs)
        .flat_map(|db| db.links)
        .find_map(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<p\b[^>]*>(.*?)</p>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#x2009;", " ")
        .replace("&#160;", " ")
        .replace("&amp;", "&")
}

/// Join the paragraphs of the article body. `None` when the XML has no body text.
pub(crate) fn body_text(xml: &str) -> Option<String> {
    let start = xml.find("<body")?;
    let end = xml[start..].find("</body>").map_or(xml.len(), |i| start + i);
    let body = &xml[start..end];

    let paragraphs: Vec<String> = paragraph_re()
        .captures_iter(body)
        .map(|cap| {
            let inner = tag_re().replace_all(&cap[1], "");
            unescape(inner.split_whitespace().collect::<Vec<_>>().join(" ").as_str())
        })
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n"))
    }
}

impl FullTextFetcher for PmcFullText {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let identifier = identifier.trim();
            if identifier.is_empty() {
                return Err(SifterError::FullText("empty identifier".into()));
            }
            if identifier.starts_with("CorpusId:") {
                return Ok(None);
            }

            let Some(pmid) = self.resolve_pmid(identifier).await? else {
                debug!(identifier, "No PubMed record for identifier");
                return Ok(None);
            };
            let Some(pmcid) = self.link_pmc(&pmid).await? else {
                debug!(pmid = %pmid, "No PMC link for article");
                return Ok(None);
            };

            info!(pmid = %pmid, pmcid = %pmcid, "Fetching full text from PMC");
            let xml = self
                .send_text("efetch.fcgi", &[("db", "pmc"), ("id", &pmcid), ("rettype", "xml")])
                .await?;

            let text = body_text(&xml);
            if text.is_none() {
                warn!(pmcid = %pmcid, "PMC record has no parsable body");
            }
            Ok(text)
        })
    }
}
