use thiserror::Error;

#[derive(Debug, Error)]
pub enum SifterError {
    // Collaborator errors
    #[error("Literature search failed: {0}")]
    Retrieval(String),

    #[error("Relevance classification failed: {0}")]
    Classification(String),

    #[error("Entity extraction failed: {0}")]
    Extraction(String),

    #[error("Full-text retrieval failed: {0}")]
    FullText(String),

    #[error("Accession lookup failed: {0}")]
    Lookup(String),

    #[error("HTTP request failed: {service}: {message}")]
    Http { service: String, message: String },

    #[error("Malformed response from {service}: {message}")]
    Response { service: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SifterError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            SifterError::Http { message, .. } => {
                message.contains("429")
                    || message.contains("500")
                    || message.contains("502")
                    || message.contains("503")
                    || message.contains("504")
                    || message.contains("timed out")
                    || message.contains("connection")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SifterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_errors_are_transient() {
        let e = SifterError::Http {
            service: "semantic_scholar".into(),
            message: "status 503 Service Unavailable".into(),
        };
        assert!(e.is_transient());

        let e = SifterError::Http {
            service: "semantic_scholar".into(),
            message: "status 400 Bad Request".into(),
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn non_http_errors_are_not_transient() {
        assert!(!SifterError::Retrieval("boom".into()).is_transient());
        assert!(!SifterError::Config("bad".into()).is_transient());
    }
}
