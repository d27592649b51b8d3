use sifter_core::error::SifterError;

/// Map a transport error, tagging timeouts and connection failures so
/// `SifterError::is_transient` recognizes them.
pub(crate) fn transport_error(service: &str, e: reqwest::Error) -> SifterError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    SifterError::Http {
        service: service.to_string(),
        message,
    }
}

/// Turn a non-2xx response into an error carrying the status code.
pub(crate) async fn check_status(
    service: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SifterError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(SifterError::Http {
        service: service.to_string(),
        message: format!("status {}: {}", status.as_u16(), snippet),
    })
}

pub(crate) fn parse_error(service: &str, e: impl std::fmt::Display) -> SifterError {
    SifterError::Response {
        service: service.to_string(),
        message: e.to_string(),
    }
}

/// Trim a base URL so paths can be appended with a single `/`.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
