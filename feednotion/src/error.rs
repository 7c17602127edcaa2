use thiserror::Error;

/// Failure of a single feed, listing or article fetch.
///
/// Callers never propagate these past the item they were working on; each
/// call site picks the fallback (next URL variant, no extracted text, ...).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("invalid url '{0}'")]
    Url(String),
}

impl FetchError {
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn parse(url: &str, reason: impl ToString) -> Self {
        FetchError::Parse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
