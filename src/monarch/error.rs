//! Errors raised by the Monarch Money client.

use reqwest::header::{CONTENT_TYPE, HeaderMap};

/// Longest response excerpt carried inside an [`ApiError::Http`].
const MAX_MESSAGE_CHARS: usize = 200;

/// A fault reported by the remote API or the transport underneath it.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    /// The API answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response headers, when the transport surfaced them.
        headers: Option<HeaderMap>,
        /// Short excerpt of the response body.
        message: String,
    },
    /// Credentials or token were rejected at the protocol layer.
    #[error("login failed: {0}")]
    LoginFailed(String),
    /// The account requires a second authentication factor.
    #[error("multi-factor authentication required")]
    MfaRequired,
    /// The GraphQL response carried an `errors` array.
    #[error("{0}")]
    Query(String),
    /// The request never produced an HTTP response.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The response could not be interpreted.
    #[error("unexpected response: {0}")]
    Decode(String),
    /// The configured API base URL cannot be joined with an endpoint path.
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The session token cannot be carried in an HTTP header.
    #[error("session token contains characters not allowed in a header")]
    InvalidToken,
}

impl ApiError {
    /// Builds an [`ApiError::Http`] from a failed response's parts.
    pub(crate) fn http(status: u16, headers: Option<HeaderMap>, body: &str) -> Self {
        let trimmed = body.trim();
        let message = if trimmed.is_empty() {
            "empty response body".to_owned()
        } else {
            trimmed.chars().take(MAX_MESSAGE_CHARS).collect()
        };
        Self::Http {
            status,
            headers,
            message,
        }
    }

    /// HTTP status code carried by the fault, if any.
    pub(crate) const fn status(&self) -> Option<u16> {
        match *self {
            Self::Http { status, .. } => Some(status),
            Self::LoginFailed(_)
            | Self::MfaRequired
            | Self::Query(_)
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::InvalidUrl(_)
            | Self::InvalidToken => None,
        }
    }

    /// Lower-cased `content-type` of the failed response, if one was carried.
    pub(crate) fn content_type(&self) -> Option<String> {
        let Self::Http {
            headers: Some(headers),
            ..
        } = self
        else {
            return None;
        };
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::missing_docs_in_private_items,
    reason = "test code panics on unexpected variants"
)]
mod tests {
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

    use super::ApiError;

    #[test]
    fn http_error_truncates_long_bodies() {
        let body = "x".repeat(1_000);
        let err = ApiError::http(502, None, &body);
        let ApiError::Http { message, .. } = err else {
            panic!("expected an HTTP error");
        };
        assert_eq!(message.len(), 200);
    }

    #[test]
    fn http_error_names_empty_bodies() {
        let err = ApiError::http(500, None, "   ");
        assert_eq!(err.to_string(), "HTTP 500: empty response body");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn content_type_is_lower_cased() {
        let mut headers = HeaderMap::new();
        let _previous = headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        let err = ApiError::http(403, Some(headers), "{}");
        assert_eq!(
            err.content_type().as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn non_http_errors_carry_no_status() {
        let err = ApiError::LoginFailed("bad password".to_owned());
        assert_eq!(err.status(), None);
        assert_eq!(err.content_type(), None);
    }
}
