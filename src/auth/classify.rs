//! Decides whether a failed API call means the session token is bad.
//!
//! A 403 from the API is ambiguous: the API itself answers with JSON, while
//! the web application firewall in front of it answers with an HTML block
//! page. Only the former says anything about the token.

use crate::monarch::ApiError;

/// What a fault says about the stored session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The token is invalid or expired: delete it and log in again.
    AuthFault,
    /// Rejected by an intermediary filter: keep the token, surface the error.
    BoundaryNoise,
    /// Server or network trouble: keep the token, do not log in again.
    Inconclusive,
}

/// Classifies a fault raised by the API client.
pub(crate) fn classify(err: &ApiError) -> Verdict {
    match *err {
        ApiError::Http { status: 401, .. } | ApiError::LoginFailed(_) => Verdict::AuthFault,
        ApiError::Http { status: 403, .. } => {
            let json = err
                .content_type()
                .is_some_and(|content_type| content_type.contains("application/json"));
            if json {
                Verdict::AuthFault
            } else {
                tracing::warn!(
                    content_type = err.content_type().as_deref().unwrap_or("<none>"),
                    "403 without a JSON body; treating as a firewall block, token kept"
                );
                Verdict::BoundaryNoise
            }
        }
        ApiError::Http { .. }
        | ApiError::MfaRequired
        | ApiError::Query(_)
        | ApiError::Transport(_)
        | ApiError::Decode(_)
        | ApiError::InvalidUrl(_)
        | ApiError::InvalidToken => Verdict::Inconclusive,
    }
}

/// Whether `err` means the token must be discarded.
pub(crate) fn is_auth_error(err: &ApiError) -> bool {
    classify(err) == Verdict::AuthFault
}

#[cfg(test)]
#[allow(
    clippy::missing_docs_in_private_items,
    reason = "test code"
)]
mod tests {
    use super::{Verdict, classify, is_auth_error};
    use crate::monarch::ApiError;
    use crate::test_support::http_error;

    #[test]
    fn unauthorized_is_always_an_auth_fault() {
        assert_eq!(classify(&http_error(401, None)), Verdict::AuthFault);
        assert_eq!(classify(&http_error(401, Some("text/html"))), Verdict::AuthFault);
        assert!(is_auth_error(&http_error(401, Some("application/json"))));
    }

    #[test]
    fn forbidden_depends_on_the_body_type() {
        assert_eq!(
            classify(&http_error(403, Some("application/json; charset=utf-8"))),
            Verdict::AuthFault
        );
        assert_eq!(
            classify(&http_error(403, Some("Application/JSON"))),
            Verdict::AuthFault
        );
        assert_eq!(
            classify(&http_error(403, Some("text/html"))),
            Verdict::BoundaryNoise
        );
        assert_eq!(classify(&http_error(403, None)), Verdict::BoundaryNoise);
        assert!(!is_auth_error(&http_error(403, Some("text/html"))));
    }

    #[test]
    fn rejected_login_is_an_auth_fault() {
        assert!(is_auth_error(&ApiError::LoginFailed("bad token".to_owned())));
    }

    #[test]
    fn everything_else_is_inconclusive() {
        for err in [
            http_error(500, Some("application/json")),
            http_error(429, None),
            ApiError::MfaRequired,
            ApiError::Query("Something went wrong".to_owned()),
            ApiError::Decode("truncated".to_owned()),
            ApiError::InvalidToken,
        ] {
            assert_eq!(classify(&err), Verdict::Inconclusive, "{err}");
        }
    }
}
