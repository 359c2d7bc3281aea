//! HTTP implementation of the Monarch Money login handshake and GraphQL API.
//!
//! [`Connector`] and [`MonarchApi`] are the seams the authentication layer
//! depends on; [`HttpConnector`] is the production implementation backed by
//! `reqwest`.

extern crate alloc;

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::monarch::error::ApiError;

/// Production API base URL.
pub(crate) const DEFAULT_API_URL: &str = "https://api.monarchmoney.com";

/// Login endpoint, relative to the base URL.
const LOGIN_PATH: &str = "auth/login/";

/// GraphQL endpoint, relative to the base URL.
const GRAPHQL_PATH: &str = "graphql";

/// Upper bound on a single API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header the web client sends on every request.
const CLIENT_PLATFORM: HeaderName = HeaderName::from_static("client-platform");

/// User agent reported to the API.
const USER_AGENT: &str = concat!("monarch-mcp/", env!("CARGO_PKG_VERSION"));

/// A client bound to one session token.
#[async_trait]
pub(crate) trait MonarchApi: Send + Sync {
    /// Executes a GraphQL operation and returns its `data` object.
    async fn graphql(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<Value, ApiError>;
}

/// Entry point to the API: the login handshake and token-bound clients.
#[async_trait]
pub(crate) trait Connector: Send + Sync {
    /// Exchanges email and password for a session token.
    ///
    /// Returns [`ApiError::MfaRequired`] when the account needs a second
    /// factor.
    async fn login(&self, email: &str, password: &SecretString) -> Result<String, ApiError>;

    /// Completes a login with a one-time second-factor code.
    async fn multi_factor_authenticate(
        &self,
        email: &str,
        password: &SecretString,
        code: &str,
    ) -> Result<String, ApiError>;

    /// Builds a client that authorizes with `token`. Makes no network call.
    fn with_token(&self, token: &str) -> Result<Arc<dyn MonarchApi>, ApiError>;
}

/// `reqwest`-backed [`Connector`].
#[derive(Debug, Clone)]
pub(crate) struct HttpConnector {
    /// Shared HTTP client (connection pool).
    http: reqwest::Client,
    /// API base URL.
    base_url: Url,
}

/// Body of the login request.
#[derive(Debug, Serialize)]
struct LoginRequest<'req> {
    /// Account email.
    username: &'req str,
    /// Account password.
    password: &'req str,
    /// Lets the API answer with an MFA challenge instead of a hard failure.
    supports_mfa: bool,
    /// Whether to remember this device.
    trusted_device: bool,
    /// One-time code, on the second leg of an MFA login.
    #[serde(skip_serializing_if = "Option::is_none")]
    totp: Option<&'req str>,
}

/// Successful login reply.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    /// Issued session token.
    token: String,
}

/// Error reply of the login endpoint.
#[derive(Debug, Deserialize)]
struct RejectionBody {
    /// Human-readable reason.
    detail: Option<String>,
    /// Machine-readable reason.
    error_code: Option<String>,
}

impl HttpConnector {
    /// Creates a connector for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub(crate) fn new(base_url: Url) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let _accept = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let _platform = headers.insert(CLIENT_PLATFORM, HeaderValue::from_static("web"));
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    /// Posts a login request and interprets the reply.
    async fn authenticate(&self, request: &LoginRequest<'_>) -> Result<String, ApiError> {
        let url = self.base_url.join(LOGIN_PATH)?;
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            let body: LoginResponse = response
                .json()
                .await
                .map_err(|err| ApiError::Decode(format!("login response: {err}")))?;
            return Ok(body.token);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "login request rejected");
        Err(login_failure(status, headers, &body, request.totp.is_some()))
    }
}

/// Maps a failed login reply to an [`ApiError`].
///
/// A JSON 403 on the first leg is the MFA challenge. Client-side statuses
/// mean the credentials (or code) were rejected; anything else is kept as a
/// plain HTTP fault.
fn login_failure(status: StatusCode, headers: HeaderMap, body: &str, with_code: bool) -> ApiError {
    let json_reply = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"));
    match status {
        StatusCode::FORBIDDEN if !with_code && json_reply => ApiError::MfaRequired,
        StatusCode::FORBIDDEN if !json_reply => {
            ApiError::http(status.as_u16(), Some(headers), body)
        }
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => ApiError::LoginFailed(rejection_detail(body)),
        _ => ApiError::http(status.as_u16(), Some(headers), body),
    }
}

/// Extracts the reason from a login rejection body.
fn rejection_detail(body: &str) -> String {
    serde_json::from_str::<RejectionBody>(body)
        .ok()
        .and_then(|rejection| rejection.detail.or(rejection.error_code))
        .unwrap_or_else(|| "credentials rejected".to_owned())
}

#[async_trait]
impl Connector for HttpConnector {
    async fn login(&self, email: &str, password: &SecretString) -> Result<String, ApiError> {
        self.authenticate(&LoginRequest {
            username: email,
            password: password.expose_secret(),
            supports_mfa: true,
            trusted_device: false,
            totp: None,
        })
        .await
    }

    async fn multi_factor_authenticate(
        &self,
        email: &str,
        password: &SecretString,
        code: &str,
    ) -> Result<String, ApiError> {
        self.authenticate(&LoginRequest {
            username: email,
            password: password.expose_secret(),
            supports_mfa: true,
            trusted_device: false,
            totp: Some(code),
        })
        .await
    }

    fn with_token(&self, token: &str) -> Result<Arc<dyn MonarchApi>, ApiError> {
        let mut authorization = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_invalid| ApiError::InvalidToken)?;
        authorization.set_sensitive(true);
        Ok(Arc::new(TokenClient {
            http: self.http.clone(),
            endpoint: self.base_url.join(GRAPHQL_PATH)?,
            authorization,
        }))
    }
}

/// GraphQL client bound to one token.
#[derive(Debug)]
struct TokenClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Absolute GraphQL endpoint.
    endpoint: Url,
    /// `Token <token>` header value, marked sensitive.
    authorization: HeaderValue,
}

/// GraphQL request body.
#[derive(Debug, Serialize)]
struct GraphqlRequest<'req> {
    /// Operation name, as the web client sends it.
    #[serde(rename = "operationName")]
    operation_name: &'req str,
    /// Query document.
    query: &'req str,
    /// Operation variables.
    variables: Value,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    /// Result data.
    data: Option<Value>,
    /// Errors reported alongside (or instead of) data.
    errors: Option<Vec<GraphqlError>>,
}

/// One GraphQL error entry.
#[derive(Debug, Deserialize)]
struct GraphqlError {
    /// Error description.
    message: String,
}

#[async_trait]
impl MonarchApi for TokenClient {
    async fn graphql(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<Value, ApiError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&GraphqlRequest {
                operation_name: operation,
                query,
                variables,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(operation, status = status.as_u16(), "GraphQL request failed");
            return Err(ApiError::http(status.as_u16(), Some(headers), &body));
        }
        let envelope: GraphqlEnvelope = response
            .json()
            .await
            .map_err(|err| ApiError::Decode(format!("{operation}: {err}")))?;
        let errors = envelope.errors.unwrap_or_default();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.into_iter().map(|error| error.message).collect();
            return Err(ApiError::Query(messages.join("; ")));
        }
        envelope
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| ApiError::Decode(format!("{operation}: response carried no data")))
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and panics on unexpected variants"
)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use url::Url;

    use super::{Connector, HttpConnector};
    use crate::monarch::error::ApiError;

    async fn spawn_stub(app: Router) -> HttpConnector {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub should bind");
        let addr = listener.local_addr().expect("stub should have an address");
        let _server = tokio::spawn(async move { axum::serve(listener, app).await });
        let base = Url::parse(&format!("http://{addr}")).expect("stub URL should parse");
        HttpConnector::new(base).expect("connector should build")
    }

    fn password() -> SecretString {
        SecretString::from("hunter2".to_owned())
    }

    #[tokio::test]
    async fn login_returns_issued_token() {
        let app = Router::new().route(
            "/auth/login/",
            post(|Json(body): Json<Value>| async move {
                if body["username"] == "me@example.com"
                    && body["password"] == "hunter2"
                    && body["supports_mfa"] == true
                    && body.get("totp").is_none()
                {
                    (StatusCode::OK, Json(json!({ "token": "tok-123" })))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({ "detail": "bad body" })))
                }
            }),
        );
        let connector = spawn_stub(app).await;
        let token = connector
            .login("me@example.com", &password())
            .await
            .expect("login should succeed");
        assert_eq!(token, "tok-123");
    }

    #[tokio::test]
    async fn json_forbidden_on_login_is_an_mfa_challenge() {
        let app = Router::new().route(
            "/auth/login/",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "detail": "Multi-Factor Auth Required" })),
                )
            }),
        );
        let connector = spawn_stub(app).await;
        let err = connector
            .login("me@example.com", &password())
            .await
            .expect_err("login should require MFA");
        assert!(matches!(err, ApiError::MfaRequired));
    }

    #[tokio::test]
    async fn html_forbidden_on_login_stays_an_http_fault() {
        let app = Router::new().route(
            "/auth/login/",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    [("content-type", "text/html")],
                    "<html>blocked</html>",
                )
            }),
        );
        let connector = spawn_stub(app).await;
        let err = connector
            .login("me@example.com", &password())
            .await
            .expect_err("login should fail");
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn rejected_code_is_a_login_failure() {
        let app = Router::new().route(
            "/auth/login/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["totp"], "123456");
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "detail": "Invalid code" })),
                )
            }),
        );
        let connector = spawn_stub(app).await;
        let err = connector
            .multi_factor_authenticate("me@example.com", &password(), "123456")
            .await
            .expect_err("verification should fail");
        let ApiError::LoginFailed(detail) = err else {
            panic!("expected a login failure, got {err:?}");
        };
        assert_eq!(detail, "Invalid code");
    }

    #[tokio::test]
    async fn server_errors_on_login_keep_their_status() {
        let app = Router::new().route(
            "/auth/login/",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let connector = spawn_stub(app).await;
        let err = connector
            .login("me@example.com", &password())
            .await
            .expect_err("login should fail");
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn graphql_sends_token_and_unwraps_data() {
        let app = Router::new().route(
            "/graphql",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .is_some_and(|value| value == "Token tok-abc");
                if authorized && body["operationName"] == "GetAccounts" {
                    (StatusCode::OK, Json(json!({ "data": { "accounts": [] } })))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "nope" })))
                }
            }),
        );
        let connector = spawn_stub(app).await;
        let api = connector.with_token("tok-abc").expect("client should build");
        let data = api
            .graphql("GetAccounts", "query GetAccounts { accounts { id } }", json!({}))
            .await
            .expect("query should succeed");
        assert_eq!(data, json!({ "accounts": [] }));
    }

    #[tokio::test]
    async fn graphql_unauthorized_carries_status_and_headers() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Token expired" })),
                )
            }),
        );
        let connector = spawn_stub(app).await;
        let api = connector.with_token("stale").expect("client should build");
        let err = api
            .graphql("GetAccounts", "query GetAccounts { accounts { id } }", json!({}))
            .await
            .expect_err("query should fail");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.content_type().as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn graphql_errors_become_query_faults() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                Json(json!({
                    "data": null,
                    "errors": [{ "message": "Something went wrong" }, { "message": "again" }]
                }))
            }),
        );
        let connector = spawn_stub(app).await;
        let api = connector.with_token("tok").expect("client should build");
        let err = api
            .graphql("GetAccounts", "query GetAccounts { accounts { id } }", json!({}))
            .await
            .expect_err("query should fail");
        let ApiError::Query(message) = err else {
            panic!("expected a query fault, got {err:?}");
        };
        assert_eq!(message, "Something went wrong; again");
    }

    #[test]
    fn tokens_with_control_characters_are_refused() {
        let connector = HttpConnector::new(
            Url::parse("http://127.0.0.1:9").expect("URL should parse"),
        )
        .expect("connector should build");
        let result = connector.with_token("bad\ntoken");
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }
}
