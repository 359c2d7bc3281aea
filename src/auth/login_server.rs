//! Short-lived loopback web server for signing in.
//!
//! Serves a single page that collects email and password, and a one-time
//! code when the account has multi-factor authentication. The resulting
//! token goes straight to the [`Vault`]; credentials never leave this
//! process except to the Monarch login endpoint.
//!
//! The server stops as soon as a token is saved or when its deadline
//! passes. The [`FlowLease`] it owns is dropped when the serving task ends,
//! however it ends.

extern crate alloc;

use alloc::sync::Arc;
use core::net::Ipv4Addr;
use core::time::Duration;
use std::io;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::auth::guard::FlowLease;
use crate::auth::vault::Vault;
use crate::monarch::{ApiError, Connector};

/// Default wall-clock budget for one sign-in attempt.
pub(crate) const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest a sign-in page stays open.
pub(crate) const MAX_LOGIN_TIMEOUT: Duration = Duration::from_secs(86_400);

/// The sign-in page.
const LOGIN_PAGE: &str = include_str!("login_page.html");

/// How a login server run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowExit {
    /// A token was obtained and saved.
    Completed,
    /// The deadline passed first.
    TimedOut,
    /// The serving task failed.
    Failed,
}

/// Handle to a running login server.
#[derive(Debug)]
pub(crate) struct LoginServer {
    /// Address of the sign-in page.
    url: String,
    /// Serving task.
    task: JoinHandle<FlowExit>,
}

impl LoginServer {
    /// Address of the sign-in page.
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the server to stop.
    pub(crate) async fn wait(self) -> FlowExit {
        self.task.await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "login server task failed");
            FlowExit::Failed
        })
    }
}

/// Submissions seen so far in this attempt.
#[derive(Debug, Default)]
struct PendingLogin {
    /// Email submitted to `/login`.
    email: String,
    /// Password submitted to `/login`, kept only while a code is awaited.
    password: Option<SecretString>,
    /// Whether the API asked for a second factor.
    awaiting_mfa: bool,
}

/// State shared by the request handlers of one login server.
struct LoginState {
    /// Pending credentials.
    pending: Mutex<PendingLogin>,
    /// Flipped to `true` once a token is saved.
    completed: watch::Sender<bool>,
    /// Token destination.
    vault: Vault,
    /// Login handshake.
    connector: Arc<dyn Connector>,
}

/// JSON reply consumed by the page script.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FlowReply {
    /// Signed in.
    Success {
        /// Always `true`.
        success: bool,
    },
    /// A one-time code is needed.
    MfaRequired {
        /// Always `true`.
        mfa_required: bool,
    },
    /// The submission failed.
    Error {
        /// Message shown to the user.
        error: String,
    },
}

impl FlowReply {
    /// Error reply with `message`.
    fn error<M: Into<String>>(message: M) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// `POST /login` body.
#[derive(Debug, Default, Deserialize)]
struct CredentialsForm {
    /// Account email.
    #[serde(default)]
    email: Option<String>,
    /// Account password.
    #[serde(default)]
    password: Option<String>,
}

/// `POST /mfa` body.
#[derive(Debug, Default, Deserialize)]
struct CodeForm {
    /// One-time code.
    #[serde(default)]
    code: Option<String>,
}

impl LoginState {
    /// Creates the state for one attempt.
    fn new(vault: Vault, connector: Arc<dyn Connector>) -> Arc<Self> {
        let (completed, _receiver) = watch::channel(false);
        Arc::new(Self {
            pending: Mutex::new(PendingLogin::default()),
            completed,
            vault,
            connector,
        })
    }

    /// Whether a token has been saved.
    fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    /// Saves `token` and marks the flow completed.
    fn complete(&self, token: &str) -> FlowReply {
        match self.vault.save(token) {
            Ok(()) => {
                let _was_completed = self.completed.send_replace(true);
                tracing::info!("sign-in completed");
                FlowReply::Success { success: true }
            }
            Err(err) => FlowReply::error(format!(
                "Signed in, but the session could not be saved: {err}"
            )),
        }
    }
}

/// Builds the router for one attempt.
fn router(state: Arc<LoginState>) -> Router {
    Router::new()
        .route("/", get(index).fallback(not_found))
        .route("/login", post(submit_credentials).fallback(not_found))
        .route("/mfa", post(submit_code).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

/// Binds a loopback port and starts serving the sign-in page.
///
/// The server holds `lease` until it stops. `timeout` is capped at
/// [`MAX_LOGIN_TIMEOUT`].
///
/// # Errors
///
/// Returns an error if no loopback port can be bound; `lease` is released.
pub(crate) async fn start(
    lease: FlowLease,
    vault: Vault,
    connector: Arc<dyn Connector>,
    timeout: Duration,
) -> io::Result<LoginServer> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let url = format!("http://{addr}");
    let state = LoginState::new(vault, connector);
    let app = router(Arc::clone(&state));
    let mut completed = state.completed.subscribe();
    let open_for = timeout.min(MAX_LOGIN_TIMEOUT);
    let now = Instant::now();
    let deadline = now.checked_add(open_for).unwrap_or(now);
    tracing::info!(%url, timeout_secs = open_for.as_secs(), "login server listening");

    let task = tokio::spawn(async move {
        let _lease = lease;
        let shutdown = async move {
            tokio::select! {
                _done = completed.wait_for(|done| *done) => {}
                () = tokio::time::sleep_until(deadline) => {}
            }
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %err, "login server stopped with an error");
            return FlowExit::Failed;
        }
        if state.is_completed() {
            FlowExit::Completed
        } else {
            tracing::warn!("login server timed out before sign-in completed");
            FlowExit::TimedOut
        }
    });

    Ok(LoginServer { url, task })
}

/// `GET /`.
async fn index() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

/// Any other path or method.
async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Parses a JSON body; an empty body reads as `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, FlowReply> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(error = %err, "rejected login request body");
        FlowReply::error("Invalid request body")
    })
}

/// `POST /login`.
async fn submit_credentials(State(state): State<Arc<LoginState>>, body: Bytes) -> Json<FlowReply> {
    let form: CredentialsForm = match parse_body(&body) {
        Ok(form) => form,
        Err(reply) => return Json(reply),
    };
    let email = form.email.unwrap_or_default().trim().to_owned();
    let password = form.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Json(FlowReply::error("Email and password are required."));
    }
    let secret = SecretString::from(password);

    let reply = match state.connector.login(&email, &secret).await {
        Ok(token) => state.complete(&token),
        Err(ApiError::MfaRequired) => {
            let mut pending = state.pending.lock().await;
            pending.email = email;
            pending.password = Some(secret);
            pending.awaiting_mfa = true;
            tracing::info!("second factor required");
            FlowReply::MfaRequired { mfa_required: true }
        }
        Err(ApiError::LoginFailed(reason)) => {
            tracing::info!(%reason, "credentials rejected");
            FlowReply::error("Invalid email or password.")
        }
        Err(err) => {
            tracing::warn!(error = %err, "login request failed");
            upstream_error("Login failed", &err)
        }
    };
    Json(reply)
}

/// `POST /mfa`.
async fn submit_code(State(state): State<Arc<LoginState>>, body: Bytes) -> Json<FlowReply> {
    let form: CodeForm = match parse_body(&body) {
        Ok(form) => form,
        Err(reply) => return Json(reply),
    };
    let code = form.code.unwrap_or_default().trim().to_owned();
    if code.is_empty() {
        return Json(FlowReply::error("Authentication code is required."));
    }

    let mut pending = state.pending.lock().await;
    let outcome = match pending.password.as_ref() {
        Some(password) if pending.awaiting_mfa => {
            state
                .connector
                .multi_factor_authenticate(&pending.email, password, &code)
                .await
        }
        Some(_) | None => {
            return Json(FlowReply::error(
                "No pending MFA challenge. Please sign in again.",
            ));
        }
    };

    let reply = match outcome {
        Ok(token) => {
            let reply = state.complete(&token);
            if state.is_completed() {
                pending.password = None;
                pending.awaiting_mfa = false;
            }
            reply
        }
        Err(ApiError::LoginFailed(reason)) => {
            tracing::info!(%reason, "authentication code rejected");
            FlowReply::error("Invalid authentication code. Please try again.")
        }
        Err(err) => {
            tracing::warn!(error = %err, "code verification failed");
            upstream_error("MFA verification failed", &err)
        }
    };
    Json(reply)
}

/// Reply for a fault other than rejected credentials.
fn upstream_error(prefix: &str, err: &ApiError) -> FlowReply {
    match err.status() {
        Some(code) => FlowReply::error(format!(
            "Monarch API error (HTTP {code}). Please try again later."
        )),
        None => FlowReply::error(format!("{prefix}: {err}")),
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    extern crate alloc;

    use alloc::sync::Arc;
    use core::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use secrecy::ExposeSecret;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::{FlowExit, LoginState, router, start};
    use crate::auth::guard::AuthFlowGuard;
    use crate::auth::vault::Vault;
    use crate::test_support::{MemoryStore, Reply, ScriptedConnector};

    struct Harness {
        app: Router,
        state: Arc<LoginState>,
        store: Arc<MemoryStore>,
        connector: ScriptedConnector,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let connector = ScriptedConnector::new();
        let vault = Vault::new(
            Arc::<MemoryStore>::clone(&store),
            Arc::new(connector.clone()),
            std::env::temp_dir().join("monarch-mcp-login-tests"),
        );
        let state = LoginState::new(vault.clone(), Arc::new(connector.clone()));
        Harness {
            app: router(Arc::clone(&state)),
            state,
            store,
            connector,
        }
    }

    async fn post_json(app: &Router, path: &str, body: &str) -> Value {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_owned()))
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&bytes).expect("reply should be JSON")
    }

    async fn status_of(app: &Router, method: &str, path: &str) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(path)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond")
            .status()
    }

    #[tokio::test]
    async fn index_serves_the_sign_in_page() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let page = String::from_utf8(bytes.to_vec()).expect("page should be UTF-8");
        assert!(page.contains("id=\"login-form\""));
        assert!(page.contains("id=\"mfa-form\""));
    }

    #[tokio::test]
    async fn unknown_paths_and_methods_are_not_found() {
        let h = harness();
        assert_eq!(status_of(&h.app, "GET", "/nope").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(&h.app, "GET", "/login").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(&h.app, "POST", "/").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(&h.app, "PUT", "/mfa").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let h = harness();
        let reply = post_json(&h.app, "/login", "{not json").await;
        assert_eq!(reply, json!({ "error": "Invalid request body" }));
        let reply = post_json(&h.app, "/mfa", "[1, 2]").await;
        assert_eq!(reply, json!({ "error": "Invalid request body" }));
        assert_eq!(h.connector.login_calls(), 0);
    }

    #[tokio::test]
    async fn empty_body_reads_as_missing_fields() {
        let h = harness();
        let reply = post_json(&h.app, "/login", "").await;
        assert_eq!(reply, json!({ "error": "Email and password are required." }));
    }

    #[tokio::test]
    async fn blank_email_never_reaches_the_api() {
        let h = harness();
        let reply = post_json(&h.app, "/login", r#"{"email":"","password":"x"}"#).await;
        assert_eq!(reply, json!({ "error": "Email and password are required." }));
        let reply = post_json(&h.app, "/login", r#"{"email":"   ","password":"x"}"#).await;
        assert_eq!(reply, json!({ "error": "Email and password are required." }));
        assert_eq!(h.connector.login_calls(), 0);
        assert!(!h.state.is_completed());
    }

    #[tokio::test]
    async fn successful_login_saves_the_token() {
        let h = harness();
        h.connector.set_login(Reply::Token("tok-new".to_owned()));
        let reply = post_json(
            &h.app,
            "/login",
            r#"{"email":" me@example.com ","password":"hunter2"}"#,
        )
        .await;
        assert_eq!(reply, json!({ "success": true }));
        assert!(h.state.is_completed());
        assert_eq!(h.store.token().as_deref(), Some("tok-new"));
        assert_eq!(
            h.connector.last_login(),
            Some(("me@example.com".to_owned(), "hunter2".to_owned()))
        );
    }

    #[tokio::test]
    async fn mfa_challenge_keeps_the_submitted_credentials() {
        let h = harness();
        h.connector.set_login(Reply::MfaRequired);
        h.connector.set_mfa(Reply::Token("tok-mfa".to_owned()));
        let reply = post_json(
            &h.app,
            "/login",
            r#"{"email":"me@example.com","password":"hunter2"}"#,
        )
        .await;
        assert_eq!(reply, json!({ "mfa_required": true }));
        {
            let pending = h.state.pending.lock().await;
            assert!(pending.awaiting_mfa);
            assert_eq!(pending.email, "me@example.com");
            assert_eq!(
                pending.password.as_ref().map(ExposeSecret::expose_secret),
                Some("hunter2")
            );
        }
        assert!(!h.state.is_completed());

        let reply = post_json(&h.app, "/mfa", r#"{"code":" 123456 "}"#).await;
        assert_eq!(reply, json!({ "success": true }));
        assert_eq!(
            h.connector.last_mfa(),
            Some((
                "me@example.com".to_owned(),
                "hunter2".to_owned(),
                "123456".to_owned()
            ))
        );
        assert_eq!(h.store.token().as_deref(), Some("tok-mfa"));
        assert!(h.state.is_completed());
        assert!(h.state.pending.lock().await.password.is_none());
    }

    #[tokio::test]
    async fn code_without_a_challenge_is_refused() {
        let h = harness();
        let reply = post_json(&h.app, "/mfa", r#"{"code":"123456"}"#).await;
        assert_eq!(
            reply,
            json!({ "error": "No pending MFA challenge. Please sign in again." })
        );
        assert_eq!(h.connector.mfa_calls(), 0);
    }

    #[tokio::test]
    async fn blank_code_is_refused() {
        let h = harness();
        let reply = post_json(&h.app, "/mfa", r#"{"code":"  "}"#).await;
        assert_eq!(reply, json!({ "error": "Authentication code is required." }));
        assert_eq!(h.connector.mfa_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_code_keeps_waiting_for_another() {
        let h = harness();
        h.connector.set_login(Reply::MfaRequired);
        h.connector.set_mfa(Reply::LoginFailed("bad code".to_owned()));
        let _challenge = post_json(
            &h.app,
            "/login",
            r#"{"email":"me@example.com","password":"hunter2"}"#,
        )
        .await;
        let reply = post_json(&h.app, "/mfa", r#"{"code":"000000"}"#).await;
        assert_eq!(
            reply,
            json!({ "error": "Invalid authentication code. Please try again." })
        );
        h.connector.set_mfa(Reply::Token("tok-2".to_owned()));
        let reply = post_json(&h.app, "/mfa", r#"{"code":"111111"}"#).await;
        assert_eq!(reply, json!({ "success": true }));
        assert_eq!(h.connector.mfa_calls(), 2);
    }

    #[tokio::test]
    async fn login_failures_map_to_user_messages() {
        let h = harness();
        h.connector.set_login(Reply::LoginFailed("nope".to_owned()));
        let body = r#"{"email":"me@example.com","password":"wrong"}"#;
        let reply = post_json(&h.app, "/login", body).await;
        assert_eq!(reply, json!({ "error": "Invalid email or password." }));

        h.connector.set_login(Reply::Http(503, None));
        let reply = post_json(&h.app, "/login", body).await;
        assert_eq!(
            reply,
            json!({ "error": "Monarch API error (HTTP 503). Please try again later." })
        );

        h.connector.set_login(Reply::Decode("garbled".to_owned()));
        let reply = post_json(&h.app, "/login", body).await;
        assert_eq!(
            reply,
            json!({ "error": "Login failed: unexpected response: garbled" })
        );
        assert!(!h.state.is_completed());
    }

    #[tokio::test]
    async fn unsaved_token_does_not_complete_the_flow() {
        let h = harness();
        h.connector.set_login(Reply::Token("tok-new".to_owned()));
        h.store.set_failing(true);
        let reply = post_json(
            &h.app,
            "/login",
            r#"{"email":"me@example.com","password":"hunter2"}"#,
        )
        .await;
        assert!(reply.get("error").is_some());
        assert!(!h.state.is_completed());
    }

    #[tokio::test]
    async fn serving_loop_exits_once_signed_in() {
        let h = harness();
        h.connector.set_login(Reply::Token("tok-live".to_owned()));
        let guard = AuthFlowGuard::new();
        let lease = guard.try_acquire().expect("guard should be free");
        let server = start(
            lease,
            h.state.vault.clone(),
            Arc::new(h.connector.clone()),
            Duration::from_secs(300),
        )
        .await
        .expect("server should start");
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let reply: Value = reqwest::Client::new()
            .post(format!("{}/login", server.url()))
            .json(&json!({ "email": "me@example.com", "password": "hunter2" }))
            .send()
            .await
            .expect("login request should succeed")
            .json()
            .await
            .expect("reply should be JSON");
        assert_eq!(reply, json!({ "success": true }));

        let exit = tokio::time::timeout(Duration::from_secs(10), server.wait())
            .await
            .expect("server should stop well before its deadline");
        assert_eq!(exit, FlowExit::Completed);
        assert_eq!(h.store.token().as_deref(), Some("tok-live"));
        assert!(!guard.is_active());
    }

    #[tokio::test]
    async fn deadline_stops_the_server_and_releases_the_guard() {
        let h = harness();
        let guard = AuthFlowGuard::new();
        let lease = guard.try_acquire().expect("guard should be free");
        let server = start(
            lease,
            h.state.vault.clone(),
            Arc::new(h.connector.clone()),
            Duration::from_millis(50),
        )
        .await
        .expect("server should start");
        assert!(guard.is_active());
        let exit = tokio::time::timeout(Duration::from_secs(10), server.wait())
            .await
            .expect("server should stop at its deadline");
        assert_eq!(exit, FlowExit::TimedOut);
        assert!(!guard.is_active());
        assert_eq!(h.connector.login_calls(), 0);
    }

    #[tokio::test]
    async fn oversized_timeout_is_capped_instead_of_overflowing() {
        let h = harness();
        h.connector.set_login(Reply::Token("tok-late".to_owned()));
        let guard = AuthFlowGuard::new();
        let lease = guard.try_acquire().expect("guard should be free");
        let server = start(
            lease,
            h.state.vault.clone(),
            Arc::new(h.connector.clone()),
            Duration::from_secs(u64::MAX),
        )
        .await
        .expect("server should start");

        let reply: Value = reqwest::Client::new()
            .post(format!("{}/login", server.url()))
            .json(&json!({ "email": "me@example.com", "password": "hunter2" }))
            .send()
            .await
            .expect("login request should succeed")
            .json()
            .await
            .expect("reply should be JSON");
        assert_eq!(reply, json!({ "success": true }));
        let exit = tokio::time::timeout(Duration::from_secs(10), server.wait())
            .await
            .expect("server should stop once signed in");
        assert_eq!(exit, FlowExit::Completed);
        assert!(!guard.is_active());
    }
}
