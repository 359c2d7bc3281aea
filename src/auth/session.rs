//! Session-aware execution of API calls.
//!
//! Every tool call goes through [`SessionManager::call`]. It finds a client
//! (stored token, then environment credentials, then the login page), runs
//! the operation on its own task, and reacts to a rejected session by
//! discarding the token and opening the login page again. Other faults are
//! passed through untouched.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;

use crate::auth::classify::is_auth_error;
use crate::auth::orchestrator::AuthOrchestrator;
use crate::auth::vault::Vault;
use crate::config::EnvCredentials;
use crate::monarch::{ApiError, Connector, MonarchApi};

/// Failure of a session-aware call.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CallError {
    /// The API rejected the session; the token was cleared and sign-in restarted.
    #[error(
        "Your session has expired. A login page has been opened in your browser; please sign in and try again."
    )]
    SessionExpired(#[source] ApiError),
    /// No session exists yet; sign-in was started.
    #[error(
        "Authentication needed! A login page has been opened in your browser; please sign in and try again."
    )]
    AuthenticationRequired,
    /// Monarch rejected the email and password from the environment.
    #[error(
        "The configured MONARCH_EMAIL/MONARCH_PASSWORD were rejected by Monarch Money. Update them, or unset them to sign in through the browser, and restart the server."
    )]
    CredentialsRejected(#[source] ApiError),
    /// The API rejected a session obtained with environment credentials.
    #[error(
        "Your session has expired. The server signs in again with MONARCH_EMAIL/MONARCH_PASSWORD on the next call; please try again."
    )]
    EnvironmentSessionExpired(#[source] ApiError),
    /// Any other API fault.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The call's task panicked or was cancelled.
    #[error("API call did not complete: {0}")]
    Task(String),
}

/// Shared collaborators of a [`SessionManager`].
struct SessionInner {
    /// Token store.
    vault: Vault,
    /// Login handshake and token clients.
    connector: Arc<dyn Connector>,
    /// Starts sign-in when needed.
    orchestrator: Arc<AuthOrchestrator>,
    /// Fallback credentials from the environment.
    env_credentials: Option<EnvCredentials>,
}

/// Runs API calls with session recovery. Cheap to clone.
#[derive(Clone)]
pub(crate) struct SessionManager {
    /// Shared state.
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("vault", &self.inner.vault)
            .field(
                "env_credentials",
                &self.inner.env_credentials.as_ref().map(|creds| &creds.email),
            )
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a session manager.
    pub(crate) fn new(
        vault: Vault,
        connector: Arc<dyn Connector>,
        orchestrator: Arc<AuthOrchestrator>,
        env_credentials: Option<EnvCredentials>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                vault,
                connector,
                orchestrator,
                env_credentials,
            }),
        }
    }

    /// Token store.
    pub(crate) fn vault(&self) -> &Vault {
        &self.inner.vault
    }

    /// Email from the environment credentials, if configured.
    pub(crate) fn env_email(&self) -> Option<&str> {
        self.inner
            .env_credentials
            .as_ref()
            .map(|creds| creds.email.as_str())
    }

    /// Returns a client for the current session.
    ///
    /// Tries the stored token, then a login with environment credentials.
    /// With neither, starts sign-in and fails with
    /// [`CallError::AuthenticationRequired`].
    ///
    /// # Errors
    ///
    /// Returns an error if no session is available or the environment login
    /// fails; rejected credentials are reported as
    /// [`CallError::CredentialsRejected`].
    pub(crate) async fn client(&self) -> Result<Arc<dyn MonarchApi>, CallError> {
        if let Some(api) = self.inner.vault.build_client_with_token() {
            return Ok(api);
        }

        if let Some(creds) = self.inner.env_credentials.as_ref() {
            tracing::info!(email = %creds.email, "signing in with environment credentials");
            let token = match self
                .inner
                .connector
                .login(&creds.email, &creds.password)
                .await
            {
                Ok(token) => token,
                Err(err) if is_auth_error(&err) => {
                    tracing::warn!(
                        email = %creds.email,
                        error = %err,
                        "environment credentials rejected"
                    );
                    return Err(CallError::CredentialsRejected(err));
                }
                Err(err) => return Err(CallError::Api(err)),
            };
            if let Err(err) = self.inner.vault.save(&token) {
                tracing::warn!(error = %err, "continuing with an unsaved session token");
            }
            return Ok(self.inner.connector.with_token(&token)?);
        }

        let status = self.inner.orchestrator.ensure_authenticated().await;
        tracing::info!(%status, "no session available");
        Err(CallError::AuthenticationRequired)
    }

    /// Runs `operation` with a session client on its own task.
    ///
    /// A fault that means the session is bad clears the stored token,
    /// restarts sign-in and is reported as [`CallError::SessionExpired`]
    /// (or [`CallError::EnvironmentSessionExpired`] with environment
    /// credentials).
    ///
    /// # Errors
    ///
    /// Returns the operation's fault, or a session error as described above.
    pub(crate) async fn call<T, F, Fut>(&self, operation: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn MonarchApi>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let session = self.clone();
        let task = tokio::spawn(async move {
            let api = session.client().await?;
            operation(api).await.map_err(CallError::Api)
        });
        let outcome = task
            .await
            .map_err(|err| CallError::Task(err.to_string()))?;
        match outcome {
            Err(CallError::Api(err)) if is_auth_error(&err) => Err(self.expire(err).await),
            other => other,
        }
    }

    /// Clears the rejected session and restarts sign-in.
    ///
    /// With environment credentials no login page opens; the next call
    /// signs in with them again.
    async fn expire(&self, err: ApiError) -> CallError {
        tracing::warn!(error = %err, "session rejected by the API; clearing stored token");
        self.inner.vault.delete();
        if self.inner.env_credentials.is_some() {
            return CallError::EnvironmentSessionExpired(err);
        }
        let status = self.inner.orchestrator.ensure_authenticated().await;
        tracing::info!(%status, "re-authentication triggered");
        CallError::SessionExpired(err)
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
    extern crate alloc;

    use alloc::sync::Arc;
    use core::time::Duration;

    use secrecy::SecretString;
    use serde_json::json;

    use super::{CallError, SessionManager};
    use crate::auth::guard::AuthFlowGuard;
    use crate::auth::orchestrator::AuthOrchestrator;
    use crate::auth::vault::Vault;
    use crate::config::EnvCredentials;
    use crate::monarch::queries;
    use crate::test_support::{MemoryStore, RecordingBrowser, Reply, ScriptedConnector};

    struct Harness {
        session: SessionManager,
        store: Arc<MemoryStore>,
        connector: ScriptedConnector,
        browser: Arc<RecordingBrowser>,
    }

    fn harness(env_credentials: Option<EnvCredentials>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let connector = ScriptedConnector::new();
        let browser = Arc::new(RecordingBrowser::default());
        let vault = Vault::new(
            Arc::<MemoryStore>::clone(&store),
            Arc::new(connector.clone()),
            std::env::temp_dir().join("monarch-mcp-session-tests"),
        );
        let orchestrator = Arc::new(AuthOrchestrator::new(
            AuthFlowGuard::new(),
            vault.clone(),
            Arc::new(connector.clone()),
            Arc::<RecordingBrowser>::clone(&browser),
            env_credentials.is_some(),
            Duration::from_secs(30),
        ));
        let session = SessionManager::new(
            vault,
            Arc::new(connector.clone()),
            orchestrator,
            env_credentials,
        );
        Harness {
            session,
            store,
            connector,
            browser,
        }
    }

    async fn account_count(session: &SessionManager) -> Result<usize, CallError> {
        session
            .call(|api| async move {
                let payload = queries::accounts(api.as_ref()).await?;
                Ok(payload.accounts.len())
            })
            .await
    }

    #[tokio::test]
    async fn successful_call_returns_its_result() {
        let h = harness(None);
        h.store.put_token("tok-good");
        h.connector
            .set_graphql(Reply::Data(json!({ "accounts": [{ "id": "a1" }, { "id": "a2" }] })));
        let count = account_count(&h.session).await.expect("call should succeed");
        assert_eq!(count, 2);
        assert_eq!(h.connector.tokens_used(), vec!["tok-good".to_owned()]);
    }

    #[tokio::test]
    async fn rejected_session_clears_the_token() {
        let h = harness(None);
        h.store.put_token("tok-stale");
        h.connector
            .set_graphql(Reply::Http(401, Some("application/json")));
        let err = account_count(&h.session).await.expect_err("call should fail");
        let CallError::SessionExpired(cause) = err else {
            panic!("expected an expired session, got {err:?}");
        };
        assert_eq!(cause.status(), Some(401));
        assert_eq!(h.store.token(), None);
        assert_eq!(h.browser.opened().len(), 1);
    }

    #[tokio::test]
    async fn server_fault_passes_through() {
        let h = harness(None);
        h.store.put_token("tok-good");
        h.connector
            .set_graphql(Reply::Http(500, Some("application/json")));
        let err = account_count(&h.session).await.expect_err("call should fail");
        assert!(matches!(err, CallError::Api(_)));
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
        assert!(h.browser.opened().is_empty());
    }

    #[tokio::test]
    async fn firewall_block_passes_through() {
        let h = harness(None);
        h.store.put_token("tok-good");
        h.connector.set_graphql(Reply::Http(403, Some("text/html")));
        let err = account_count(&h.session).await.expect_err("call should fail");
        assert!(matches!(err, CallError::Api(_)));
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
    }

    #[tokio::test]
    async fn missing_session_starts_sign_in() {
        let h = harness(None);
        let err = account_count(&h.session).await.expect_err("call should fail");
        assert!(matches!(err, CallError::AuthenticationRequired));
        assert_eq!(h.browser.opened().len(), 1);
        assert_eq!(h.connector.graphql_operations().len(), 0);
    }

    #[tokio::test]
    async fn environment_credentials_sign_in_and_persist() {
        let h = harness(Some(EnvCredentials {
            email: "me@example.com".to_owned(),
            password: SecretString::from("hunter2".to_owned()),
        }));
        h.connector.set_login(Reply::Token("tok-env".to_owned()));
        h.connector.set_graphql(Reply::Data(json!({ "accounts": [] })));
        let count = account_count(&h.session).await.expect("call should succeed");
        assert_eq!(count, 0);
        assert_eq!(h.connector.login_calls(), 1);
        assert_eq!(h.store.token().as_deref(), Some("tok-env"));
        assert!(h.browser.opened().is_empty());
        assert_eq!(h.session.env_email(), Some("me@example.com"));
    }

    #[tokio::test]
    async fn rejected_environment_credentials_are_named() {
        let h = harness(Some(EnvCredentials {
            email: "me@example.com".to_owned(),
            password: SecretString::from("wrong".to_owned()),
        }));
        h.connector
            .set_login(Reply::LoginFailed("Incorrect password".to_owned()));
        let err = account_count(&h.session).await.expect_err("call should fail");
        let CallError::CredentialsRejected(cause) = err else {
            panic!("expected rejected credentials, got {err:?}");
        };
        assert!(matches!(cause, crate::monarch::ApiError::LoginFailed(_)));
        let message = CallError::CredentialsRejected(cause).to_string();
        assert!(message.contains("MONARCH_EMAIL/MONARCH_PASSWORD were rejected"));
        assert!(!message.contains("login page"));
        assert!(h.browser.opened().is_empty());
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn environment_login_outage_is_not_blamed_on_the_credentials() {
        let h = harness(Some(EnvCredentials {
            email: "me@example.com".to_owned(),
            password: SecretString::from("hunter2".to_owned()),
        }));
        h.connector
            .set_login(Reply::Http(503, Some("application/json")));
        let err = account_count(&h.session).await.expect_err("call should fail");
        assert!(matches!(err, CallError::Api(_)));
    }

    #[tokio::test]
    async fn expired_environment_session_does_not_promise_a_login_page() {
        let h = harness(Some(EnvCredentials {
            email: "me@example.com".to_owned(),
            password: SecretString::from("hunter2".to_owned()),
        }));
        h.store.put_token("tok-stale");
        h.connector
            .set_graphql(Reply::Http(401, Some("application/json")));
        let err = account_count(&h.session).await.expect_err("call should fail");
        assert!(matches!(err, CallError::EnvironmentSessionExpired(_)));
        assert!(err.to_string().contains("signs in again with MONARCH_EMAIL"));
        assert_eq!(h.store.token(), None);
        assert!(h.browser.opened().is_empty());
    }

    #[tokio::test]
    async fn panicking_operation_is_reported() {
        let h = harness(None);
        h.store.put_token("tok-good");
        let result: Result<(), CallError> = h
            .session
            .call(|_api| async move { panic!("operation crashed") })
            .await;
        assert!(matches!(result, Err(CallError::Task(_))));
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
    }

    #[test]
    fn messages_tell_the_user_what_to_do() {
        assert!(
            CallError::AuthenticationRequired
                .to_string()
                .starts_with("Authentication needed!")
        );
        let expired = CallError::SessionExpired(crate::test_support::http_error(401, None));
        assert!(expired.to_string().starts_with("Your session has expired."));
    }
}
