//! Decides when the user has to sign in, and starts the login flow.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;
use std::io;

use crate::auth::browser::BrowserOpener;
use crate::auth::classify::{Verdict, classify};
use crate::auth::guard::AuthFlowGuard;
use crate::auth::login_server::{self, LoginServer};
use crate::auth::vault::Vault;
use crate::monarch::Connector;
use crate::monarch::queries;

/// Outcome of [`AuthOrchestrator::ensure_authenticated`]. Informational.
#[derive(Debug)]
pub(crate) enum AuthStatus {
    /// A login server is already running.
    FlowAlreadyActive,
    /// The stored token answered a validation call.
    TokenValid,
    /// Validation failed for a reason unrelated to the token; token kept.
    TokenKept,
    /// No usable token, but credentials are configured in the environment.
    EnvironmentCredentials,
    /// A login server was started.
    LoginStarted(LoginServer),
    /// A login server was needed but could not be started.
    LoginUnavailable(io::Error),
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowAlreadyActive => f.write_str("a sign-in page is already open"),
            Self::TokenValid => f.write_str("stored session is valid"),
            Self::TokenKept => f.write_str("stored session could not be verified; keeping it"),
            Self::EnvironmentCredentials => {
                f.write_str("no stored session; will sign in with environment credentials")
            }
            Self::LoginStarted(server) => {
                write!(f, "sign-in page started at {}", server.url())
            }
            Self::LoginUnavailable(err) => write!(f, "could not start sign-in page: {err}"),
        }
    }
}

/// Process-wide gatekeeper for the interactive login flow.
pub(crate) struct AuthOrchestrator {
    /// Single-flight guard.
    guard: Arc<AuthFlowGuard>,
    /// Token store.
    vault: Vault,
    /// Login handshake and token clients.
    connector: Arc<dyn Connector>,
    /// Opens the sign-in page.
    browser: Arc<dyn BrowserOpener>,
    /// Whether `MONARCH_EMAIL`/`MONARCH_PASSWORD` are set.
    has_env_credentials: bool,
    /// Lifetime of one login server.
    login_timeout: Duration,
}

impl fmt::Debug for AuthOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOrchestrator")
            .field("guard", &self.guard)
            .field("vault", &self.vault)
            .field("has_env_credentials", &self.has_env_credentials)
            .field("login_timeout", &self.login_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthOrchestrator {
    /// Creates an orchestrator over its collaborators.
    pub(crate) fn new(
        guard: Arc<AuthFlowGuard>,
        vault: Vault,
        connector: Arc<dyn Connector>,
        browser: Arc<dyn BrowserOpener>,
        has_env_credentials: bool,
        login_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            vault,
            connector,
            browser,
            has_env_credentials,
            login_timeout,
        }
    }

    /// Makes sure a usable session exists or a sign-in page is open.
    ///
    /// Validates a stored token with one lightweight call. Only a fault
    /// classified as an auth fault discards the token. Concurrent callers
    /// start at most one login server.
    pub(crate) async fn ensure_authenticated(&self) -> AuthStatus {
        let decision = self.guard.decide().await;
        if self.guard.is_active() {
            tracing::debug!("login flow already active");
            return AuthStatus::FlowAlreadyActive;
        }

        if let Some(token) = self.vault.load() {
            let verdict = match self.connector.with_token(&token) {
                Ok(api) => match queries::accounts(api.as_ref()).await {
                    Ok(_accounts) => {
                        tracing::info!("stored session token is valid");
                        return AuthStatus::TokenValid;
                    }
                    Err(err) => {
                        let verdict = classify(&err);
                        tracing::warn!(error = %err, ?verdict, "session validation failed");
                        verdict
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "stored session token is unusable");
                    Verdict::AuthFault
                }
            };
            if verdict != Verdict::AuthFault {
                return AuthStatus::TokenKept;
            }
            self.vault.delete();
        }

        if self.has_env_credentials {
            tracing::info!("no stored session; environment credentials are configured");
            return AuthStatus::EnvironmentCredentials;
        }

        let Some(lease) = self.guard.try_acquire() else {
            return AuthStatus::FlowAlreadyActive;
        };
        drop(decision);

        match login_server::start(
            lease,
            self.vault.clone(),
            Arc::clone(&self.connector),
            self.login_timeout,
        )
        .await
        {
            Ok(server) => {
                self.browser.open(server.url()).await;
                AuthStatus::LoginStarted(server)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to start login server");
                AuthStatus::LoginUnavailable(err)
            }
        }
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

    use serde_json::json;

    use super::{AuthOrchestrator, AuthStatus};
    use crate::auth::guard::AuthFlowGuard;
    use crate::auth::vault::Vault;
    use crate::test_support::{MemoryStore, RecordingBrowser, Reply, ScriptedConnector};

    struct Harness {
        orchestrator: AuthOrchestrator,
        guard: Arc<AuthFlowGuard>,
        store: Arc<MemoryStore>,
        connector: ScriptedConnector,
        browser: Arc<RecordingBrowser>,
    }

    fn harness(has_env_credentials: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let connector = ScriptedConnector::new();
        let browser = Arc::new(RecordingBrowser::default());
        let guard = AuthFlowGuard::new();
        let vault = Vault::new(
            Arc::<MemoryStore>::clone(&store),
            Arc::new(connector.clone()),
            std::env::temp_dir().join("monarch-mcp-orchestrator-tests"),
        );
        let orchestrator = AuthOrchestrator::new(
            Arc::clone(&guard),
            vault,
            Arc::new(connector.clone()),
            Arc::<RecordingBrowser>::clone(&browser),
            has_env_credentials,
            Duration::from_secs(30),
        );
        Harness {
            orchestrator,
            guard,
            store,
            connector,
            browser,
        }
    }

    #[tokio::test]
    async fn valid_token_needs_one_call_and_no_browser() {
        let h = harness(false);
        h.store.put_token("tok-good");
        h.connector.set_graphql(Reply::Data(json!({ "accounts": [] })));
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::TokenValid));
        assert_eq!(h.connector.graphql_operations(), vec!["GetAccounts"]);
        assert!(h.browser.opened().is_empty());
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
    }

    #[tokio::test]
    async fn rejected_token_is_deleted_and_one_login_starts() {
        let h = harness(false);
        h.store.put_token("tok-stale");
        h.connector
            .set_graphql(Reply::Http(401, Some("application/json")));
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::LoginStarted(_)));
        assert_eq!(h.store.token(), None);
        assert_eq!(h.browser.opened().len(), 1);
        assert!(h.guard.is_active());

        let again = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(again, AuthStatus::FlowAlreadyActive));
        assert_eq!(h.browser.opened().len(), 1);
    }

    #[tokio::test]
    async fn server_fault_keeps_the_token() {
        let h = harness(false);
        h.store.put_token("tok-maybe");
        h.connector
            .set_graphql(Reply::Http(500, Some("application/json")));
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::TokenKept));
        assert_eq!(h.store.token().as_deref(), Some("tok-maybe"));
        assert!(h.browser.opened().is_empty());
        assert!(!h.guard.is_active());
    }

    #[tokio::test]
    async fn firewall_block_keeps_the_token() {
        let h = harness(false);
        h.store.put_token("tok-maybe");
        h.connector.set_graphql(Reply::Http(403, Some("text/html")));
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::TokenKept));
        assert_eq!(h.store.token().as_deref(), Some("tok-maybe"));
        assert!(h.browser.opened().is_empty());
    }

    #[tokio::test]
    async fn unusable_token_is_treated_as_invalid() {
        let h = harness(false);
        h.store.put_token("tok-broken");
        h.connector.reject_tokens();
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::LoginStarted(_)));
        assert_eq!(h.store.token(), None);
        assert_eq!(h.connector.graphql_operations().len(), 0);
    }

    #[tokio::test]
    async fn environment_credentials_skip_the_login_page() {
        let h = harness(true);
        let status = h.orchestrator.ensure_authenticated().await;
        assert!(matches!(status, AuthStatus::EnvironmentCredentials));
        assert!(h.browser.opened().is_empty());
        assert!(!h.guard.is_active());
    }

    #[tokio::test]
    async fn concurrent_calls_start_exactly_one_login_server() {
        let h = harness(false);
        let (first, second) = tokio::join!(
            h.orchestrator.ensure_authenticated(),
            h.orchestrator.ensure_authenticated()
        );
        let started = [&first, &second]
            .iter()
            .filter(|status| matches!(***status, AuthStatus::LoginStarted(_)))
            .count();
        let skipped = [&first, &second]
            .iter()
            .filter(|status| matches!(***status, AuthStatus::FlowAlreadyActive))
            .count();
        assert_eq!(started, 1);
        assert_eq!(skipped, 1);
        assert_eq!(h.browser.opened().len(), 1);
        let url = h.browser.opened().pop().expect("one page opened");
        assert!(url.starts_with("http://127.0.0.1:"));
    }

    #[test]
    fn status_messages_are_readable() {
        assert_eq!(
            AuthStatus::TokenValid.to_string(),
            "stored session is valid"
        );
        assert_eq!(
            AuthStatus::FlowAlreadyActive.to_string(),
            "a sign-in page is already open"
        );
    }
}
