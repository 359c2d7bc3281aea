//! In-memory doubles for the secret store, the Monarch API and the browser.

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::auth::browser::BrowserOpener;
use crate::auth::vault::{KEYRING_ACCOUNT, KEYRING_SERVICE, SecretStore, StoreError};
use crate::monarch::{ApiError, Connector, MonarchApi};

/// Builds an HTTP fault, optionally carrying a `content-type` header.
pub(crate) fn http_error(status: u16, content_type: Option<&str>) -> ApiError {
    let headers = content_type.map(|value| {
        let mut headers = HeaderMap::new();
        if let Ok(header) = HeaderValue::from_str(value) {
            let _previous = headers.insert(CONTENT_TYPE, header);
        }
        headers
    });
    ApiError::http(status, headers, "scripted failure")
}

/// Secret store kept in memory; can be switched to fail every operation.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    /// Secrets by (service, account).
    secrets: Mutex<HashMap<(String, String), String>>,
    /// When set, every operation fails.
    failing: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty, working store.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail (or succeed again).
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reads a secret directly, bypassing the failure switch.
    pub(crate) fn get(&self, service: &str, account: &str) -> Option<String> {
        self.secrets
            .lock()
            .get(&(service.to_owned(), account.to_owned()))
            .cloned()
    }

    /// The stored session token.
    pub(crate) fn token(&self) -> Option<String> {
        self.get(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }

    /// Stores a session token directly.
    pub(crate) fn put_token(&self, token: &str) {
        let _previous = self.secrets.lock().insert(
            (KEYRING_SERVICE.to_owned(), KEYRING_ACCOUNT.to_owned()),
            token.to_owned(),
        );
    }

    /// Fails when the switch is set.
    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted failure".to_owned()));
        }
        Ok(())
    }
}

impl SecretStore for MemoryStore {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<(), StoreError> {
        self.check()?;
        let _previous = self
            .secrets
            .lock()
            .insert((service.to_owned(), account.to_owned()), secret.to_owned());
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.get(service, account))
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self
            .secrets
            .lock()
            .remove(&(service.to_owned(), account.to_owned()))
            .is_some())
    }
}

/// Scripted outcome of an API call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Login succeeds with this token.
    Token(String),
    /// Login asks for a second factor.
    MfaRequired,
    /// Credentials or code rejected.
    LoginFailed(String),
    /// HTTP fault with an optional content type.
    Http(u16, Option<&'static str>),
    /// GraphQL `errors` array.
    Query(String),
    /// Unreadable response.
    Decode(String),
    /// GraphQL data.
    Data(Value),
}

impl Reply {
    /// The fault this reply stands for.
    fn fault(&self) -> ApiError {
        match self {
            Self::MfaRequired => ApiError::MfaRequired,
            Self::LoginFailed(reason) => ApiError::LoginFailed(reason.clone()),
            Self::Http(status, content_type) => http_error(*status, *content_type),
            Self::Query(message) => ApiError::Query(message.clone()),
            Self::Decode(message) => ApiError::Decode(message.clone()),
            Self::Token(_) | Self::Data(_) => {
                ApiError::Decode("reply does not fit this call".to_owned())
            }
        }
    }

    /// Outcome of a login call.
    fn token(&self) -> Result<String, ApiError> {
        match self {
            Self::Token(token) => Ok(token.clone()),
            other => Err(other.fault()),
        }
    }

    /// Outcome of a GraphQL call.
    fn data(&self) -> Result<Value, ApiError> {
        match self {
            Self::Data(data) => Ok(data.clone()),
            other => Err(other.fault()),
        }
    }
}

/// Shared script and call log.
#[derive(Debug)]
struct Script {
    /// Reply to `login`.
    login: Mutex<Reply>,
    /// Reply to `multi_factor_authenticate`.
    mfa: Mutex<Reply>,
    /// Reply to every GraphQL call.
    graphql: Mutex<Reply>,
    /// Number of `login` calls.
    login_calls: AtomicUsize,
    /// Number of `multi_factor_authenticate` calls.
    mfa_calls: AtomicUsize,
    /// Arguments of the last `login` call.
    last_login: Mutex<Option<(String, String)>>,
    /// Arguments of the last `multi_factor_authenticate` call.
    last_mfa: Mutex<Option<(String, String, String)>>,
    /// Tokens passed to `with_token`.
    tokens: Mutex<Vec<String>>,
    /// Operation names of GraphQL calls, in order.
    operations: Mutex<Vec<&'static str>>,
    /// Variables of GraphQL calls, in order.
    variables: Mutex<Vec<Value>>,
    /// When set, `with_token` fails.
    reject_tokens: AtomicBool,
}

/// [`Connector`] that answers from a script and records its calls.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedConnector {
    /// Script shared with the clients it builds.
    script: Arc<Script>,
}

impl ScriptedConnector {
    /// Creates a connector that rejects logins and answers GraphQL with `{}`.
    pub(crate) fn new() -> Self {
        Self {
            script: Arc::new(Script {
                login: Mutex::new(Reply::LoginFailed("not scripted".to_owned())),
                mfa: Mutex::new(Reply::LoginFailed("not scripted".to_owned())),
                graphql: Mutex::new(Reply::Data(json!({}))),
                login_calls: AtomicUsize::new(0),
                mfa_calls: AtomicUsize::new(0),
                last_login: Mutex::new(None),
                last_mfa: Mutex::new(None),
                tokens: Mutex::new(Vec::new()),
                operations: Mutex::new(Vec::new()),
                variables: Mutex::new(Vec::new()),
                reject_tokens: AtomicBool::new(false),
            }),
        }
    }

    /// Scripts the reply to `login`.
    pub(crate) fn set_login(&self, reply: Reply) {
        *self.script.login.lock() = reply;
    }

    /// Scripts the reply to `multi_factor_authenticate`.
    pub(crate) fn set_mfa(&self, reply: Reply) {
        *self.script.mfa.lock() = reply;
    }

    /// Scripts the reply to GraphQL calls.
    pub(crate) fn set_graphql(&self, reply: Reply) {
        *self.script.graphql.lock() = reply;
    }

    /// Makes `with_token` fail.
    pub(crate) fn reject_tokens(&self) {
        self.script.reject_tokens.store(true, Ordering::SeqCst);
    }

    /// Number of `login` calls.
    pub(crate) fn login_calls(&self) -> usize {
        self.script.login_calls.load(Ordering::SeqCst)
    }

    /// Number of `multi_factor_authenticate` calls.
    pub(crate) fn mfa_calls(&self) -> usize {
        self.script.mfa_calls.load(Ordering::SeqCst)
    }

    /// Email and password of the last `login` call.
    pub(crate) fn last_login(&self) -> Option<(String, String)> {
        self.script.last_login.lock().clone()
    }

    /// Email, password and code of the last `multi_factor_authenticate` call.
    pub(crate) fn last_mfa(&self) -> Option<(String, String, String)> {
        self.script.last_mfa.lock().clone()
    }

    /// Tokens clients were built with.
    pub(crate) fn tokens_used(&self) -> Vec<String> {
        self.script.tokens.lock().clone()
    }

    /// GraphQL operations issued so far.
    pub(crate) fn graphql_operations(&self) -> Vec<&'static str> {
        self.script.operations.lock().clone()
    }

    /// Variables of the most recent GraphQL call.
    pub(crate) fn last_variables(&self) -> Option<Value> {
        self.script.variables.lock().last().cloned()
    }

    /// A client that answers from the script.
    pub(crate) fn api(&self) -> Arc<dyn MonarchApi> {
        Arc::new(ScriptedApi {
            script: Arc::clone(&self.script),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn login(&self, email: &str, password: &SecretString) -> Result<String, ApiError> {
        let _calls = self.script.login_calls.fetch_add(1, Ordering::SeqCst);
        *self.script.last_login.lock() =
            Some((email.to_owned(), password.expose_secret().to_owned()));
        self.script.login.lock().token()
    }

    async fn multi_factor_authenticate(
        &self,
        email: &str,
        password: &SecretString,
        code: &str,
    ) -> Result<String, ApiError> {
        let _calls = self.script.mfa_calls.fetch_add(1, Ordering::SeqCst);
        *self.script.last_mfa.lock() = Some((
            email.to_owned(),
            password.expose_secret().to_owned(),
            code.to_owned(),
        ));
        self.script.mfa.lock().token()
    }

    fn with_token(&self, token: &str) -> Result<Arc<dyn MonarchApi>, ApiError> {
        if self.script.reject_tokens.load(Ordering::SeqCst) {
            return Err(ApiError::InvalidToken);
        }
        self.script.tokens.lock().push(token.to_owned());
        Ok(self.api())
    }
}

/// Client built by [`ScriptedConnector`].
#[derive(Debug)]
struct ScriptedApi {
    /// Shared script.
    script: Arc<Script>,
}

#[async_trait]
impl MonarchApi for ScriptedApi {
    async fn graphql(
        &self,
        operation: &'static str,
        _query: &'static str,
        variables: Value,
    ) -> Result<Value, ApiError> {
        self.script.operations.lock().push(operation);
        self.script.variables.lock().push(variables);
        self.script.graphql.lock().data()
    }
}

/// Browser that records the URLs it was asked to open.
#[derive(Debug, Default)]
pub(crate) struct RecordingBrowser {
    /// Opened URLs, in order.
    opened: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    /// URLs opened so far.
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl BrowserOpener for RecordingBrowser {
    async fn open(&self, url: &str) {
        self.opened.lock().push(url.to_owned());
    }
}
