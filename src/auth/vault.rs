//! Persistent storage for the session token.
//!
//! The token lives in the platform secret store (macOS Keychain, Windows
//! Credential Manager, Secret Service on Linux) under a fixed service and
//! account. Read failures degrade to "no token" so a broken keychain never
//! blocks the server from starting.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::monarch::{Connector, MonarchApi};

/// Secret-store service name.
pub(crate) const KEYRING_SERVICE: &str = "com.mcp.monarch-mcp";

/// Secret-store account name.
pub(crate) const KEYRING_ACCOUNT: &str = "monarch-token";

/// Directory used by earlier releases for pickled sessions.
const LEGACY_DIR: &str = ".mm";

/// Session files written by earlier releases, relative to the legacy root.
const LEGACY_FILES: [&str; 2] = [".mm/mm_session.pickle", "monarch_session.json"];

/// Failure of the secret-store backend.
#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    /// The platform keyring reported an error.
    #[error("keyring error: {0}")]
    Keyring(#[source] keyring::Error),
    /// The store cannot be reached.
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value secret storage.
pub(crate) trait SecretStore: Send + Sync {
    /// Stores `secret`, replacing any previous value.
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<(), StoreError>;

    /// Reads a secret; `Ok(None)` when nothing is stored.
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, StoreError>;

    /// Removes a secret; `Ok(false)` when nothing was stored.
    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, StoreError>;
}

/// [`SecretStore`] backed by the platform keyring.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeyringStore;

/// Maps a keyring failure, telling an unreachable backend apart.
fn store_error(err: keyring::Error) -> StoreError {
    if let keyring::Error::NoStorageAccess(cause) = err {
        StoreError::Unavailable(cause.to_string())
    } else {
        StoreError::Keyring(err)
    }
}

/// Opens the keyring entry for `service`/`account`.
fn entry(service: &str, account: &str) -> Result<keyring::Entry, StoreError> {
    keyring::Entry::new(service, account).map_err(store_error)
}

impl SecretStore for KeyringStore {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> Result<(), StoreError> {
        entry(service, account)?
            .set_password(secret)
            .map_err(store_error)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>, StoreError> {
        match entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(store_error(err)),
        }
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<bool, StoreError> {
        match entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(store_error(err)),
        }
    }
}

/// The session token store.
#[derive(Clone)]
pub(crate) struct Vault {
    /// Secret storage backend.
    store: Arc<dyn SecretStore>,
    /// Builds token-bound clients.
    connector: Arc<dyn Connector>,
    /// Directory holding legacy session files.
    legacy_root: PathBuf,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("legacy_root", &self.legacy_root)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates a vault over `store`; legacy files are looked up in `legacy_root`.
    pub(crate) fn new(
        store: Arc<dyn SecretStore>,
        connector: Arc<dyn Connector>,
        legacy_root: PathBuf,
    ) -> Self {
        Self {
            store,
            connector,
            legacy_root,
        }
    }

    /// Persists `token` and cleans up legacy session files.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the token could not be written.
    pub(crate) fn save(&self, token: &str) -> Result<(), StoreError> {
        if let Err(err) = self
            .store
            .set_secret(KEYRING_SERVICE, KEYRING_ACCOUNT, token)
        {
            tracing::error!(error = %err, "failed to save session token");
            return Err(err);
        }
        tracing::info!(token_len = token.len(), "session token saved to secret store");
        self.purge_legacy_artifacts();
        Ok(())
    }

    /// Reads the stored token. Backend failures are logged and read as absent.
    pub(crate) fn load(&self) -> Option<String> {
        match self.store.get_secret(KEYRING_SERVICE, KEYRING_ACCOUNT) {
            Ok(Some(token)) if !token.is_empty() => {
                tracing::debug!(token_len = token.len(), "session token loaded");
                Some(token)
            }
            Ok(Some(_) | None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read session token");
                None
            }
        }
    }

    /// Removes the stored token and any legacy session files.
    pub(crate) fn delete(&self) {
        match self.store.delete_secret(KEYRING_SERVICE, KEYRING_ACCOUNT) {
            Ok(true) => tracing::info!("session token deleted"),
            Ok(false) => tracing::debug!("no session token to delete"),
            Err(err) => tracing::warn!(error = %err, "failed to delete session token"),
        }
        self.purge_legacy_artifacts();
    }

    /// Builds a client pre-loaded with the stored token, without a network call.
    pub(crate) fn build_client_with_token(&self) -> Option<Arc<dyn MonarchApi>> {
        let token = self.load()?;
        match self.connector.with_token(&token) {
            Ok(api) => Some(api),
            Err(err) => {
                tracing::warn!(error = %err, "stored session token is unusable");
                None
            }
        }
    }

    /// Deletes session files left by earlier releases. Best effort.
    pub(crate) fn purge_legacy_artifacts(&self) {
        for file in LEGACY_FILES {
            let path = self.legacy_root.join(file);
            log_removal(&path, std::fs::remove_file(&path));
        }
        let dir = self.legacy_root.join(LEGACY_DIR);
        let is_empty = std::fs::read_dir(&dir).is_ok_and(|mut entries| entries.next().is_none());
        if is_empty {
            log_removal(&dir, std::fs::remove_dir(&dir));
        }
    }
}

/// Logs the outcome of removing `path`; a missing path is not a failure.
fn log_removal(path: &Path, outcome: io::Result<()>) {
    match outcome {
        Ok(()) => tracing::info!(path = %path.display(), "removed legacy session artifact"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not remove legacy session artifact");
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
    use std::fs;

    use super::{KEYRING_ACCOUNT, KEYRING_SERVICE, StoreError, Vault, store_error};
    use crate::test_support::{MemoryStore, ScriptedConnector};

    fn vault_in(root: &std::path::Path) -> (Vault, Arc<MemoryStore>, ScriptedConnector) {
        let store = Arc::new(MemoryStore::new());
        let connector = ScriptedConnector::new();
        let vault = Vault::new(
            Arc::<MemoryStore>::clone(&store),
            Arc::new(connector.clone()),
            root.to_path_buf(),
        );
        (vault, store, connector)
    }

    #[test]
    fn locked_keyring_is_reported_as_unavailable() {
        let locked = store_error(keyring::Error::NoStorageAccess("locked".into()));
        assert!(matches!(locked, StoreError::Unavailable(_)));
        let other = store_error(keyring::Error::TooLong("secret".to_owned(), 10));
        assert!(matches!(other, StoreError::Keyring(_)));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (vault, store, _connector) = vault_in(dir.path());
        vault.save("tok-1").expect("save should succeed");
        assert_eq!(vault.load().as_deref(), Some("tok-1"));
        assert_eq!(
            store.get(KEYRING_SERVICE, KEYRING_ACCOUNT).as_deref(),
            Some("tok-1")
        );
        vault.delete();
        assert_eq!(vault.load(), None);
    }

    #[test]
    fn backend_failures_read_as_absent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (vault, store, _connector) = vault_in(dir.path());
        vault.save("tok-1").expect("save should succeed");
        store.set_failing(true);
        assert_eq!(vault.load(), None);
        assert!(vault.save("tok-2").is_err());
        vault.delete();
        store.set_failing(false);
        assert_eq!(vault.load().as_deref(), Some("tok-1"));
    }

    #[test]
    fn empty_token_reads_as_absent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (vault, _store, _connector) = vault_in(dir.path());
        vault.save("").expect("save should succeed");
        assert_eq!(vault.load(), None);
        assert!(vault.build_client_with_token().is_none());
    }

    #[test]
    fn client_is_built_from_the_stored_token() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (vault, _store, connector) = vault_in(dir.path());
        assert!(vault.build_client_with_token().is_none());
        vault.save("tok-9").expect("save should succeed");
        assert!(vault.build_client_with_token().is_some());
        assert_eq!(connector.tokens_used(), vec!["tok-9".to_owned()]);
    }

    #[test]
    fn unusable_token_builds_no_client() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (vault, _store, connector) = vault_in(dir.path());
        vault.save("tok-9").expect("save should succeed");
        connector.reject_tokens();
        assert!(vault.build_client_with_token().is_none());
    }

    #[test]
    fn saving_purges_legacy_session_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join(".mm")).expect("legacy dir");
        fs::write(dir.path().join(".mm/mm_session.pickle"), b"old").expect("pickle");
        fs::write(dir.path().join("monarch_session.json"), b"{}").expect("json");
        let (vault, _store, _connector) = vault_in(dir.path());
        vault.save("tok-1").expect("save should succeed");
        assert!(!dir.path().join("monarch_session.json").exists());
        assert!(!dir.path().join(".mm").exists());
    }

    #[test]
    fn legacy_dir_with_other_files_is_kept() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join(".mm")).expect("legacy dir");
        fs::write(dir.path().join(".mm/notes.txt"), b"keep me").expect("notes");
        let (vault, _store, _connector) = vault_in(dir.path());
        vault.delete();
        assert!(dir.path().join(".mm/notes.txt").exists());
    }
}
