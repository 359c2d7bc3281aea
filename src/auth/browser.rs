//! Opens the login page in the user's browser.

use async_trait::async_trait;

/// Launches a URL for the user to visit.
#[async_trait]
pub(crate) trait BrowserOpener: Send + Sync {
    /// Opens `url`. Best effort: failures are logged, never raised.
    async fn open(&self, url: &str);
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemBrowser;

#[async_trait]
impl BrowserOpener for SystemBrowser {
    async fn open(&self, url: &str) {
        let target = url.to_owned();
        let outcome = tokio::task::spawn_blocking(move || open::that(&target)).await;
        match outcome {
            Ok(Ok(())) => tracing::info!(url, "opened login page in browser"),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "could not open a browser; visit {url} to sign in");
            }
            Err(err) => {
                tracing::warn!(error = %err, "browser launcher failed; visit {url} to sign in");
            }
        }
    }
}
