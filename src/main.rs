//! Monarch Money MCP server entry point.
//!
//! Loads `.env` and the command line, checks for a stored session (opening
//! the browser sign-in page if none is usable), then serves MCP tools over
//! stdio.

extern crate alloc;

mod auth;
mod config;
mod monarch;
mod params;
mod response;
mod server;
#[cfg(test)]
mod test_support;

use alloc::sync::Arc;

use clap::Parser as _;
use rmcp::ServiceExt as _;
use tracing_subscriber::EnvFilter;

use crate::auth::browser::SystemBrowser;
use crate::auth::guard::AuthFlowGuard;
use crate::auth::orchestrator::{AuthOrchestrator, AuthStatus};
use crate::auth::session::SessionManager;
use crate::auth::vault::{KeyringStore, Vault};
use crate::config::Config;
use crate::monarch::{Connector, HttpConnector};
use crate::server::MonarchMcpServer;

/// Runs the MCP server.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot
/// be built, or the stdio transport encounters an error.
async fn run() -> Result<(), Box<dyn core::error::Error>> {
    // A missing .env file is fine; everything can come from the environment.
    let dotenv = dotenvy::dotenv();
    let config = Config::parse();

    // Initialise tracing to stderr (stdout is used for MCP stdio transport).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        api_url = %config.api_url,
        enable_write = config.enable_write,
        dotenv_loaded = dotenv.is_ok(),
        "starting Monarch Money MCP server"
    );

    let connector: Arc<dyn Connector> = Arc::new(HttpConnector::new(config.api_url.clone())?);
    let vault = Vault::new(
        Arc::new(KeyringStore),
        Arc::clone(&connector),
        std::env::current_dir()?,
    );
    let env_credentials = config.env_credentials();
    let orchestrator = Arc::new(AuthOrchestrator::new(
        AuthFlowGuard::new(),
        vault.clone(),
        Arc::clone(&connector),
        Arc::new(SystemBrowser),
        env_credentials.is_some(),
        config.login_timeout(),
    ));

    // Check the stored session up front so the sign-in page is ready early.
    let status = orchestrator.ensure_authenticated().await;
    tracing::info!(%status, "startup authentication check");
    if let AuthStatus::LoginStarted(server) = status {
        let _watcher = tokio::spawn(async move {
            let exit = server.wait().await;
            tracing::info!(?exit, "startup sign-in flow ended");
        });
    }

    let session = SessionManager::new(vault, connector, orchestrator, env_credentials);
    let mcp_server = MonarchMcpServer::new(session, config.enable_write);
    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = mcp_server.serve(transport).await?;

    tracing::info!("MCP server running on stdio");
    let _quit_reason = service.waiting().await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(%err, "fatal error");
        std::process::exit(1);
    }
}
