//! Session lifecycle: token storage, fault classification and browser sign-in.
//!
//! [`session::SessionManager`] is the entry point for tool calls. It relies
//! on [`orchestrator::AuthOrchestrator`] to decide when the user must sign
//! in, which in turn runs at most one [`login_server`] at a time, as
//! enforced by [`guard::AuthFlowGuard`].

pub(crate) mod browser;
pub(crate) mod classify;
pub(crate) mod guard;
pub(crate) mod login_server;
pub(crate) mod orchestrator;
pub(crate) mod session;
pub(crate) mod vault;
