//! Thin client for the Monarch Money API.
//!
//! The provider exposes a REST login handshake and a GraphQL endpoint.
//! [`Connector`] covers the former and hands out token-bound
//! [`MonarchApi`] clients for the latter; [`queries`] holds the typed
//! operations the MCP tools forward to.

pub(crate) mod client;
pub(crate) mod error;
pub(crate) mod queries;

pub(crate) use client::{Connector, DEFAULT_API_URL, HttpConnector, MonarchApi};
pub(crate) use error::ApiError;
