//! REST API client module for the dashboard backend.
//!
//! This module provides the `ApiClient` for the auth endpoints the login
//! handshake depends on. Authenticated calls carry the session token as a
//! bearer token.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
