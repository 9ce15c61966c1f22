//! Core library for lkweb, the LK match-analysis dashboard client.
//!
//! This crate provides:
//! - `api`: REST client for the dashboard backend
//! - `auth`: persisted session store, auth state and the login control model
//! - `handshake`: the popup login handshake with the identity provider
//! - `config`: on-disk configuration
//! - `models`: wire types shared with the web frontend

pub mod api;
pub mod auth;
pub mod config;
pub mod handshake;
pub mod models;
