//! Library crate for qr-hunt-back, exposing modules for binaries and integration tests.

pub mod config;
/// Remote match document and its storage backends.
pub mod dao;
/// JSON payloads of the HTTP surface.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
pub mod qr;
/// axum routers.
pub mod routes;
/// Controller operations and background tasks.
pub mod services;
/// Session state: the match store and everything that owns it.
pub mod state;
