//! HTTP host surface
//!
//! Thin axum layer over the gateway. Handlers deserialize the request,
//! call exactly one gateway or engine operation, and map `CalypsoError`
//! to its HTTP status with a sanitized body.

pub mod server;

pub use server::{ApiServer, ApiServerConfig};
