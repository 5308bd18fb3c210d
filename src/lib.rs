//! Lotgate - an authenticating reverse-proxy gateway
//!
//! This library provides a small gateway that:
//! - Authenticates inbound callers via a static shared-secret header
//! - Restricts cross-origin browser access to an origin allow-list
//! - Retrieves dealership inventory through a presigned-URL resolve/download flow
//! - Forwards raw ADF-XML leads to an ingestion endpoint and mirrors the reply
//! - Normalizes upstream failures into stable JSON error responses

pub mod adf;
pub mod config;
pub mod error;
pub mod gate;
pub mod inventory;
pub mod server;
