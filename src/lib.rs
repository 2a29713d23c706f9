// src/lib.rs
//! The binary in `main.rs` only wires these modules into an actix-web server.
//! They live in a library target so the integration tests in `tests/` can
//! drive the cache against a fake game server.
pub mod charset;
pub mod config;
pub mod handlers;
pub mod models;
pub mod query;
pub mod storage;
pub mod templates;
pub mod utils;

#[cfg(test)]
mod test_support;
