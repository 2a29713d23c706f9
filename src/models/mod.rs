// src/models/mod.rs
pub mod server;
pub mod status;
