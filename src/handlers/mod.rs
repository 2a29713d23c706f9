// src/handlers/mod.rs
pub mod status;
