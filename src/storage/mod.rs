// src/storage/mod.rs
pub mod cache;
pub mod lock;
