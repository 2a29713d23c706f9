// src/query/mod.rs
pub mod assembler;
pub mod client;
pub mod parser;
