//! # weft
//!
//! The binary side of weft: CLI, configuration loading and the HTTP
//! adapters for the embedding, reranking and extraction services.

pub mod cli;
pub mod services;
pub mod settings;
