//! # Compliance Harness Core
//!
//! Pure retrieval logic for Compliance Harness: chunk model, intent
//! classifier, hybrid scorer, deduplicator, source hierarchy resolver,
//! citation locator, corpus store trait, and embedding trait.
//!
//! This crate contains no tokio runtime, sqlx, HTTP, or filesystem I/O.
//! Caching, pooling, timeouts and the SQLite backend live in the
//! `compliance-harness` app crate.

pub mod citation;
pub mod classifier;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod family;
pub mod hierarchy;
pub mod lexicon;
pub mod models;
pub mod pipeline;
pub mod scorer;
pub mod store;
