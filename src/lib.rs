//! # Compliance Harness
//!
//! Hybrid retrieval and citation resolution for New Zealand building-code
//! questions.
//!
//! A question is classified into an intent, matched against a pre-embedded
//! corpus of code documents (Acceptable Solutions, Verification Methods,
//! industry codes of practice, standards, manufacturer manuals), ranked by a
//! blend of vector similarity, keyword boost and source authority, reduced
//! to one authoritative passage per document family where the intent calls
//! for it, and returned with citations that point at a clause, table,
//! figure or page.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────────────┐
//! │ JSONL    │──▶│ chq import   │──▶│ SQLite (chunks + FTS5) │
//! └──────────┘   └──────────────┘   └───────────┬────────────┘
//!                                               │ ConnectionPool
//!                                   ┌───────────▼────────────┐
//!                                   │    RetrievalService     │
//!                                   │ cache → classify → rank │
//!                                   └─────┬────────────┬─────┘
//!                                         ▼            ▼
//!                                    ┌────────┐   ┌────────┐
//!                                    │  CLI   │   │  HTTP  │
//!                                    │ (chq)  │   │ (axum) │
//!                                    └────────┘   └────────┘
//! ```
//!
//! The ranking pipeline itself (classifier, scorer, dedup, hierarchy,
//! citations) lives in `compliance-harness-core` and does no I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection options |
//! | [`migrate`] | Corpus schema |
//! | [`import`] | JSONL corpus import |
//! | [`sqlite_store`] | SQLite corpus store |
//! | [`pool`] | Bounded connection pool |
//! | [`cache`] | Result cache |
//! | [`embedding`] | Embedding providers |
//! | [`service`] | The retrieval service |
//! | [`server`] | HTTP server |

pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod import;
pub mod migrate;
pub mod pool;
pub mod server;
pub mod service;
pub mod sqlite_store;
