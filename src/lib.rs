//! # lexrag
//!
//! Retrieval-augmented question answering over legal documents.
//!
//! The orchestration core lives in [`lexrag_core`]. This crate supplies the
//! pieces that touch the outside world and wires them together:
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌───────────────┐
//! │   CLI    │──▶│ RagPipeline (core)   │──▶│ SQLite        │
//! │ (lexrag) │   │ split/embed/index/   │   │ docs, chunks, │
//! └──────────┘   │ store/generate ports │   │ vectors       │
//!                └──────────┬───────────┘   └───────────────┘
//!                           ▼
//!                ┌──────────────────────┐
//!                │ Embedding / chat     │
//!                │ backends (HTTP, local)│
//!                └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store, chunk store, and vector index |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`embedding`] | Embedder backends |
//! | [`generation`] | Answer generator backends |
//! | [`app`] | Composition root |
//! | [`ingest`], [`search`], [`get`] | CLI command implementations |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod get;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
