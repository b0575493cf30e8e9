//! # NeuroRAG
//!
//! A small retrieval-augmented question-answering engine over a folder of
//! documents.
//!
//! NeuroRAG loads PDF, Markdown, text, CSV and XLSX files, cuts them into
//! overlapping chunks, embeds the chunks into a persisted nearest-neighbor
//! index, and answers questions by handing the closest chunks to a language
//! model together with a fixed prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│ Index (SQLite)│
//! │ pdf/md/… │   └─────────┘   └──────────┘   └──────┬───────┘
//! └──────────┘                                      │
//!                   ┌───────────┐   ┌─────────────┐ │
//!   question ──────▶│ Retriever │◀──┤   query     │◀┘
//!                   └─────┬─────┘   └─────────────┘
//!                         ▼
//!                  ┌─────────────┐   ┌────────────────┐
//!                  │ Synthesizer │──▶│ CLI / HTTP /    │
//!                  │   (LLM)     │   │ chat log        │
//!                  └─────────────┘   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! neurorag build                          # index ./data into ./vectorstore
//! neurorag search "refund policy" --trust-index
//! neurorag ask "How long is the warranty?" --trust-index
//! neurorag chat --user ada --trust-index
//! neurorag serve --trust-index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error type shared by the library |
//! | [`models`] | Documents, chunks, retrieval results |
//! | [`loader`] / [`extract`] | Directory scan and per-format text extraction |
//! | [`chunk`] | Separator-aware sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] / [`db`] | Persisted vector index |
//! | [`retriever`] | Query embedding and top-K lookup |
//! | [`prompt`] / [`synth`] | Prompt template and answer synthesizers |
//! | [`session`] / [`chat_log`] | Conversations, replies, CSV chat log |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod chat_log;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod inspect;
pub mod loader;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod search;
pub mod server;
pub mod session;
pub mod synth;
