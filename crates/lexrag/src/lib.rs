//! # LexRAG
//!
//! Retrieval-augmented question answering over a corpus of plain-text
//! legal documents.
//!
//! LexRAG indexes a directory of documents into offset-addressable
//! chunks, embeds them through a remote or local model server, answers
//! questions with a hybrid of semantic and lexical retrieval (dropping
//! to keyword-only when no embedding backend is reachable), and forces
//! the language model to cite the retrieved evidence it was given.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Corpus  │──▶│   Pipeline    │──▶│  SQLite   │
//! │ dir scan │   │ Chunk+Embed  │   │ chunks+vec│
//! └──────────┘   └──────────────┘   └────┬──────┘
//!                                        │
//!                     ┌──────────────────┤
//!                     ▼                  ▼
//!                ┌──────────┐     ┌────────────┐
//!                │ Retriever │────▶│ Generator  │
//!                │ (hybrid)  │     │ (citations)│
//!                └──────────┘     └────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! lexrag init                      # create the database
//! lexrag sync                      # chunk and embed the corpus
//! lexrag search "налог на имущество"
//! lexrag ask "какая ставка налога на имущество?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Filesystem corpus enumeration |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`embedder`] | OpenAI / Ollama embedding providers |
//! | [`llm`] | OpenAI / Ollama answer-generation providers |
//! | [`sync`] | Corpus ingestion pipeline |
//! | [`embed_cmd`] | Embedding backfill commands |
//! | [`stats`] | Index statistics |

pub mod config;
pub mod corpus;
pub mod db;
pub mod embed_cmd;
pub mod embedder;
pub mod llm;
pub mod migrate;
pub mod sqlite_store;
pub mod stats;
pub mod sync;
