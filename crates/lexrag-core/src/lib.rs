//! # LexRAG Core
//!
//! Engine logic for LexRAG, a retrieval-augmented question-answering
//! system over a corpus of plain-text legal documents: data models, the
//! error taxonomy, character-offset chunking, the store abstraction, the
//! hybrid retrieval algorithm, and citation-grounded answer generation.
//!
//! This crate contains no sqlx, filesystem I/O, or HTTP dependencies.
//! Concrete embedding/LLM providers and the SQLite store live in the
//! `lexrag` application crate.
//!
//! ## Pipeline
//!
//! ```text
//! document text ──▶ chunk ──▶ embed ──▶ VectorStore
//!
//! query ──▶ Retriever (hybrid / keyword-only) ──▶ ranked chunks
//!       ──▶ Generator (grounded prompt, citation check) ──▶ answer
//! ```

pub mod chunk;
pub mod citation;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod retrieve;
pub mod store;
pub mod tokenize;

pub use error::{Error, Result};
