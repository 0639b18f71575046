#![deny(missing_docs)]

//! Question answering over a PDF document with a retrieval-augmented generation pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration.
pub mod config;
/// PDF acquisition and page extraction.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Crate-wide error type and its classification.
pub mod error;
/// Vector index, similarity stores and retrieval.
pub mod index;
/// Chat-completion client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answering counters.
pub mod metrics;
/// Query and ingestion graphs.
pub mod pipeline;
/// Question-answering facade.
pub mod qa;
/// Page-to-chunk text splitting.
pub mod splitter;

pub use error::{ErrorKind, QaError};
pub use qa::{QaOutput, QaResult, QaSystem, QueryInput};
