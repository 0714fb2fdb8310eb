#![deny(missing_docs)]

//! Core library for the docpipe document ingestion and retrieval server.

/// Stage activities executed by the pipeline worker pools.
pub mod activities;
/// HTTP routing and REST handlers.
pub mod api;
/// Sentence-based text chunking engine.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text-extraction boundary and HTTP adapter.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Pipeline orchestrator, queues, retry policy, and run journal.
pub mod pipeline;
/// Qdrant vector index integration.
pub mod qdrant;
/// Hybrid vector/keyword search service.
pub mod search;
/// Local persistence of uploaded documents.
pub mod storage;
