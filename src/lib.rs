//! Cadence: Sequential Batch Orchestration
//!
//! Drives batches of content-generation calls against a generative model:
//! plans items, executes them strictly in order through a pooled streaming
//! interface with timeout/retry/circuit-breaking, gates each result through
//! a single-pass quality workflow, and accumulates compacted cross-item
//! learnings that push later items toward higher quality.

pub mod api;
pub mod breaker;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod generation;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod quality;
pub mod session;
pub mod stream;
pub mod types;
