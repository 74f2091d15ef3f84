//! Folio Server Library
//!
//! Durable AI job queue for collaborative documents. The modules are exposed
//! for the binary and the end-to-end tests.

pub mod ai;
pub mod config;
pub mod content_store;
pub mod job_queue;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use job_queue::{JobQueue, JobStatusStore, SqliteJobStatusStore, TemplateRegistry};
pub use server::{run_server, RequestsLoggingLevel};
