//! docuflow: a configurable document-analysis pipeline engine.
//!
//! Pipelines are declared as JSON files (linear step lists or DAGs of
//! nodes), validated into typed descriptors, and executed over a PDF or
//! image input. Processors fan one payload out into many (PDF pages),
//! propagate replacement bytes 1:1, or emit terminal analysis results;
//! a final aggregation pass folds the flat result stream into a
//! page-centric document tree.

pub mod backends;   // adapters for external collaborators
pub mod config;     // pipeline descriptors + registry
pub mod engine;     // executors, instrumentation, aggregation
pub mod errors;     // error handling
pub mod jobs;       // dispatcher, job tracking, status pub/sub
pub mod observability;
pub mod payload;    // data contracts between steps
pub mod ports;      // seams to external capabilities
pub mod processors; // the processor catalog + factory
pub mod traits;     // unified abstractions
