//! Structured logging message types.
//!
//! Diagnostic events are modeled as small structs with a `Display`
//! implementation and a `StructuredLog::log` method that emits a `tracing`
//! event with typed fields. Message types are organized by subsystem:
//! `messages::engine` for executor lifecycle events, `messages::processor`
//! for per-step events, `messages::jobs` for dispatcher state changes.

pub mod messages;
