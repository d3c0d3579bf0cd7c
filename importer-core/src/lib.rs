//! Data importer configures and submits data-movement jobs which copy events
//! between streams of a log-storage system.
//!
//! A job invocation runs through the same steps every time:
//! an [action::Action] is created from an [config::AppConfiguration] through the
//! [action::ActionRegistry], it commits any metadata changes (i.e. creating the
//! output stream), resolves the read range with the [job::CutResolver], assembles
//! a [job::JobDescriptor] and hands a source-to-sink graph to an
//! [runtime::ExecutionEnvironment].
pub mod action;
pub mod config;
pub mod error;
pub mod job;
pub mod runtime;
pub mod store;
pub mod stream;

pub use error::ImporterError;
