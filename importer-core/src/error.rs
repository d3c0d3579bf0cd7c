//! Errors which end a job invocation.
use thiserror::Error;

use crate::{action::SubmitError, config::ConfigError, store::StoreError};

/// Boxed error used where a failure from a pluggable backend is wrapped
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Any failure of a single importer invocation. None of these are retried
/// locally, they are all fatal to the current invocation.
#[derive(Debug, Error)]
pub enum ImporterError {
    /// Missing or invalid job parameters
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The stream store could not be reached or rejected a metadata change
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The job could not be handed to the execution environment
    #[error(transparent)]
    Submit(#[from] SubmitError),
}
