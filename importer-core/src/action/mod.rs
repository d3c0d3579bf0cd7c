//! Actions turn a job configuration into a submitted job.
//!
//! Every kind of job is an [Action]: it holds its configuration, names its
//! job, commits metadata changes its job depends on and submits the job.
//! Actions are created by type name through an [ActionRegistry] which is
//! built once at startup and passed around explicitly.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    config::{AppConfiguration, ConfigError, StreamConfig},
    error::{BoxError, ImporterError},
    runtime::{ExecutionEnvironment, JobHandle},
    store::{StoreConnector, StoreError, StreamMetadata},
};

mod stream_mirroring;

pub use stream_mirroring::StreamMirroringAction;

/// Collaborators an action needs to do its work
#[derive(Clone)]
pub struct ActionContext {
    /// Opens stream stores by controller URI
    pub connector: Arc<dyn StoreConnector>,
    /// Environment jobs are submitted to
    pub environment: Arc<dyn ExecutionEnvironment>,
}

impl ActionContext {
    /// Bundle a connector and an environment
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        environment: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self {
            connector,
            environment,
        }
    }
}

/// A kind of job which can be configured and submitted
#[async_trait]
pub trait Action: Send + Sync {
    /// Parameters this action was created with
    fn config(&self) -> &AppConfiguration;

    /// Name the job will be submitted with
    fn job_name(&self) -> String;

    /// Apply metadata changes the job relies on, e.g. creating its output
    /// stream. Must be safe to call repeatedly.
    async fn commit_metadata_changes(&self) -> Result<(), StoreError>;

    /// Submit the job, returning as soon as it was accepted
    async fn submit_job(&self) -> Result<JobHandle, SubmitError>;
}

/// Creates an action from its parameters
pub type ActionConstructor =
    fn(AppConfiguration, ActionContext) -> Result<Box<dyn Action>, ConfigError>;

/// Maps action type names to their constructors
#[derive(Clone, Default)]
pub struct ActionRegistry {
    constructors: HashMap<&'static str, ActionConstructor>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under an action type name, replacing any
    /// constructor registered under the same name
    pub fn register(mut self, action_type: &'static str, constructor: ActionConstructor) -> Self {
        self.constructors.insert(action_type, constructor);
        self
    }

    /// All registered action types, sorted
    pub fn action_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.constructors.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Create the action named by the `action-type` parameter
    pub fn create(
        &self,
        config: AppConfiguration,
        context: ActionContext,
    ) -> Result<Box<dyn Action>, ConfigError> {
        let action_type = config.action_type()?;
        let constructor = self
            .constructors
            .get(action_type)
            .ok_or_else(|| ConfigError::UnknownAction(action_type.to_owned()))?;
        constructor(config, context)
    }
}

/// Create the configured action, optionally commit its metadata changes and
/// submit its job.
pub async fn create_action_submit_job(
    registry: &ActionRegistry,
    config: AppConfiguration,
    context: ActionContext,
    commit_metadata: bool,
) -> Result<JobHandle, ImporterError> {
    let action = registry.create(config, context)?;
    if commit_metadata {
        action.commit_metadata_changes().await?;
    }
    Ok(action.submit_job().await?)
}

/// Create the scope and stream of `output` unless they exist already
pub async fn create_stream<M>(metadata: &M, output: &StreamConfig) -> Result<(), StoreError>
where
    M: StreamMetadata + ?Sized,
{
    let stream = &output.stream;
    if metadata.create_scope(stream.scope()).await? {
        info!("Created scope {}", stream.scope());
    }
    if metadata.create_stream(stream, &output.policy).await? {
        info!(
            "Created stream {stream} with {} partitions",
            output.policy.partitions
        );
    } else {
        info!("Stream {stream} already exists");
    }
    Ok(())
}

/// A job could not be submitted
#[derive(Debug, Error)]
#[error("Failed to submit job `{job_name}`")]
pub struct SubmitError {
    job_name: String,
    #[source]
    source: BoxError,
}

impl SubmitError {
    /// Wrap the cause of a failed submission
    pub fn new(job_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            job_name: job_name.into(),
            source: source.into(),
        }
    }

    /// Name of the job which failed to submit
    pub fn job_name(&self) -> &str {
        &self.job_name
    }
}
