use std::sync::Arc;

use tracing::info;

use super::{stream_sink, stream_source, CutResolver, JobDescriptor};
use crate::{
    action::{ActionContext, SubmitError},
    config::AppConfiguration,
    error::BoxError,
    runtime::{JobGraph, JobHandle},
    store::{StreamStore, WriterMode},
};

/// Parameter choosing whether the output keeps the input order
pub const IS_STREAM_ORDERED: &str = "isStreamOrdered";
/// Parameter overriding the routing key of ordered writes
pub const ROUTING_KEY: &str = "output-routingKey";

/// Continuously copy a stream to another stream.
/// Events are copied as opaque bytes, so any serialization is supported.
/// Ordered jobs write every event with one fixed routing key.
pub struct StreamMirroringJob {
    config: AppConfiguration,
    context: ActionContext,
    default_name: &'static str,
}

impl StreamMirroringJob {
    /// Create the job. `default_name` is used unless the configuration names
    /// the job explicitly.
    pub fn new(config: AppConfiguration, context: ActionContext, default_name: &'static str) -> Self {
        Self {
            config,
            context,
            default_name,
        }
    }

    /// Parameters of this job
    pub fn config(&self) -> &AppConfiguration {
        &self.config
    }

    /// Name the job is submitted with
    pub fn job_name(&self) -> String {
        self.config.job_name(self.default_name)
    }

    /// Resolve the read range and assemble the descriptor of this job
    pub async fn descriptor(&self) -> Result<(JobDescriptor, Arc<dyn StreamStore>), BoxError> {
        let input = self.config.stream_config("input")?;
        let output = self.config.stream_config("output")?;
        let ordered = self.config.get_bool(IS_STREAM_ORDERED, true)?;
        info!("isStreamOrdered: {ordered}");

        let input_store = self.context.connector.connect(input.stream.controller())?;
        let resolver = CutResolver::new(input_store.as_ref());
        let start_cut = resolver
            .resolve_start_cut(&input.stream, input.start_at_tail)
            .await?;
        let end_cut = resolver.resolve_end_cut(&input.stream);

        let descriptor = JobDescriptor::builder()
            .input(input.stream)
            .start_cut(start_cut)
            .end_cut(end_cut)
            .output(output.stream)
            .ordered(ordered)
            .maybe_routing_key(self.config.get_str(ROUTING_KEY).map(str::to_owned))
            .writer_mode(WriterMode::ExactlyOnce)
            .build()?;
        Ok((descriptor, input_store))
    }

    /// Build the reader/writer graph and hand it to the execution environment.
    /// Returns as soon as the job is accepted.
    pub async fn submit_job(&self) -> Result<JobHandle, SubmitError> {
        let job_name = self.job_name();
        self.submit_inner(&job_name)
            .await
            .map_err(|source| SubmitError::new(job_name, source))
    }

    async fn submit_inner(&self, job_name: &str) -> Result<JobHandle, BoxError> {
        let (descriptor, input_store) = self.descriptor().await?;
        let output_store = self
            .context
            .connector
            .connect(descriptor.output().controller())?;

        let writer_id = format!("{job_name}-{}", descriptor.output().scoped_name());
        let graph = JobGraph::new(
            stream_source(input_store, &descriptor),
            stream_sink(output_store, descriptor.sink_spec(), writer_id),
        );
        info!("Executing {job_name} job");
        Ok(self.context.environment.submit(graph, job_name).await?)
    }
}
