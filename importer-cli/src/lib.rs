//! Command line launcher of the data importer.
//!
//! The binary turns its arguments into job parameters, submits the job to an
//! in-process [LocalEnvironment] and hosts it until it ends.
use std::sync::Arc;

use data_importer::{
    action::{create_action_submit_job, ActionContext, ActionRegistry, StreamMirroringAction},
    config::EngineConfig,
    runtime::{JobHandle, JobSummary, LocalEnvironment},
};
use data_importer_kafka::{KafkaConnector, KafkaMirroringAction};
use tokio::signal;
use tracing::info;

pub mod cli;
pub mod logging;

use cli::DataImporter;

/// All actions the binary can run
pub fn registry() -> ActionRegistry {
    ActionRegistry::new()
        .register(StreamMirroringAction::NAME, StreamMirroringAction::create)
        .register(KafkaMirroringAction::NAME, KafkaMirroringAction::create)
}

/// Kafka backed streams, jobs executed in this process
pub fn default_context(args: &DataImporter, engine: &EngineConfig) -> ActionContext {
    let connector = KafkaConnector::builder()
        .replication_factor(args.replication_factor)
        .poll_timeout(engine.poll_timeout())
        .build();
    ActionContext::new(
        Arc::new(connector),
        Arc::new(LocalEnvironment::from_config(engine)),
    )
}

/// Create the action given on the command line and submit its job
pub async fn submit(args: &DataImporter, context: ActionContext) -> eyre::Result<JobHandle> {
    let config = args.app_configuration();
    info!("Job parameters: {:?}", config.params());
    let handle =
        create_action_submit_job(&registry(), config, context, !args.skip_metadata_changes).await?;
    info!("Submitted job {} as {}", handle.job_name(), handle.job_id());
    Ok(handle)
}

/// Wait for the job to end. Ctrl-C cancels the job, which still checkpoints
/// its sink before it ends.
pub async fn host(handle: &JobHandle) -> eyre::Result<JobSummary> {
    let summary = tokio::select! {
        result = handle.wait() => result?,
        _ = signal::ctrl_c() => {
            info!("Interrupted, cancelling job {}", handle.job_name());
            handle.cancel();
            handle.wait().await?
        }
    };
    info!(
        "Job {} ended after {} events and {} checkpoints",
        handle.job_name(),
        summary.events,
        summary.checkpoints
    );
    Ok(summary)
}
