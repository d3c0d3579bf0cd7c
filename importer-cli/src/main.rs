use clap::Parser;
use data_importer::config::EngineConfig;
use data_importer_cli::{cli::DataImporter, default_context, host, logging, submit};
use tracing::debug;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = DataImporter::parse();
    logging::init(&args.log_level);
    debug!("Got the following args: {args:?}");

    let engine = EngineConfig::from_env()?;
    let handle = submit(&args, default_context(&args, &engine)).await?;
    host(&handle).await?;
    Ok(())
}
