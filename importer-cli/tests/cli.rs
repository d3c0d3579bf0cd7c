use std::{sync::Arc, time::Duration};

use clap::Parser;
use data_importer::{
    action::ActionContext,
    runtime::LocalEnvironment,
    store::{MemoryConnector, MemoryStore, StreamMetadata, StreamPolicy},
    stream::StreamRef,
    ImporterError,
};
use data_importer_cli::{cli::DataImporter, host, registry, submit};

fn parse(args: &[&str]) -> DataImporter {
    DataImporter::try_parse_from(std::iter::once("data-importer").chain(args.iter().copied()))
        .unwrap()
}

fn stream(name: &str) -> StreamRef {
    StreamRef::parse(name, "tcp://localhost:9090").unwrap()
}

fn memory_context(store: &MemoryStore) -> ActionContext {
    let environment = LocalEnvironment::builder()
        .checkpoints(Duration::from_millis(5))
        .idle_backoff(Duration::from_millis(1))
        .build();
    ActionContext::new(
        Arc::new(MemoryConnector::new(store.clone())),
        Arc::new(environment),
    )
}

#[test]
fn stream_mirroring_params() {
    let args = parse(&[
        "stream-mirroring",
        "--input-stream",
        "examples/in",
        "--input-startAtTail",
        "--output-stream",
        "examples/out",
        "--output-controller",
        "tcp://pravega:9090",
        "--output-partitions",
        "3",
    ]);
    let config = args.app_configuration();
    assert_eq!(config.action_type().unwrap(), "stream-mirroring");
    assert_eq!(config.get_str("input-stream"), Some("examples/in"));
    assert_eq!(config.get_str("input-controller"), Some("tcp://localhost:9090"));
    assert_eq!(config.get_str("input-startAtTail"), Some("true"));
    assert_eq!(config.get_str("output-controller"), Some("tcp://pravega:9090"));
    assert_eq!(config.get_str("output-partitions"), Some("3"));
    assert_eq!(config.get_str("isStreamOrdered"), Some("true"));
    assert_eq!(config.get_str("output-routingKey"), None);
    assert_eq!(config.job_name("stream-mirroring"), "stream-mirroring");
    assert!(!args.skip_metadata_changes);
}

#[test]
fn unordered_with_globals() {
    let args = parse(&[
        "stream-mirroring",
        "--input-stream",
        "examples/in",
        "--output-stream",
        "examples/out",
        "--isStreamOrdered",
        "false",
        "--job-name",
        "nightly-copy",
        "--skip-metadata-changes",
    ]);
    let config = args.app_configuration();
    assert_eq!(config.get_bool("isStreamOrdered", true).unwrap(), false);
    assert_eq!(config.job_name("stream-mirroring"), "nightly-copy");
    assert!(args.skip_metadata_changes);
}

#[test]
fn kafka_stream_mirroring_params() {
    let args = parse(&[
        "--replication-factor",
        "3",
        "kafka-stream-mirroring",
        "--input-topic",
        "orders",
        "--input-brokers",
        "kafka-1:9092,kafka-2:9092",
        "--input-groupId",
        "importers",
        "--output-stream",
        "examples/orders",
        "--output-routingKey",
        "orders",
    ]);
    assert_eq!(args.replication_factor, 3);
    let config = args.app_configuration();
    assert_eq!(config.action_type().unwrap(), "kafka-stream-mirroring");
    assert_eq!(config.get_str("input-topic"), Some("orders"));
    assert_eq!(config.get_str("input-brokers"), Some("kafka-1:9092,kafka-2:9092"));
    assert_eq!(config.get_str("input-groupId"), Some("importers"));
    assert_eq!(config.get_str("input-startAtTail"), Some("false"));
    assert_eq!(config.get_str("output-routingKey"), Some("orders"));
}

#[test]
fn output_stream_is_required() {
    let result = DataImporter::try_parse_from([
        "data-importer",
        "stream-mirroring",
        "--input-stream",
        "examples/in",
    ]);
    assert!(result.is_err());
}

#[test]
fn registry_knows_both_actions() {
    assert_eq!(
        registry().action_types(),
        vec!["kafka-stream-mirroring", "stream-mirroring"]
    );
}

#[tokio::test]
async fn mirror_in_memory_until_cancelled() {
    let store = MemoryStore::new();
    store
        .create_stream(&stream("examples/in"), &StreamPolicy { partitions: 3 })
        .await
        .unwrap();
    for i in 0..20u8 {
        store.append(&stream("examples/in"), None, &[i]).unwrap();
    }
    let args = parse(&[
        "stream-mirroring",
        "--input-stream",
        "examples/in",
        "--output-stream",
        "examples/out",
    ]);

    let handle = submit(&args, memory_context(&store)).await.unwrap();
    assert_eq!(store.partition_count(&stream("examples/out")), Some(1));

    let out = stream("examples/out");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.events(&out).len() < 20 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.cancel();
    let summary = host(&handle).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.events, 20);
    assert_eq!(store.events(&out).len(), 20);
}

#[tokio::test]
async fn skipped_metadata_changes_leave_output_missing() {
    let store = MemoryStore::new();
    store
        .create_stream(&stream("examples/in"), &StreamPolicy::default())
        .await
        .unwrap();
    let args = parse(&[
        "stream-mirroring",
        "--input-stream",
        "examples/in",
        "--output-stream",
        "examples/out",
        "--skip-metadata-changes",
    ]);
    let handle = submit(&args, memory_context(&store)).await.unwrap();
    // the writer is opened by the job, which fails on the missing stream
    assert!(host(&handle).await.is_err());
    assert_eq!(store.create_stream_calls(), 1);
}

#[tokio::test]
async fn unreachable_store_fails_before_submission() {
    let store = MemoryStore::new();
    store.set_reachable(false);
    let args = parse(&[
        "stream-mirroring",
        "--input-stream",
        "examples/in",
        "--output-stream",
        "examples/out",
    ]);
    let err = submit(&args, memory_context(&store)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ImporterError>(),
        Some(ImporterError::Store(_))
    ));
}
