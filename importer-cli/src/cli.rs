use std::collections::HashMap;

use clap::ArgAction;
use data_importer::{
    action::StreamMirroringAction,
    config::{AppConfiguration, ACTION_TYPE, DEFAULT_CONTROLLER, JOB_NAME},
    job::{IS_STREAM_ORDERED, ROUTING_KEY},
};
use data_importer_kafka::KafkaMirroringAction;

/// Configure and run data importer jobs.
/// The job runs in this process until its source ends or it is interrupted
/// with Ctrl-C.
#[derive(clap::Parser, Debug)]
#[command(name = "data-importer", version, about, long_about = None)]
pub struct DataImporter {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Name of the job, defaults to the action type
    #[arg(long, global = true)]
    pub job_name: Option<String>,

    /// Do not create the output stream before submitting the job
    #[arg(long, global = true)]
    pub skip_metadata_changes: bool,

    /// Replication factor of topics created in Kafka
    #[arg(long, default_value_t = 1, global = true)]
    pub replication_factor: i32,
}

/// Action to run
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Continuously copy a stream to another stream
    StreamMirroring {
        #[command(flatten)]
        input: StreamInput,
        #[command(flatten)]
        output: StreamOutput,
    },
    /// Continuously copy a Kafka topic to a stream
    KafkaStreamMirroring {
        #[command(flatten)]
        input: TopicInput,
        #[command(flatten)]
        output: StreamOutput,
    },
}

/// Stream to read from
#[derive(clap::Args, Debug, Clone)]
pub struct StreamInput {
    /// Scoped name of the input stream, `<scope>/<stream>`
    #[arg(long)]
    pub input_stream: String,

    /// Controller URI of the input stream
    #[arg(long, default_value = DEFAULT_CONTROLLER)]
    pub input_controller: String,

    /// Start reading at the tail instead of the earliest event
    #[arg(long = "input-startAtTail")]
    pub input_start_at_tail: bool,
}

/// Kafka topic to read from
#[derive(clap::Args, Debug, Clone)]
pub struct TopicInput {
    /// Topic to read
    #[arg(long)]
    pub input_topic: String,

    /// Comma separated bootstrap servers of the topic
    #[arg(long)]
    pub input_brokers: String,

    /// Consumer group, defaults to the job name
    #[arg(long = "input-groupId")]
    pub input_group_id: Option<String>,

    /// Start at the latest record if the group has no committed offsets
    #[arg(long = "input-startAtTail")]
    pub input_start_at_tail: bool,
}

/// Stream to write to
#[derive(clap::Args, Debug, Clone)]
pub struct StreamOutput {
    /// Scoped name of the output stream, `<scope>/<stream>`
    #[arg(long)]
    pub output_stream: String,

    /// Controller URI of the output stream
    #[arg(long, default_value = DEFAULT_CONTROLLER)]
    pub output_controller: String,

    /// Partitions of the output stream if it has to be created
    #[arg(long, default_value_t = 1)]
    pub output_partitions: i32,

    /// Keep the input order by writing every event with one routing key
    #[arg(long = "isStreamOrdered", default_value_t = true, action = ArgAction::Set)]
    pub is_stream_ordered: bool,

    /// Routing key of ordered writes
    #[arg(long = "output-routingKey")]
    pub output_routing_key: Option<String>,
}

type Params = HashMap<String, String>;

fn set(params: &mut Params, key: &str, value: impl ToString) {
    params.insert(key.to_owned(), value.to_string());
}

impl StreamInput {
    fn extend(&self, params: &mut Params) {
        set(params, "input-stream", &self.input_stream);
        set(params, "input-controller", &self.input_controller);
        set(params, "input-startAtTail", self.input_start_at_tail);
    }
}

impl TopicInput {
    fn extend(&self, params: &mut Params) {
        set(params, "input-topic", &self.input_topic);
        set(params, "input-brokers", &self.input_brokers);
        if let Some(group_id) = &self.input_group_id {
            set(params, "input-groupId", group_id);
        }
        set(params, "input-startAtTail", self.input_start_at_tail);
    }
}

impl StreamOutput {
    fn extend(&self, params: &mut Params) {
        set(params, "output-stream", &self.output_stream);
        set(params, "output-controller", &self.output_controller);
        set(params, "output-partitions", self.output_partitions);
        set(params, IS_STREAM_ORDERED, self.is_stream_ordered);
        if let Some(key) = &self.output_routing_key {
            set(params, ROUTING_KEY, key);
        }
    }
}

impl DataImporter {
    /// The job parameters given on the command line
    pub fn app_configuration(&self) -> AppConfiguration {
        let mut params = Params::new();
        match &self.command {
            Command::StreamMirroring { input, output } => {
                set(&mut params, ACTION_TYPE, StreamMirroringAction::NAME);
                input.extend(&mut params);
                output.extend(&mut params);
            }
            Command::KafkaStreamMirroring { input, output } => {
                set(&mut params, ACTION_TYPE, KafkaMirroringAction::NAME);
                input.extend(&mut params);
                output.extend(&mut params);
            }
        }
        if let Some(job_name) = &self.job_name {
            set(&mut params, JOB_NAME, job_name);
        }
        AppConfiguration::new(params)
    }
}
