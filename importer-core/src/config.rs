//! Job parameters and engine settings.
//!
//! Job parameters arrive as a flat string map, the shape a command line
//! produces. [AppConfiguration] gives typed access to them. Settings of the
//! local execution engine are read from the environment into [EngineConfig].
use std::{collections::HashMap, fmt::Display, str::FromStr, time::Duration};

use envconfig::Envconfig;
use thiserror::Error;

use crate::{store::StreamPolicy, stream::StreamRef};

/// Parameter selecting which action to run
pub const ACTION_TYPE: &str = "action-type";
/// Parameter overriding the name of the submitted job
pub const JOB_NAME: &str = "job-name";
/// Controller used when a stream has no `<prefix>-controller` parameter
pub const DEFAULT_CONTROLLER: &str = "tcp://localhost:9090";

/// Flat parameters of one job invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfiguration {
    params: HashMap<String, String>,
}

impl AppConfiguration {
    /// Wrap the given parameters
    pub fn new(params: HashMap<String, String>) -> Self {
        Self { params }
    }

    /// All raw parameters
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Raw value of a parameter, if set
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Raw value of a parameter which must be set
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_str(key)
            .ok_or_else(|| ConfigError::MissingParam(key.to_owned()))
    }

    /// Parse a boolean parameter, falling back to `default` if it is not set
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_str(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(ConfigError::InvalidParam {
                key: key.to_owned(),
                value: v.to_owned(),
                reason: "expected `true` or `false`".to_owned(),
            }),
        }
    }

    /// Parse a parameter with [FromStr], falling back to `default` if it is not set
    pub fn get_parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_str(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidParam {
                key: key.to_owned(),
                value: v.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    /// The action this invocation should run
    pub fn action_type(&self) -> Result<&str, ConfigError> {
        self.require(ACTION_TYPE)
    }

    /// Name of the job, either the `job-name` parameter or the given default
    pub fn job_name(&self, default: &str) -> String {
        self.get_str(JOB_NAME).unwrap_or(default).to_owned()
    }

    /// Collect the `<prefix>-*` parameters describing a stream.
    ///
    /// `<prefix>-stream` is required, `<prefix>-controller` defaults to
    /// [DEFAULT_CONTROLLER], `<prefix>-startAtTail` to `false` and
    /// `<prefix>-partitions` to `1`.
    pub fn stream_config(&self, prefix: &str) -> Result<StreamConfig, ConfigError> {
        let scoped_name = self.require(&format!("{prefix}-stream"))?;
        let controller = self
            .get_str(&format!("{prefix}-controller"))
            .unwrap_or(DEFAULT_CONTROLLER);
        let stream = StreamRef::parse(scoped_name, controller)?;
        let start_at_tail = self.get_bool(&format!("{prefix}-startAtTail"), false)?;
        let partitions: i32 = self.get_parsed(&format!("{prefix}-partitions"), 1)?;
        if partitions < 1 {
            return Err(ConfigError::InvalidParam {
                key: format!("{prefix}-partitions"),
                value: partitions.to_string(),
                reason: "a stream needs at least one partition".to_owned(),
            });
        }
        Ok(StreamConfig {
            stream,
            start_at_tail,
            policy: StreamPolicy { partitions },
        })
    }
}

impl<K, V> FromIterator<(K, V)> for AppConfiguration
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Everything needed to read from or write to one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// The stream itself
    pub stream: StreamRef,
    /// Start reading at the tail instead of the earliest position
    pub start_at_tail: bool,
    /// Policy used when the stream has to be created
    pub policy: StreamPolicy,
}

/// Settings of the local execution engine
#[derive(Envconfig, Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval at which sinks are checkpointed, committing or flushing their writes
    #[envconfig(from = "DATA_IMPORTER_CHECKPOINT_INTERVAL_MS", default = "1000")]
    pub checkpoint_interval_ms: u64,
    /// Pause of a worker after polling its source returned nothing
    #[envconfig(from = "DATA_IMPORTER_IDLE_BACKOFF_MS", default = "10")]
    pub idle_backoff_ms: u64,
    /// Time a store reader blocks waiting for the next event
    #[envconfig(from = "DATA_IMPORTER_POLL_TIMEOUT_MS", default = "100")]
    pub poll_timeout_ms: u64,
}

impl EngineConfig {
    /// Load the settings from `DATA_IMPORTER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::init_from_env().map_err(|e| ConfigError::Environment(e.to_string()))
    }

    /// Interval between two checkpoints of a job
    #[inline]
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    /// Pause of an idle worker
    #[inline]
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Time a store reader blocks in a single poll
    #[inline]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_ms: 1000,
            idle_backoff_ms: 10,
            poll_timeout_ms: 100,
        }
    }
}

/// Invalid or missing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter `{0}`")]
    MissingParam(String),
    #[error("Invalid value `{value}` for parameter `{key}`: {reason}")]
    InvalidParam {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Invalid scoped stream name `{0}`, expected `<scope>/<stream>`")]
    InvalidScopedName(String),
    #[error("Invalid controller URI `{uri}`")]
    InvalidController {
        uri: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid stream cut `{0}`")]
    InvalidCut(String),
    #[error("Start cut `{start}` does not precede end cut `{end}`")]
    CutOrder { start: String, end: String },
    #[error("Unknown action type `{0}`")]
    UnknownAction(String),
    #[error("Invalid engine environment: {0}")]
    Environment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfiguration {
        AppConfiguration::from_iter([
            ("action-type", "stream-mirroring"),
            ("input-stream", "scope/in"),
            ("input-startAtTail", "TRUE"),
            ("output-stream", "scope/out"),
            ("output-controller", "tcp://other:9090"),
            ("output-partitions", "3"),
        ])
    }

    #[test]
    fn stream_config_with_defaults() {
        let input = config().stream_config("input").unwrap();
        assert_eq!(input.stream.to_string(), "scope/in");
        assert_eq!(input.stream.controller().as_str(), DEFAULT_CONTROLLER);
        assert!(input.start_at_tail);
        assert_eq!(input.policy.partitions, 1);
    }

    #[test]
    fn stream_config_explicit() {
        let output = config().stream_config("output").unwrap();
        assert_eq!(output.stream.controller().as_str(), "tcp://other:9090");
        assert!(!output.start_at_tail);
        assert_eq!(output.policy.partitions, 3);
    }

    #[test]
    fn missing_stream_is_an_error() {
        let err = config().stream_config("other").unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam(k) if k == "other-stream"));
    }

    #[test]
    fn invalid_bool() {
        let conf = AppConfiguration::from_iter([("isStreamOrdered", "yes")]);
        assert!(conf.get_bool("isStreamOrdered", true).is_err());
        assert!(conf.get_bool("absent", true).unwrap());
    }

    #[test]
    fn zero_partitions_rejected() {
        let conf = AppConfiguration::from_iter([("output-stream", "a/b"), ("output-partitions", "0")]);
        assert!(matches!(
            conf.stream_config("output"),
            Err(ConfigError::InvalidParam { .. })
        ));
    }

    #[test]
    fn job_name_override() {
        assert_eq!(config().job_name("default"), "default");
        let conf = AppConfiguration::from_iter([(JOB_NAME, "my-job")]);
        assert_eq!(conf.job_name("default"), "my-job");
    }

    #[test]
    fn engine_config_from_hashmap() {
        let conf = EngineConfig::init_from_hashmap(&HashMap::from([(
            "DATA_IMPORTER_CHECKPOINT_INTERVAL_MS".to_owned(),
            "250".to_owned(),
        )]))
        .unwrap();
        assert_eq!(conf.checkpoint_interval(), Duration::from_millis(250));
        assert_eq!(conf.idle_backoff(), EngineConfig::default().idle_backoff());
        assert_eq!(conf.poll_timeout(), Duration::from_millis(100));
    }
}
