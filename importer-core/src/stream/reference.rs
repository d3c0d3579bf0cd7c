use std::fmt::Display;

use url::Url;

use crate::config::ConfigError;

/// Identifies one logical stream in the log-storage system: a stream name
/// within a scope, reachable through a controller endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamRef {
    scope: String,
    stream: String,
    controller: Url,
}

impl StreamRef {
    /// Create a reference from its parts. Scope and stream names may only
    /// contain ASCII alphanumerics, `-` and `_`.
    pub fn new(
        scope: impl Into<String>,
        stream: impl Into<String>,
        controller: Url,
    ) -> Result<Self, ConfigError> {
        let scope = scope.into();
        let stream = stream.into();
        if !is_valid_name(&scope) || !is_valid_name(&stream) {
            return Err(ConfigError::InvalidScopedName(format!("{scope}/{stream}")));
        }
        Ok(Self {
            scope,
            stream,
            controller,
        })
    }

    /// Parse a scoped name of the form `scope/stream` together with the
    /// controller URI of the store holding it.
    pub fn parse(scoped_name: &str, controller: &str) -> Result<Self, ConfigError> {
        let (scope, stream) = scoped_name
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidScopedName(scoped_name.to_owned()))?;
        let controller = Url::parse(controller).map_err(|source| ConfigError::InvalidController {
            uri: controller.to_owned(),
            source,
        })?;
        Self::new(scope, stream, controller)
    }

    /// Scope this stream lives in
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Name of the stream within its scope
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Endpoint of the metadata service responsible for this stream
    pub fn controller(&self) -> &Url {
        &self.controller
    }

    /// The `scope/stream` form of this reference
    pub fn scoped_name(&self) -> String {
        format!("{}/{}", self.scope, self.stream)
    }
}

impl Display for StreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.stream)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
