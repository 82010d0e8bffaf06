use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Position in the raw specification text where parsing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line:'{}', column:'{}'", self.line, self.column)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The raw text does not look like any of the supported formats.
    #[error("unsupported specification format")]
    UnsupportedFormat,
    /// Structural or semantic validation failure. Always raised before any network call.
    #[error("{}", invalid_spec_message(reason, location))]
    InvalidSpec {
        reason: String,
        location: Option<Location>,
    },
    /// The per-target queue has no room left for another run.
    #[error("queue is full for URL: '{key}', try again later")]
    QueueFull { key: String },
    /// The run task went away without sealing a record.
    #[error("test run for specification id '{0}' was aborted")]
    RunAborted(u64),
    #[error("specification not found with {0}")]
    SpecNotFound(String),
    #[error("specification with name '{0}' already exists")]
    DuplicateSpecName(String),
    /// Occurs when `spectest.toml` fails to load.
    #[error("failed to load spectest.toml: {0}")]
    LoadError(String),
    #[error("invalid configuration value: {0:#}")]
    ValueError(eyre::Error),
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Error {
        Error::InvalidSpec {
            reason: reason.into(),
            location: None,
        }
    }

    pub(crate) fn invalid_at(reason: impl Into<String>, location: Option<Location>) -> Error {
        Error::InvalidSpec {
            reason: reason.into(),
            location,
        }
    }
}

fn invalid_spec_message(reason: &str, location: &Option<Location>) -> String {
    match location {
        Some(location) => format!("invalid specification at {location}: {reason}"),
        None => format!("invalid specification: {reason}"),
    }
}
