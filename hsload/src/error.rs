use crate::domain::DomainError;

/// Run-level failures.
///
/// Everything here ends the whole invocation with a non-zero exit status. The only failure that
/// is isolated to a single source - a remote source that cannot be staged - never becomes an
/// `Error`; it is logged and the source is skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing arguments; reported together with the usage text
    #[error("{0}")]
    Usage(String),

    /// Arguments parse but cannot work together (e.g. `--link` with an absolute local path)
    #[error("{0}")]
    Configuration(String),

    /// A required backend is not available in this build or on this host
    #[error("{0}")]
    CapabilityUnavailable(String),

    #[error("error opening file {location}: {source:#}")]
    SourceOpen {
        location: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Destination(#[from] DomainError),

    #[error("failed loading {location} into domain {domain}: {source:#}")]
    Transfer {
        location: String,
        domain: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}
