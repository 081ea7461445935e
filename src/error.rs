// Error taxonomy shared by the agent and the server
// Typed errors for the domain, anyhow stays at the process boundary

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the codec, the store and the reporter
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Client input defect, translated to 400
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Unknown metric for the given kind, translated to 404
    #[error("metric not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    /// Network or protocol failure while reporting
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl MetricsError {
    /// Shorthand for building a malformed envelope error
    pub fn malformed(reason: impl Into<String>) -> Self {
        MetricsError::MalformedEnvelope(reason.into())
    }

    pub fn not_found(kind: impl Display, name: impl Into<String>) -> Self {
        MetricsError::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }
}

/// Snapshot file failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot at {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    #[test]
    fn test_not_found_message() {
        let err = MetricsError::not_found(MetricKind::Gauge, "Alloc");
        assert_eq!(err.to_string(), "metric not found: gauge/Alloc");
    }

    #[test]
    fn test_persistence_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MetricsError = PersistenceError::Io {
            path: PathBuf::from("/tmp/x.json"),
            source: io,
        }
        .into();
        assert!(matches!(err, MetricsError::Persistence(_)));
        assert!(err.to_string().contains("/tmp/x.json"));
    }
}
