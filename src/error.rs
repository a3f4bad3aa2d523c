//! Error types for cache-stack.

use std::fmt;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a cache, store, decorator or builder can report.
///
/// `Error` is `Clone` so that one in-flight execution can hand the same
/// outcome to every caller waiting on it (see [`crate::singleflight`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The key is absent from the store. This is the only error decorators
    /// treat as recoverable.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The stored value does not have the statically expected type.
    #[error("type mismatch: expected {expected} ({context})")]
    TypeMismatch {
        expected: &'static str,
        context: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Envelope or wire layout is malformed.
    #[error("Invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Upstream store failure, passed through unchanged by every decorator.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Failure reported by a user supplied loader.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// A single configuration violation.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// All configuration violations found while compiling a builder.
    #[error("builder configs wrong: {}", join_display(.0))]
    InvalidConfig(Vec<Error>),

    /// A stage of the pipeline failed while being assembled.
    #[error("build cache [{cache}] failed: {source}")]
    BuildFailed { cache: String, source: Box<Error> },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    /// An error annotated with the stage that produced it.
    #[error("[{stage}] {source}")]
    Stage {
        stage: &'static str,
        source: Box<Error>,
    },

    /// Several independent failures reported together.
    #[error("{}", join_display(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// True if this error, or any error it wraps, is [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Stage { source, .. } | Error::BuildFailed { source, .. } => {
                source.is_not_found()
            }
            Error::Multiple(errors) => errors.iter().any(Error::is_not_found),
            _ => false,
        }
    }

    /// Wrap `err` with the name of the stage that failed.
    pub fn stage(stage: &'static str, err: Error) -> Self {
        Error::Stage {
            stage,
            source: Box::new(err),
        }
    }

    /// Join errors into one. Returns `None` for an empty list and the error
    /// itself when there is exactly one.
    pub fn join(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }

    pub(crate) fn type_mismatch<T>(context: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: std::any::type_name::<T>(),
            context: context.into(),
        }
    }
}

fn join_display(errors: &[Error]) -> impl fmt::Display + '_ {
    struct Joined<'a>(&'a [Error]);

    impl fmt::Display for Joined<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (i, err) in self.0.iter().enumerate() {
                if i > 0 {
                    f.write_str("; ")?;
                }
                write!(f, "{}", err)?;
            }
            Ok(())
        }
    }

    Joined(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_seen_through_wrappers() {
        let err = Error::stage("fetch", Error::NotFound("k".to_string()));
        assert!(err.is_not_found());

        let joined = Error::Multiple(vec![
            Error::BackendError("down".to_string()),
            Error::NotFound("k".to_string()),
        ]);
        assert!(joined.is_not_found());

        assert!(!Error::BackendError("timeout".to_string()).is_not_found());
    }

    #[test]
    fn test_join() {
        assert!(Error::join(vec![]).is_none());

        let single = Error::join(vec![Error::Cancelled]).expect("one error");
        assert!(matches!(single, Error::Cancelled));

        let many = Error::join(vec![
            Error::BackendError("a".to_string()),
            Error::BackendError("b".to_string()),
        ])
        .expect("joined error");
        assert_eq!(many.to_string(), "Backend error: a; Backend error: b");
    }

    #[test]
    fn test_invalid_config_lists_every_cause() {
        let err = Error::InvalidConfig(vec![
            Error::ConfigError("cache name is required".to_string()),
            Error::ConfigError("logic_ttl_ms must be >= 0, got -1".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("cache name is required"));
        assert!(msg.contains("logic_ttl_ms"));
    }
}
