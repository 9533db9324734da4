use core::fmt;
use std::sync::Arc;

/// Broad classification of everything the engine can report.
///
/// - `Configuration`: misuse detected while building a chain (invalid
///   pattern, registering an operator without a traversal, wrapping an
///   asynchronous chain twice, bad registry arguments).
/// - `Traversal`: a selector, predicate or visitor failed while elements
///   were being produced.
/// - `Data`: the elements themselves cannot be turned into the requested
///   shape (non-pair elements for `to_object`, unbounded materialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Traversal,
    Data,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Traversal => "traversal",
            ErrorKind::Data => "data",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into(), source: None }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    pub fn traversal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Traversal, msg)
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, msg)
    }

    /// Wrap a foreign error raised from inside a user callback.
    pub fn from_callback<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = err.to_string();
        Self::traversal(message).with_source(Some(Arc::new(err) as Arc<dyn std::error::Error + Send + Sync>))
    }

    /// Compose an error with a source cause.
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }

    pub fn is_traversal(&self) -> bool {
        self.kind == ErrorKind::Traversal
    }

    pub fn is_data(&self) -> bool {
        self.kind == ErrorKind::Data
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::configuration(format!("invalid pattern: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let e = Error::data("not a pair");
        assert_eq!(e.to_string(), "data error: not a pair");
    }

    #[test]
    fn regex_errors_are_configuration_errors() {
        let err: Error = fancy_regex::Regex::new("(").unwrap_err().into();
        assert!(err.is_configuration());
        assert!(std::error::Error::source(&err).is_some());
    }
}
