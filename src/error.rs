use std::error::Error;

use crate::protocol::Phase;

/// Errors raised while validating options, before any backend exists.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pattern length must be non-zero")]
    EmptyPattern,
    #[error("text length must be non-zero")]
    EmptyText,
    #[error("pattern length {pattern} must be smaller than text length {text}")]
    PatternNotShorter { pattern: usize, text: usize },
    #[error("{role} must provide {field}")]
    MissingField {
        role: &'static str,
        field: &'static str,
    },
    #[error("unknown role {0:?}, expected pattern-holder or text-holder")]
    UnknownRole(String),
    #[error("invalid party argument {0:?}, expected id,host,port")]
    InvalidParty(String),
    #[error("party id must be 0 or 1, got {0}")]
    InvalidPartyId(u64),
    #[error("expecting exactly two --party options, got {0}")]
    PartyCount(usize),
    #[error("need party arguments for party 0 and 1")]
    DuplicateParty,
    #[error("dealer seed must be 64 hex characters")]
    InvalidSeed,
    #[error("repetitions must be at least 1")]
    NoRepetitions,
    #[error("failed to read config file: {0}")]
    File(String),
}

/// Backend or network failure during one execution phase.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct BackendError(#[from] pub(crate) ErrorRepr);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorRepr {
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("codec error: {0}")]
    Codec(Box<dyn Error + Send + Sync + 'static>),
    #[error("frame mismatch: {0}")]
    Frame(String),
    #[error("input stream mismatch: {0}")]
    InputStream(String),
    #[error("handle {index} belongs to circuit {found}, not circuit {expected}")]
    StaleHandle {
        index: usize,
        expected: u64,
        found: u64,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("{gate} gate cannot take a {found} share")]
    WireKind { gate: String, found: &'static str },
}

impl BackendError {
    pub(crate) fn codec<E>(err: E) -> BackendError
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self(ErrorRepr::Codec(err.into()))
    }

    pub(crate) fn frame(msg: impl Into<String>) -> BackendError {
        Self(ErrorRepr::Frame(msg.into()))
    }

    pub(crate) fn input_stream(msg: impl Into<String>) -> BackendError {
        Self(ErrorRepr::InputStream(msg.into()))
    }

    pub(crate) fn handshake(msg: impl Into<String>) -> BackendError {
        Self(ErrorRepr::Handshake(msg.into()))
    }

    /// Returns `true` if the failure came from the underlying transport.
    pub fn is_io(&self) -> bool {
        matches!(self.0, ErrorRepr::Io(_))
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self(ErrorRepr::Io(err))
    }
}

impl From<bincode::Error> for BackendError {
    fn from(err: bincode::Error) -> Self {
        Self::codec(err)
    }
}

/// Top-level error of a protocol run.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("error in {phase}: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: BackendError,
    },
}

impl ProtocolError {
    /// Wraps a backend error of `phase`, for use with `map_err`.
    pub fn phase(phase: Phase) -> impl Fn(BackendError) -> ProtocolError {
        move |source| ProtocolError::Phase { phase, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_display() {
        let err = ProtocolError::phase(Phase::Equality)(BackendError::frame("round 3"));
        assert_eq!(
            err.to_string(),
            "error in equality phase: frame mismatch: round 3"
        );
        assert!(!matches!(err, ProtocolError::Config(_)));
    }

    #[test]
    fn test_io_errors_are_flagged() {
        let err: BackendError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(err.is_io());
        assert!(!BackendError::handshake("peer").is_io());
    }
}
