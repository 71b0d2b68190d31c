use std::fmt;

use thiserror::Error;

/// Errors that can occur while resolving or running a classification scope.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration entry could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A backend exchange failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Error returned when a backend exchange fails.
///
/// Backend errors never cross the processor boundary: the pipeline logs them
/// and carries on with the unmodified value. They are public so hosts and
/// tests can drive a [`Backend`](crate::backend::Backend) directly.
///
/// # Examples
///
/// ```
/// use classify_relay::{BackendError, BackendErrorKind};
///
/// let error = BackendError::new(BackendErrorKind::Timeout, "no reply from 127.0.0.1:9000");
/// assert_eq!(error.kind(), BackendErrorKind::Timeout);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend error ({kind}): {message}")]
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
}

impl BackendError {
    /// Creates a new backend error.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Kind of backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The backend has no live handle (process never started, no address).
    NotStarted,
    /// The payload contains a newline and would desynchronise a line protocol.
    EmbeddedNewline,
    /// The scope's subprocess exchange lock could not be acquired.
    Lock,
    /// Connecting to the target failed.
    Connect,
    /// Writing the payload failed.
    Send,
    /// Reading the response failed.
    Receive,
    /// The peer closed the stream before replying.
    Closed,
    /// The exchange did not finish within its timeout.
    Timeout,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::EmbeddedNewline => write!(f, "embedded newline"),
            Self::Lock => write!(f, "lock unavailable"),
            Self::Connect => write!(f, "connect failed"),
            Self::Send => write!(f, "send failed"),
            Self::Receive => write!(f, "receive failed"),
            Self::Closed => write!(f, "closed by peer"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

/// A problem found while resolving configuration into a [`Scope`](crate::Scope).
///
/// Resolution never aborts on these: the offending entry becomes a no-op and
/// the error is kept in [`Scope::diagnostics`](crate::Scope::diagnostics).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Unknown field source keyword.
    #[error("unknown field source '{0}'")]
    UnknownFieldSource(String),
    /// Unknown processor backend keyword.
    #[error("unknown processor type '{0}'")]
    UnknownBackendKind(String),
    /// Unknown class response keyword.
    #[error("unknown class response type '{0}'")]
    UnknownResponseKind(String),
    /// Unknown output format keyword.
    #[error("unknown output format '{0}'")]
    UnknownOutputFormat(String),
    /// A TCP target that is not `host:port`.
    #[error("no host:port in '{0}'")]
    BadAddress(String),
    /// A Unix-socket target with an empty path.
    #[error("empty socket path")]
    EmptySocketPath,
    /// A pattern that does not compile.
    #[error("failed to compile pattern '{pattern}': {reason}")]
    BadPattern {
        /// The pattern expression as configured.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },
    /// A subprocess that could not be started.
    #[error("could not start program '{program}': {reason}")]
    SpawnFailed {
        /// The program path as configured.
        program: String,
        /// Why the spawn failed.
        reason: String,
    },
    /// A class response without an action.
    #[error("missing action for class '{0}'")]
    MissingAction(String),
    /// A backend kind that cannot serve the requested role.
    #[error("{kind} processors cannot be used as a {role}")]
    NotAllowed {
        /// The backend kind keyword.
        kind: String,
        /// The role it was declared for.
        role: String,
    },
    /// Class responses attached to a preprocessor.
    #[error("preprocessor '{0}' cannot have class responses")]
    ResponsesOnPreprocessor(String),
    /// A configuration document that failed to parse.
    #[error("invalid configuration document: {0}")]
    Parse(String),
}
