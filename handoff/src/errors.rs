use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for handoff operations
///
/// Each kind names one failure category of the handoff protocol, so callers can decide
/// whether a failure is fatal for the invocation or only a policy branch.
///
/// # Examples
///
/// ```rust,ignore
/// use handoff::errors::{HandoffError, ErrorKind, HandoffResult};
///
/// fn example() -> HandoffResult<()> {
///     Err(HandoffError::new("token is not base64", ErrorKind::TokenDecodeError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Protocol errors
    /// The token channel content is not a valid encoded token
    TokenDecodeError,
    /// The transaction referenced by a token cannot be joined
    TransactionResumeError,
    /// The enlisted data-store write failed
    ResourceOperationError,
    /// The outer participant stopped waiting for the inner one
    WaitTimeout,
    /// The token channel already holds a pending token
    ChannelOccupied,

    // Lifecycle errors
    /// The operation is not valid in the current session or transaction state
    InvalidOperation,
    /// The coordinator could not record or resolve a transaction
    CoordinatorError,
    /// A configuration value was rejected
    InvalidConfiguration,

    // IO errors
    /// Generic IO error
    IOError,
    /// The file was not found
    FileNotFound,
    /// Permission denied for file operation
    PermissionDenied,

    // Encoding errors
    /// Error encoding or decoding persisted records
    EncodingError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::TokenDecodeError => write!(f, "Token decode error"),
            ErrorKind::TransactionResumeError => write!(f, "Transaction resume error"),
            ErrorKind::ResourceOperationError => write!(f, "Resource operation error"),
            ErrorKind::WaitTimeout => write!(f, "Wait timeout"),
            ErrorKind::ChannelOccupied => write!(f, "Channel occupied"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::CoordinatorError => write!(f, "Coordinator error"),
            ErrorKind::InvalidConfiguration => write!(f, "Invalid configuration"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileNotFound => write!(f, "File not found"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type of the handoff crate.
///
/// `HandoffError` carries a message, an [`ErrorKind`], an optional cause and the backtrace
/// captured where it was raised. `Display` prints the message only; `Debug` prints the
/// message followed by the cause chain, or by the backtrace when there is no cause.
///
/// # Examples
///
/// ```rust,ignore
/// use handoff::errors::{HandoffError, ErrorKind};
///
/// let cause = HandoffError::new("disk full", ErrorKind::IOError);
/// let err = HandoffError::new_with_cause(
///     "Failed to append row",
///     ErrorKind::ResourceOperationError,
///     cause,
/// );
/// ```
#[derive(Clone)]
pub struct HandoffError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<HandoffError>>,
    backtrace: Arc<Backtrace>,
}

impl HandoffError {
    /// Creates a new `HandoffError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        HandoffError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `HandoffError` that keeps `cause` in its error chain.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: HandoffError) -> Self {
        HandoffError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&HandoffError> {
        self.cause.as_deref()
    }
}

impl Display for HandoffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for HandoffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(f, "{} ({})\n{:?}", self.message, self.error_kind, self.backtrace),
        }
    }
}

impl Error for HandoffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for handoff operations.
pub type HandoffResult<T> = Result<T, HandoffError>;

impl From<std::io::Error> for HandoffError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IOError,
        };
        HandoffError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<base64::DecodeError> for HandoffError {
    fn from(err: base64::DecodeError) -> Self {
        HandoffError::new(
            &format!("Token is not valid base64: {}", err),
            ErrorKind::TokenDecodeError,
        )
    }
}

impl From<serde_json::Error> for HandoffError {
    fn from(err: serde_json::Error) -> Self {
        HandoffError::new(
            &format!("Record encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<String> for HandoffError {
    fn from(msg: String) -> Self {
        HandoffError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for HandoffError {
    fn from(msg: &str) -> Self {
        HandoffError::new(msg, ErrorKind::InternalError)
    }
}
