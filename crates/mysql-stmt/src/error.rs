//! Error types for statement operations.
//!
//! Failures split into two classes. Misuse of the statement lifecycle
//! (wrong state, wrong arity, wrong attribute kind) raises [`Error`]
//! through the `Result` return. Server and transport failures do not:
//! the operation returns `false` and records a [`ServerError`] that the
//! caller reads back through the diagnostic accessors, mirroring how
//! database clients keep errno/message/sqlstate per handle.

use std::fmt;

use crate::protocol::{ErrPacket, cr};

/// Caller errors and unrecoverable failures.
#[derive(Debug)]
pub enum Error {
    /// Operation on a statement whose channel was already closed
    NotInitialized,
    /// Operation that needs a successful prepare first
    NotPrepared,
    /// Bind with the wrong number of parameters
    ArityMismatch { expected: usize, provided: usize },
    /// Row-dependent operation without a stored result
    NoStoredResult,
    /// Seek past the end of the stored result
    InvalidRowOffset { offset: u64, rows: u64 },
    /// Long-data targeted at a parameter index the statement does not have
    InvalidParamIndex { index: u16, count: u16 },
    /// Attribute id outside the supported set
    UnsupportedAttribute { attr: u32 },
    /// Attribute value of the wrong kind
    AttributeKind { attr: u32, expected: &'static str },
    /// Epoch value outside the years the wire format can carry
    TimeOutOfRange { millis: i64 },
    /// Fetched calendar fields that do not name a civil date
    TimeFieldsInvalid { year: u16, month: u8, day: u8 },
    /// Value extraction failure
    Type(TypeError),
    /// Server failure on a path that cannot report through the
    /// false-and-record convention (a row fetch dying mid-stream)
    Server(ServerError),
    /// I/O failure on such a path
    Io(std::io::Error),
}

/// Type conversion error when extracting values from rows.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// Diagnostic state recorded on a statement after a failed round trip.
///
/// Holds either the server's ERR packet fields or a client-detected
/// condition (CR code with SQL state `HY000`). A fresh statement holds
/// code 0, state `00000`, and an empty message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Error code; server codes start at 1000, client codes at 2000
    pub code: u16,
    /// Five-character SQLSTATE
    pub sql_state: String,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Build from a parsed ERR packet.
    #[must_use]
    pub fn from_err_packet(err: ErrPacket) -> Self {
        Self {
            code: err.error_code,
            sql_state: err.sql_state,
            message: err.error_message,
        }
    }

    /// Build a client-detected condition with the client SQL state.
    #[must_use]
    pub fn client(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: cr::SQLSTATE_CLIENT.to_string(),
            message: message.into(),
        }
    }

    /// Whether an error is actually recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.code != 0
    }
}

impl Default for ServerError {
    fn default() -> Self {
        Self {
            code: 0,
            sql_state: "00000".to_string(),
            message: String::new(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInitialized => write!(f, "statement not initialized"),
            Error::NotPrepared => write!(f, "statement not prepared"),
            Error::ArityMismatch { expected, provided } => write!(
                f,
                "parameter count mismatch: statement takes {expected}, {provided} supplied"
            ),
            Error::NoStoredResult => write!(f, "no stored result on this statement"),
            Error::InvalidRowOffset { offset, rows } => {
                write!(f, "row offset {offset} out of range (result has {rows} rows)")
            }
            Error::InvalidParamIndex { index, count } => {
                write!(f, "parameter index {index} out of range (statement takes {count})")
            }
            Error::UnsupportedAttribute { attr } => write!(f, "unsupported attribute id {attr}"),
            Error::AttributeKind { attr, expected } => {
                write!(f, "attribute id {attr} takes a {expected} value")
            }
            Error::TimeOutOfRange { millis } => {
                write!(f, "timestamp {millis}ms does not fit the wire calendar range")
            }
            Error::TimeFieldsInvalid { year, month, day } => {
                write!(f, "fetched date {year:04}-{month:02}-{day:02} is not a civil date")
            }
            Error::Type(e) => write!(f, "type error: {e}"),
            Error::Server(e) => {
                write!(f, "server error {} ({}): {}", e.code, e.sql_state, e.message)
            }
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

/// Result type alias for statement operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_error_is_clear() {
        let err = ServerError::default();
        assert!(!err.is_set());
        assert_eq!(err.code, 0);
        assert_eq!(err.sql_state, "00000");
        assert_eq!(err.message, "");
    }

    #[test]
    fn client_errors_use_client_state() {
        let err = ServerError::client(cr::CR_SERVER_LOST, "lost connection");
        assert!(err.is_set());
        assert_eq!(err.sql_state, "HY000");
        assert_eq!(err.message, "lost connection");
    }

    #[test]
    fn display_includes_diagnostics() {
        let msg = Error::ArityMismatch {
            expected: 2,
            provided: 3,
        }
        .to_string();
        assert!(msg.contains('2') && msg.contains('3'));

        let msg = Error::TimeFieldsInvalid {
            year: 0,
            month: 0,
            day: 0,
        }
        .to_string();
        assert!(msg.contains("0000-00-00"));
    }
}
