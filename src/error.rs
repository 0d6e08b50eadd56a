//! Core error types and result handling
//!
//! All failures in this crate funnel into [`ModbusError`]. Task-level errors
//! are never thrown through the submission API; they reach consumers via the
//! callback, classified by [`ErrorKind`]. The retry loop in the executor uses
//! [`ModbusError::retry_action`] to decide whether a failed attempt keeps its
//! connection or invalidates it.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors produced by the transport manager and its wire layer.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Could not establish a link within the connect-retry budget.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// Mid-transaction socket or serial failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation exceeded its deadline.
    #[error("Timeout after {millis} ms: {message}")]
    Timeout { message: String, millis: u64 },

    /// The device replied with an exception PDU.
    #[error("Slave exception: function {function:02X}, code {code:02X} ({desc})", desc = exception_description(*.code))]
    Exception { function: u8, code: u8 },

    /// Response carried a transaction ID differing from the request's.
    #[error("Transaction ID mismatch: expected {expected:04X}, got {actual:04X}")]
    TransactionId { expected: u16, actual: u16 },

    /// Frame or payload could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Request parameters outside protocol limits.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Unsupported or unexpected function code.
    #[error("Invalid function code: {code:02X}")]
    InvalidFunction { code: u8 },

    /// Bad endpoint or manager configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Manager lifecycle violation (e.g. submit after deactivation).
    #[error("Manager inactive: {message}")]
    Inactive { message: String },

    /// Anything that does not fit the taxonomy above.
    #[error("Unexpected error: {message}")]
    Unknown { message: String },
}

/// Callback-facing error taxonomy.
///
/// Collapses [`ModbusError`] variants into the categories consumers care
/// about when deciding how to present or react to a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Link could not be established.
    ConnectionFailed,
    /// Socket/serial failure mid-transaction (includes timeouts).
    Io,
    /// Exception PDU from the device.
    SlaveException { function: u8, code: u8 },
    /// Response transaction ID did not match the request.
    TransactionIdMismatch,
    /// Malformed frame or payload.
    Decode,
    /// Everything else.
    Unknown,
}

/// What the executor does with the connection after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Close and re-borrow before the next attempt.
    Invalidate,
    /// Keep the connection, pace, retry on it.
    Keep,
}

impl ModbusError {
    /// Connection establishment failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Deadline exceeded.
    pub fn timeout(message: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            millis,
        }
    }

    /// Malformed frame or payload.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Request parameters outside protocol limits.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Unsupported function code.
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Bad configuration.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Lifecycle violation.
    pub fn inactive(message: impl Into<String>) -> Self {
        Self::Inactive {
            message: message.into(),
        }
    }

    /// Catch-all.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Project this error onto the callback-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::ConnectionFailed,
            Self::Io(_) | Self::Timeout { .. } => ErrorKind::Io,
            Self::Exception { function, code } => ErrorKind::SlaveException {
                function: *function,
                code: *code,
            },
            Self::TransactionId { .. } => ErrorKind::TransactionIdMismatch,
            Self::Decode { .. } => ErrorKind::Decode,
            _ => ErrorKind::Unknown,
        }
    }

    /// Per-error-kind retry policy.
    ///
    /// A slave exception means the link itself is healthy, so the connection
    /// is kept and the next attempt merely paces. Every other failure taints
    /// the connection and forces a re-borrow.
    pub fn retry_action(&self) -> RetryAction {
        match self.kind() {
            ErrorKind::SlaveException { .. } => RetryAction::Keep,
            _ => RetryAction::Invalidate,
        }
    }
}

/// Human-readable description of a Modbus exception code.
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_projection() {
        assert_eq!(
            ModbusError::connection("refused").kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(
            ModbusError::timeout("read", 3000).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            ModbusError::Exception {
                function: 3,
                code: 2
            }
            .kind(),
            ErrorKind::SlaveException {
                function: 3,
                code: 2
            }
        );
        assert_eq!(
            ModbusError::TransactionId {
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::TransactionIdMismatch
        );
        assert_eq!(ModbusError::decode("short frame").kind(), ErrorKind::Decode);
        assert_eq!(ModbusError::unknown("?").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_retry_action() {
        // Only slave exceptions keep the connection alive
        assert_eq!(
            ModbusError::Exception {
                function: 3,
                code: 6
            }
            .retry_action(),
            RetryAction::Keep
        );
        assert_eq!(
            ModbusError::timeout("read", 1000).retry_action(),
            RetryAction::Invalidate
        );
        assert_eq!(
            ModbusError::TransactionId {
                expected: 7,
                actual: 8
            }
            .retry_action(),
            RetryAction::Invalidate
        );
        assert_eq!(
            ModbusError::decode("garbage").retry_action(),
            RetryAction::Invalidate
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ModbusError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_exception_display() {
        let err = ModbusError::Exception {
            function: 0x03,
            code: 0x02,
        };
        let text = err.to_string();
        assert!(text.contains("03"));
        assert!(text.contains("Illegal Data Address"));
    }
}
