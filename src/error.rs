//! Error types for the link.
//!
//! This module defines the error hierarchy used across the crate. Each layer of
//! the protocol engine has its own narrow error type, and `LinkError`
//! consolidates them for the session-level API.
//!
//! ## Error Hierarchy
//!
//! - **`TransportError`**: Connection-level failures (refused, reset, timed out)
//!   on connect, send or receive. Recovered by the session driver through
//!   reconnect-and-retry.
//! - **`ProtocolError`**: The stream ended before a full reply frame arrived.
//!   Treated exactly like a transport failure.
//! - **`DecodeError`**: A reply buffer of the wrong size was handed to the
//!   codec. Pure, never touches the transport.
//! - **`ValidationError`**: Construction-time mismatches in schedules, buffers
//!   and configuration. Fatal and surfaced before any connection is attempted.
//! - **`LinkError`**: The umbrella type returned by the connection manager and
//!   session driver. Adds `RetriesExhausted` and `Cancelled`, the two ways an
//!   otherwise endless recovery loop can stop.
//!
//! By using `#[from]`, `LinkError` can be created from any of the narrow error
//! types with the `?` operator.

use crate::protocol::CommandKind;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the link error type.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Connection-level failure on the stream transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote side refused or dropped the connection attempt.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a frame did not complete.
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Reading a frame failed before the stream ended.
    #[error("Receive failed: {0}")]
    Recv(#[source] std::io::Error),

    /// The operation did not complete within the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out (`connect`, `send`, `recv`).
        operation: &'static str,
        /// Configured timeout.
        after: Duration,
    },

    /// An I/O operation was attempted without an open connection.
    #[error("Transport not connected")]
    NotConnected,

    /// The connection manager has been closed and cannot be reused.
    #[error("Transport already closed")]
    Closed,
}

/// Framing violation observed on the receive path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than a full frame arrived before the stream ended.
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Expected frame length in bytes.
        expected: usize,
        /// Bytes received before end of stream.
        received: usize,
    },
}

/// Failure to decode a reply frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The reply buffer is not exactly one measurement frame long.
    #[error("Measurement frame must be {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Required frame length.
        expected: usize,
        /// Length of the buffer that was handed in.
        actual: usize,
    },
}

/// Construction-time validation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A schedule must contain at least one timestep.
    #[error("Schedule must contain at least one timestep")]
    EmptySchedule,

    /// The command kind cannot be used to build a schedule.
    #[error("Command kind {0} cannot be scheduled")]
    NotSchedulable(CommandKind),

    /// A setpoint row has the wrong number of values for its kind.
    #[error("Row {row}: {kind} expects {expected} values, got {actual}")]
    ArityMismatch {
        /// Command kind of the schedule.
        kind: CommandKind,
        /// Offending row (timestep).
        row: usize,
        /// Arity required by the kind.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Setpoints of different kinds were mixed in one schedule.
    #[error("Row {row} is {actual}, schedule is {expected}")]
    MixedKinds {
        /// Offending row (timestep).
        row: usize,
        /// Kind of the first row.
        expected: CommandKind,
        /// Kind of the offending row.
        actual: CommandKind,
    },

    /// Left and right channel trajectories differ in length.
    #[error("Left trajectory has {left} samples, right has {right}")]
    LengthMismatch {
        /// Samples in the left channel.
        left: usize,
        /// Samples in the right channel.
        right: usize,
    },

    /// A measurement row was written out of timestep order.
    #[error("Expected write to timestep {expected}, got {actual}")]
    OutOfOrderWrite {
        /// Next timestep the buffer accepts.
        expected: usize,
        /// Timestep that was written.
        actual: usize,
    },

    /// Every row of the buffer has already been written.
    #[error("Measurement buffer is full ({capacity} rows)")]
    BufferFull {
        /// Buffer length.
        capacity: usize,
    },

    /// Configuration values parsed but are not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Primary error type for connection and session operations.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Schedule, buffer or configuration validation failed.
    ///
    /// **Error Type**: Permanent. Never retried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transport-level failure.
    ///
    /// **Error Type**: Transient. The session driver reconnects and resends.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The reply stream ended mid-frame.
    ///
    /// **Error Type**: Transient. Handled like a transport failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A reply frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Local I/O failure outside the transport (e.g. writing an export file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured retry bound was reached.
    #[error("{operation} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Operation being retried.
        operation: &'static str,
        /// Number of failed attempts.
        attempts: u32,
    },

    /// The session was cancelled through its `CancelHandle`.
    #[error("Session cancelled")]
    Cancelled,
}

impl LinkError {
    /// Returns true for failures the session driver recovers from by
    /// reconnecting and resending.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LinkError::Transport(TransportError::Closed) => false,
            LinkError::Transport(_) | LinkError::Protocol(_) | LinkError::Decode(_) => true,
            _ => false,
        }
    }
}

impl From<figment::Error> for LinkError {
    fn from(value: figment::Error) -> Self {
        LinkError::Config(Box::new(value))
    }
}
