//! Error types for IEC 60870-5-104 protocol.
//!
//! Errors are grouped into the six categories the engine distinguishes:
//! configuration, encoding, decoding, protocol, transport, and application
//! errors. Each category is its own `thiserror` enum; [`Iec104Error`] unifies
//! them so call sites that don't care about the category can still match on
//! one type.

use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for IEC 104 operations.
pub type Result<T> = std::result::Result<T, Iec104Error>;

/// Errors raised synchronously at construction time: bad addresses,
/// out-of-bounds timeouts, TypeID/role mismatches.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address: {0}")]
    InvalidAddress(Cow<'static, str>),

    #[error("invalid port: {0}")]
    InvalidPort(i64),

    #[error("timeout out of bounds: {name} = {value_ms}ms")]
    TimeoutOutOfBounds { name: &'static str, value_ms: u64 },

    #[error("t2 ({t2_ms}ms) must be less than t1 ({t1_ms}ms)")]
    T2NotLessThanT1 { t2_ms: u64, t1_ms: u64 },

    #[error("w ({w}) must be at most two thirds of k ({k})")]
    WindowThresholdTooLarge { k: u16, w: u16 },

    #[error("unsupported type id: {0}")]
    UnsupportedTypeId(u8),

    #[error("type id {type_id} cannot carry a timestamp")]
    TimestampNotAllowed { type_id: &'static str },

    #[error("type id {type_id} requires a timestamp")]
    TimestampRequired { type_id: &'static str },

    #[error("invalid group index: {0}")]
    InvalidGroup(u8),

    #[error("select-and-execute requested for non-selectable type id {0}")]
    NotSelectable(&'static str),

    #[error("related_auto_return set without related_io_address")]
    AutoReturnWithoutRelatedIoa,

    #[error("callback {callback} is not available for role {role}")]
    WrongRoleCallback {
        callback: &'static str,
        role: &'static str,
    },
}

/// Errors raised while turning application values into wire bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("type id {0} must not carry a recorded_at timestamp")]
    UnexpectedTimestamp(&'static str),

    #[error("type id {0} requires a recorded_at timestamp")]
    MissingTimestamp(&'static str),

    #[error("value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("encoded ASDU would exceed max_asdu_size ({0} bytes)")]
    AsduTooLarge(usize),
}

/// Errors raised while turning wire bytes into application values. These
/// never tear down a connection on their own; the caller reports them to
/// `on_unexpected_message` and drops the offending ASDU.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid APDU length: {0}")]
    InvalidLength(usize),

    #[error("unknown type id: {0}")]
    UnknownTypeId(u8),

    #[error("unknown cause of transmission: {0}")]
    UnknownCot(u8),

    #[error("unknown common address: {0}")]
    UnknownCa(u16),

    #[error("unknown information object address: {0}")]
    UnknownIoa(u32),

    #[error("cause of transmission {cot} is invalid for type id {type_id}")]
    InvalidCotForType { cot: &'static str, type_id: &'static str },

    #[error("type id {received} does not match registered point type {expected}")]
    TypeMismatch {
        expected: &'static str,
        received: &'static str,
    },
}

/// APCI-level protocol errors. These close the connection and trigger
/// reconnect per the connection state machine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("sequence number mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u16, actual: u16 },

    #[error("t1 timeout: no acknowledgment received")]
    T1Timeout,

    #[error("t3 timeout: no TESTFR confirmation received")]
    T3Timeout,

    #[error("window overrun: {unacked} unacknowledged frames exceeds k={k}")]
    WindowOverrun { unacked: u16, k: u16 },

    #[error("invalid frame: {0}")]
    InvalidFrame(Cow<'static, str>),
}

/// Transport-level errors: connect failures, TLS handshake failures, peer
/// resets. The crate never implements TLS itself; it only surfaces failures
/// reported by the transport it was handed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("tls handshake failed: {0}")]
    TlsHandshakeFailed(Cow<'static, str>),

    #[error("peer reset the connection")]
    PeerReset,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the application layer: command outcomes and
/// select-and-execute conflicts.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("command timed out waiting for resolution")]
    CommandTimeout,

    #[error("received negative confirmation")]
    NegativeConfirmation,

    #[error("selection held by a different originator")]
    SelectConflict,

    #[error("no active selection for this point")]
    NoSelection,

    #[error("selection expired")]
    SelectionExpired,

    #[error("point is not a command type")]
    NotCommandType,

    #[error("operation not permitted for this role")]
    WrongRole,

    #[error("point is readonly")]
    Readonly,
}

/// IEC 60870-5-104 protocol error types, unifying the six error categories.
///
/// Uses `Cow<'static, str>` to avoid allocations for static error messages.
#[derive(Debug, Error)]
pub enum Iec104Error {
    /// Configuration error (synchronous, raised at construction).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Encoding error.
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error.
    #[error("decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// APCI-level protocol error.
    #[error("protocol error: {0}")]
    ProtocolLevel(#[from] ProtocolError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportLevel(#[from] TransportError),

    /// Application-level error.
    #[error("application error: {0}")]
    ApplicationLevel(#[from] ApplicationError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(Cow<'static, str>),

    /// Not connected to remote
    #[error("Not connected")]
    NotConnected,

    /// Connection timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// Invalid frame format
    #[error("Invalid frame: {0}")]
    InvalidFrame(Cow<'static, str>),

    /// Invalid ASDU
    #[error("Invalid ASDU: {0}")]
    InvalidAsdu(Cow<'static, str>),

    /// Unknown type identifier
    #[error("Unknown type ID: {0}")]
    UnknownTypeId(u8),

    /// Sequence number mismatch
    #[error("Sequence number mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u16, actual: u16 },

    /// T1 timeout (send confirmation)
    #[error("T1 timeout: no confirmation received")]
    T1Timeout,

    /// T2 timeout (no data acknowledgment)
    #[error("T2 timeout: acknowledgment timeout")]
    T2Timeout,

    /// T3 timeout (test frame)
    #[error("T3 timeout: connection test failed")]
    T3Timeout,

    /// Too many unconfirmed frames
    #[error("Too many unconfirmed frames (K={0})")]
    TooManyUnconfirmed(u16),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(Cow<'static, str>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(Cow<'static, str>),
}

impl Iec104Error {
    /// Create a protocol error with a static message (zero allocation).
    #[inline]
    pub const fn protocol_static(msg: &'static str) -> Self {
        Self::Protocol(Cow::Borrowed(msg))
    }

    /// Create a protocol error with a dynamic message.
    #[inline]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(Cow::Owned(msg.into()))
    }

    /// Create an invalid frame error with a static message (zero allocation).
    #[inline]
    pub const fn invalid_frame_static(msg: &'static str) -> Self {
        Self::InvalidFrame(Cow::Borrowed(msg))
    }

    /// Create an invalid frame error with a dynamic message.
    #[inline]
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(Cow::Owned(msg.into()))
    }

    /// Create an invalid ASDU error with a static message (zero allocation).
    #[inline]
    pub const fn invalid_asdu_static(msg: &'static str) -> Self {
        Self::InvalidAsdu(Cow::Borrowed(msg))
    }

    /// Create an invalid ASDU error with a dynamic message.
    #[inline]
    pub fn invalid_asdu(msg: impl Into<String>) -> Self {
        Self::InvalidAsdu(Cow::Owned(msg.into()))
    }

    /// Check if this error indicates a connection problem.
    #[inline]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::NotConnected
                | Self::ConnectionTimeout
                | Self::T3Timeout
                | Self::TransportLevel(_)
                | Self::ProtocolLevel(ProtocolError::T1Timeout | ProtocolError::T3Timeout)
        )
    }

    /// Check if this error is retryable.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout
                | Self::T1Timeout
                | Self::T2Timeout
                | Self::T3Timeout
                | Self::TransportLevel(TransportError::ConnectTimeout)
                | Self::ProtocolLevel(ProtocolError::T1Timeout | ProtocolError::T3Timeout)
        )
    }

    /// Whether this error should be reported to `on_unexpected_message`
    /// rather than tearing down the connection (decoding errors only).
    #[inline]
    pub fn is_non_fatal_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
