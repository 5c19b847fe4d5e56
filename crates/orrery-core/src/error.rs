//! Error types for the ORRERY protocol

use thiserror::Error;

/// Core ORRERY errors
#[derive(Error, Debug)]
pub enum OrreryError {
    // Wire errors
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unknown control subtype: {0}")]
    UnknownSubtype(u8),

    // Security errors
    #[error("Message authentication failed")]
    AuthenticationFailed,

    #[error("Handshake rejected: no matching peer")]
    HandshakeRejected,

    #[error("Pending key expired")]
    KeyExpired,

    #[error("Peer validity region expired")]
    PeerExpired,

    // Runtime errors
    #[error("Startup timed out before space-time synchronization")]
    StartupTimeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node is shutting down")]
    Shutdown,
}

/// Result type for ORRERY operations
pub type OrreryResult<T> = Result<T, OrreryError>;
