//! Error types shared by every chatflow layer.
//!
//! Framework-level errors (registry, buttons, dispatch) live in
//! `chatflow-framework`; only errors that the wire types and the token codec can
//! raise are defined here.

use thiserror::Error;

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors produced by the zero-width token codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The token contained a character outside the two-symbol alphabet,
    /// was empty, or encoded more bits than fit into a `u64`.
    #[error("malformed callback token: {reason}")]
    MalformedToken {
        /// Why the token was rejected.
        reason: &'static str,
    },
}

impl CodecError {
    pub(crate) fn malformed(reason: &'static str) -> Self {
        Self::MalformedToken { reason }
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that a [`Transport`](crate::Transport) implementation may report.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The remote API rejected the request.
    #[error("request rejected by remote API: {0}")]
    Rejected(String),

    /// The request could not be delivered.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The send was cancelled before it completed.
    #[error("send cancelled")]
    Cancelled,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
