//! Error types produced while decoding or framing BGP messages.

use std::io;

/// Errors produced by the codec and session layers.
///
/// The four protocol-error variants each carry the `(code, subcode, data)`
/// triple RFC4271 assigns to them; [`Error::notification`] extracts that
/// triple so the frame reader / session engine can build a NOTIFICATION
/// message without matching on the variant itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO failure while reading from or writing to the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The 16-byte marker was not the all-ones pattern.
    #[error("message header marker is not all-ones")]
    NotSync,

    /// The header length field was outside `[19, 4096]`.
    #[error("bogus header length {0}")]
    BadLen(u16),

    /// The header type field was not one of OPEN/UPDATE/NOTIFICATION/KEEPALIVE.
    #[error("unknown message type {0}")]
    BadMsg(u8),

    /// A path attribute's flags, length, or value shape was inconsistent.
    #[error("malformed path attribute: {0}")]
    MalformedAttribute(String),

    /// The transport collaborator reported the connection is gone.
    #[error("transport closed")]
    TransportClosed,
}

impl Error {
    /// Returns the RFC4271 `(code, subcode, data)` triple this error should
    /// be reported with, or `None` if the error closes the session silently
    /// (RFC4271's "send_error=false" family).
    pub fn notification(&self) -> Option<(u8, u8, Vec<u8>)> {
        match self {
            Error::NotSync => Some((1, 1, Vec::new())),
            Error::BadLen(len) => Some((1, 2, len.to_be_bytes().to_vec())),
            Error::BadMsg(msg_type) => Some((1, 3, vec![*msg_type])),
            Error::MalformedAttribute(_) => Some((3, 0, Vec::new())),
            Error::Io(_) | Error::TransportClosed => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
