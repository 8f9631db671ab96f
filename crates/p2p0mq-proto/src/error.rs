use thiserror::Error;

/// Errors raised while encoding or decoding a wire frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame has {actual} parts, expected {expected}")]
    WrongPartCount { expected: usize, actual: usize },

    #[error("unknown message kind byte {0:#04x}")]
    UnknownKind(u8),

    #[error("kind field is not exactly one byte (got {0} bytes)")]
    InvalidKindLength(usize),

    #[error("node id shorter than {min} bytes ({actual} bytes)")]
    NodeIdTooShort { min: usize, actual: usize },

    #[error("failed to decode message id: {0}")]
    MessageIdDecode(#[source] rmp_serde::decode::Error),

    #[error("failed to encode message id: {0}")]
    MessageIdEncode(#[source] rmp_serde::encode::Error),

    #[error("failed to decode payload: {0}")]
    PayloadDecode(#[source] rmp_serde::decode::Error),

    #[error("failed to encode payload: {0}")]
    PayloadEncode(#[source] rmp_serde::encode::Error),

    #[error("message failed validation for send: {0}")]
    InvalidForSend(&'static str),
}
