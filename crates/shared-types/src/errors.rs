//! # Error Types
//!
//! Errors for parsing identifiers that arrive as text (query parameters,
//! configuration, CLI).

use thiserror::Error;

/// A hex-encoded 32-byte identifier could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    WrongLength(usize),
}
