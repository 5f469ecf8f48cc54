//! # Codec Error Taxonomy
//!
//! This module defines `CodecError`, the closed set of failure kinds a single
//! encode or decode call can raise. Every kind is fatal to the call that
//! raised it; the caller decides whether to retry with different options
//! (e.g. re-decode with `ParseMode::MapFallback` after `KeyTooLong`, or
//! disable the shape/SOA optimizations on the next encode).
//!
//! ## Error Kinds
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `InvalidFormat` | unexpected byte/marker at a given offset |
//! | `UnexpectedEndOfInput` | the cursor would read past the buffer end |
//! | `UnsupportedType` | marker not valid under the active format variant |
//! | `UnsupportedCompression` | codec name missing from the registry |
//! | `SchemaMismatch` | SOA payload length disagrees with the schema |
//! | `ShapeReconstruction` | shape tag incompatible with declared dims |
//! | `DepthLimitExceeded` | nesting exceeds the configured ceiling |
//! | `KeyTooLong` | object key exceeds the field-name length limit |
//!
//! Errors are raised into `eyre::Report` at the public API boundary so the
//! crate keeps a uniform `eyre::Result` surface; callers that need to match
//! on the kind use `report.downcast_ref::<CodecError>()`.

use thiserror::Error;

/// Failure kinds for a single encode/decode call.
///
/// Offsets are byte positions into the input buffer being decoded (or the
/// output produced so far when encoding); `context` is a short human-readable
/// snippet locating the failure without a debugger.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid format at offset {offset}: {context}")]
    InvalidFormat { offset: usize, context: String },

    #[error("unexpected end of input at offset {offset}: need {needed} more byte(s)")]
    UnexpectedEndOfInput { offset: usize, needed: usize },

    #[error("unsupported type marker 0x{marker:02x} at offset {offset} under {variant}")]
    UnsupportedType {
        marker: u8,
        offset: usize,
        variant: &'static str,
    },

    #[error("unsupported compression method {method:?}")]
    UnsupportedCompression { method: String },

    #[error("schema mismatch: {context}")]
    SchemaMismatch { context: String },

    #[error("shape reconstruction failed: {context}")]
    ShapeReconstruction { context: String },

    #[error("nesting depth {depth} exceeds the configured ceiling")]
    DepthLimitExceeded { depth: usize },

    #[error("object key of {len} bytes at offset {offset} exceeds the {limit}-byte limit")]
    KeyTooLong {
        offset: usize,
        len: usize,
        limit: usize,
    },
}

impl CodecError {
    /// Byte offset associated with the failure, when one applies.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CodecError::InvalidFormat { offset, .. }
            | CodecError::UnexpectedEndOfInput { offset, .. }
            | CodecError::UnsupportedType { offset, .. }
            | CodecError::KeyTooLong { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
