//! # Codec Configuration Constants
//!
//! This module centralizes every tunable limit the codec uses. Constants are
//! grouped by functional area and their interdependencies are documented next
//! to the value, so related limits cannot silently drift apart.
//!
//! ## Dependency Notes
//!
//! ```text
//! MAX_NESTING_DEPTH (512)
//!       │
//!       └─> bounds recursion in both Encoder and Decoder. Decode depth is
//!           driven by input bytes, so this is the only guard between a
//!           hostile buffer and stack exhaustion.
//!
//! DEFAULT_DICT_RATIO (0.5)
//!       │
//!       └─> interacts with FIXED_STRING_BUDGET: a string field first tries
//!           the dictionary strategy, then fixed-width padding, then the
//!           offset table. Raising the ratio shifts fields from offset/fixed
//!           into dictionary coding.
//! ```

/// Maximum container nesting depth for both encoding and decoding.
///
/// Recursion depth equals input nesting depth, so this bounds stack usage on
/// adversarial input. Exceeding it raises `DepthLimitExceeded` rather than
/// overflowing the call stack.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Default object-key byte-length limit under `ParseMode::Strict`.
///
/// Matches the 63-character field-name ceiling of the struct-based consumers
/// this format originated with. Keys longer than this raise `KeyTooLong`;
/// the caller re-decodes with `ParseMode::MapFallback` to lift the limit.
pub const DEFAULT_KEY_LENGTH_LIMIT: usize = 63;

/// Default element-count threshold below which compression is skipped.
///
/// Compressing tiny payloads costs more than it saves; at or below this
/// count the payload passes through unchanged and no zip metadata is
/// emitted, so the reader never consults the codec registry.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 100;

/// Default unique/total ratio at or below which a string field uses the
/// dictionary encoding. Must stay in (0, 1].
pub const DEFAULT_DICT_RATIO: f64 = 0.5;

/// Byte budget for the fixed-width string strategy.
///
/// A string field whose longest value fits this budget is zero-padded in
/// place; longer fields fall back to the offset-table strategy. Keep small
/// relative to a typical record width or padding dominates the payload.
pub const FIXED_STRING_BUDGET: usize = 16;

/// Extension type id carrying high-precision number digits (`H` marker).
pub const EXT_BIGNUM: i8 = 0x10;

/// Extension type id of the MessagePack timestamp extension.
pub const EXT_TIMESTAMP: i8 = -1;
