//! # Codec Configuration
//!
//! One immutable [`CodecOptions`] struct is threaded by reference into every
//! encoder, decoder and codec entry point. There is no ambient mutable
//! configuration anywhere in the crate, which is what makes concurrent
//! encode/decode calls on independent inputs coordination-free.
//!
//! ## Option Groups
//!
//! | Group | Fields |
//! |-------|--------|
//! | Wire dialect | `variant`, `endian` |
//! | Compression | `compression`, `compress_threshold` |
//! | Optimizations | `use_shape`, `use_soa`, `dict_ratio` |
//! | Decoding | `parse_mode`, `key_length_limit`, `expand_records` |
//! | Safety | `max_depth` |

pub mod constants;
pub use constants::*;

/// Wire-format dialect the codec speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVariant {
    /// BJData draft 2: UBJSON plus `u`/`m`/`M`/`h` markers and ND-array
    /// headers, little-endian by default.
    BjData,
    /// UBJSON draft 12, big-endian by default.
    Ubjson,
    /// MessagePack: range-encoded tags, always big-endian.
    MessagePack,
}

impl FormatVariant {
    /// Short name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            FormatVariant::BjData => "bjdata",
            FormatVariant::Ubjson => "ubjson",
            FormatVariant::MessagePack => "messagepack",
        }
    }

    /// Endianness the dialect specifies by default.
    pub fn default_endian(self) -> Endian {
        match self {
            FormatVariant::BjData => Endian::Little,
            FormatVariant::Ubjson | FormatVariant::MessagePack => Endian::Big,
        }
    }
}

/// Byte order applied to every multi-byte field on the wire.
///
/// MessagePack ignores this and is always big-endian per its spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// How the decoder treats object keys that exceed the length limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Keys longer than `key_length_limit` raise `CodecError::KeyTooLong`,
    /// signalling the caller to retry with `MapFallback`.
    #[default]
    Strict,
    /// Objects parse as plain maps with no key-length limit.
    MapFallback,
}

/// Immutable option bag passed by reference into every codec entry point.
#[derive(Debug, Clone)]
pub struct CodecOptions {
    pub variant: FormatVariant,
    pub endian: Endian,
    /// Registered compression method applied to numeric payloads, or `None`.
    pub compression: Option<String>,
    /// Element-count gate: payloads with at most this many elements are
    /// never compressed.
    pub compress_threshold: usize,
    /// Try the matrix shape codec on eligible 2-D dense arrays.
    pub use_shape: bool,
    /// Try the struct-of-arrays codec on homogeneous record lists.
    pub use_soa: bool,
    /// Flatten all-one-primitive-type lists into typed runs. Off by
    /// default: a packed list decodes as a numeric array, not a list.
    pub pack_lists: bool,
    /// unique/total ratio at or below which string fields dictionary-code.
    pub dict_ratio: f64,
    /// Object-key byte limit under `ParseMode::Strict`.
    pub key_length_limit: usize,
    /// Hard ceiling on container nesting, both directions.
    pub max_depth: usize,
    pub parse_mode: ParseMode,
    /// Expand decoded SOA containers back into a list of maps. When false
    /// the decoder returns `Value::Records` untouched.
    pub expand_records: bool,
}

impl CodecOptions {
    /// Options for a dialect, with that dialect's default endianness.
    pub fn for_variant(variant: FormatVariant) -> Self {
        Self {
            variant,
            endian: variant.default_endian(),
            compression: None,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            use_shape: false,
            use_soa: false,
            pack_lists: false,
            dict_ratio: DEFAULT_DICT_RATIO,
            key_length_limit: DEFAULT_KEY_LENGTH_LIMIT,
            max_depth: MAX_NESTING_DEPTH,
            parse_mode: ParseMode::Strict,
            expand_records: true,
        }
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::for_variant(FormatVariant::BjData)
    }
}
