//! # bjcodec
//!
//! Binary data-interchange codec for the BJData draft 2, UBJSON draft 12 and
//! MessagePack wire formats: one annotated [`Value`] tree in, bytes out, and
//! back again losslessly.
//!
//! ## Architecture
//!
//! ```text
//!             ┌─────────┐        ┌─────────┐
//!   Value ───►│ encode  │───────►│  bytes  │
//!     ▲       └────┬────┘        └────┬────┘
//!     │            │                  │
//!     │       ┌────▼────┐        ┌────▼────┐
//!     │       │  shape  │        │ decode  │──► Value
//!     │       │   soa   │        └────┬────┘
//!     │       │compress │             │
//!     │       └────┬────┘        undo order:
//!     │            │             unzip → shape → sparse → complex
//!     └────────────┴─ markers (one marker table, one byte-swap routine)
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | immutable [`CodecOptions`], tunable limits |
//! | [`error`] | [`CodecError`] taxonomy with byte offsets |
//! | [`markers`] | marker↔type tables, width minimization, byte swap |
//! | [`value`] | shared [`Value`] / [`NumericArray`] model |
//! | [`shape`] | matrix shape compaction (diag/triangular/banded/toeplitz) |
//! | [`soa`] | struct-of-arrays record codec |
//! | [`compress`] | pluggable compression registry, threshold gating |
//! | [`encode`] / [`decode`] | the two recursive-descent directions |
//!
//! ## Example
//!
//! ```
//! use bjcodec::{decode, encode, CodecOptions, Value};
//!
//! let opts = CodecOptions::default();
//! let value = Value::map(vec![("answer", Value::Int(42))]);
//! let bytes = encode(&value, &opts)?;
//! let (back, _used) = decode(&bytes, &opts)?;
//! assert_eq!(back, value);
//! # eyre::Ok(())
//! ```

pub mod compress;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod markers;
pub mod shape;
pub mod soa;
pub mod value;

pub use config::{CodecOptions, Endian, FormatVariant, ParseMode};
pub use decode::decode;
pub use encode::encode;
pub use error::CodecError;
pub use markers::ElemType;
pub use soa::schema::{Layout, SoaRecords, SoaSchema};
pub use value::{Dims, Ext, NumericArray, SparseData, Value};

use eyre::Result;

/// Encodes then immediately decodes under the same options. Test and
/// sanity-check helper; the decoded value plus consumed byte count.
pub fn roundtrip(value: &Value, opts: &CodecOptions) -> Result<(Value, usize)> {
    let bytes = encode(value, opts)?;
    decode(&bytes, opts)
}
