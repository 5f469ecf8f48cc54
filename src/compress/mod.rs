//! # Pluggable Compression Adapter
//!
//! A name-keyed registry of `(encode, decode)` byte-transform pairs. The
//! registry is the only process-wide state in the crate: it is populated
//! with the builtin codecs on first touch and thereafter effectively
//! read-only, so concurrent encode/decode calls share it without contention.
//!
//! Compression is the outermost transform on write and the first one undone
//! on read: it always operates on the fully serialized numeric payload
//! (after shape/sparse packing).
//!
//! ## Builtin Codecs
//!
//! | Name | Backing |
//! |------|---------|
//! | `zlib` | flate2, zlib framing |
//! | `gzip` | flate2, gzip framing |
//! | `lz4` | lz4_flex, size-prepended block |

use crate::error::CodecError;
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::io::Write;
use std::sync::LazyLock;
use tracing::debug;

/// A byte transform. Both directions of a codec use this signature.
pub type TransformFn = fn(&[u8]) -> Result<Vec<u8>>;

struct CodecPair {
    encode: TransformFn,
    decode: TransformFn,
}

static REGISTRY: LazyLock<RwLock<HashMap<String, CodecPair>>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "zlib".to_string(),
        CodecPair {
            encode: zlib_encode,
            decode: zlib_decode,
        },
    );
    map.insert(
        "gzip".to_string(),
        CodecPair {
            encode: gzip_encode,
            decode: gzip_decode,
        },
    );
    map.insert(
        "lz4".to_string(),
        CodecPair {
            encode: lz4_encode,
            decode: lz4_decode,
        },
    );
    RwLock::new(map)
});

/// Registers (or replaces) a codec under `name`. Intended for startup only;
/// the registry is read-only for the lifetime of encode/decode traffic.
pub fn register(name: &str, encode: TransformFn, decode: TransformFn) {
    REGISTRY
        .write()
        .insert(name.to_string(), CodecPair { encode, decode });
}

/// True if `name` resolves to a registered codec.
pub fn is_registered(name: &str) -> bool {
    REGISTRY.read().contains_key(name)
}

/// Compresses `bytes` with `method` when `elem_count` exceeds `threshold`.
///
/// Returns `None` when the gate keeps the payload uncompressed, in which
/// case the caller omits the zip metadata entirely. An unregistered method
/// is an error even when the gate would have skipped it, so a typo never
/// silently produces uncompressed output.
pub fn maybe_compress(
    bytes: &[u8],
    method: &str,
    threshold: usize,
    elem_count: usize,
) -> Result<Option<Vec<u8>>> {
    let registry = REGISTRY.read();
    let pair = registry
        .get(method)
        .ok_or_else(|| CodecError::UnsupportedCompression {
            method: method.to_string(),
        })?;
    if elem_count <= threshold {
        debug!(method, elem_count, threshold, "compression gated off");
        return Ok(None);
    }
    (pair.encode)(bytes).map(Some)
}

/// Reverses `method` on `bytes`. Unknown names are a fatal
/// `UnsupportedCompression`, never a silent pass-through.
pub fn decompress(bytes: &[u8], method: &str) -> Result<Vec<u8>> {
    let registry = REGISTRY.read();
    let pair = registry
        .get(method)
        .ok_or_else(|| CodecError::UnsupportedCompression {
            method: method.to_string(),
        })?;
    (pair.decode)(bytes)
}

fn zlib_encode(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

fn zlib_decode(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut dec = flate2::write::ZlibDecoder::new(Vec::new());
    dec.write_all(bytes)?;
    Ok(dec.finish()?)
}

fn gzip_encode(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

fn gzip_decode(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut dec = flate2::write::GzDecoder::new(Vec::new());
    dec.write_all(bytes)?;
    Ok(dec.finish()?)
}

fn lz4_encode(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(bytes))
}

fn lz4_decode(bytes: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(bytes).map_err(|e| eyre::eyre!("lz4: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_codecs_round_trip() {
        let payload: Vec<u8> = (0..4096u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        for method in ["zlib", "gzip", "lz4"] {
            let packed = maybe_compress(&payload, method, 100, 4096).unwrap().unwrap();
            assert_ne!(packed, payload);
            assert_eq!(decompress(&packed, method).unwrap(), payload);
        }
    }

    #[test]
    fn threshold_gates_small_payloads() {
        let payload = vec![7u8; 50];
        let out = maybe_compress(&payload, "zlib", 100, 50).unwrap();
        assert!(out.is_none());
        // boundary: strictly-greater-than opens the gate
        let out = maybe_compress(&payload, "zlib", 50, 50).unwrap();
        assert!(out.is_none());
        let out = maybe_compress(&payload, "zlib", 49, 50).unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn unknown_method_is_fatal_both_directions() {
        let err = decompress(&[1, 2, 3], "snappy").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::UnsupportedCompression { method }) if method == "snappy"
        ));
        let err = maybe_compress(&[1, 2, 3], "snappy", 100, 3).unwrap_err();
        assert!(err.downcast_ref::<CodecError>().is_some());
    }

    #[test]
    fn custom_codec_registration_dispatches_by_name() {
        fn xor_ff(b: &[u8]) -> Result<Vec<u8>> {
            Ok(b.iter().map(|x| x ^ 0xff).collect())
        }
        register("xor", xor_ff, xor_ff);
        assert!(is_registered("xor"));
        let packed = maybe_compress(&[0x00, 0x0f], "xor", 0, 2).unwrap().unwrap();
        assert_eq!(packed, vec![0xff, 0xf0]);
        assert_eq!(decompress(&packed, "xor").unwrap(), vec![0x00, 0x0f]);
    }
}
