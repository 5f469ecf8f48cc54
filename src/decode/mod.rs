//! # Decoder
//!
//! Cursor-based recursive descent over one input buffer. Every read goes
//! through [`Decoder::read_exact`], so truncation always surfaces as
//! `UnexpectedEndOfInput` carrying the cursor offset and the shortfall.
//!
//! ## Container Forms Accepted
//!
//! | Header | Meaning |
//! |--------|---------|
//! | `[` .. `]` | terminator-delimited list, `N` no-ops skipped |
//! | `[#n` | count-prefixed list |
//! | `[$t#n` / `[$t#[dims]` | typed run → numeric array (ND under BJData) |
//! | `[${` | struct-of-arrays, row-major |
//! | `{` .. `}` | terminator-delimited object |
//! | `{#n` | count-prefixed object |
//! | `{$t#n` | typed-value object, scalar payloads |
//! | `{${` | struct-of-arrays, column-major |
//!
//! An object whose keys include `_ArrayType_` and `_ArraySize_` is not
//! returned as a map: it re-assembles into a [`NumericArray`] through the
//! annotated path (unzip, then shape, then sparse, then complex).

pub mod annotated;
pub mod msgpack;

use crate::config::{CodecOptions, Endian, FormatVariant, ParseMode, EXT_BIGNUM};
use crate::error::CodecError;
use crate::markers::{self, ElemType};
use crate::soa::{self, schema::Layout};
use crate::value::{read_elem_i64, Dims, Ext, NumericArray, Value};
use eyre::Result;
use hashbrown::HashSet;
use smallvec::smallvec;
use tracing::trace;

/// Deserializes one value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed; trailing bytes are
/// the caller's concern (streams concatenate top-level values).
pub fn decode(bytes: &[u8], opts: &CodecOptions) -> Result<(Value, usize)> {
    let mut dec = Decoder::new(bytes, opts);
    let value = match opts.variant {
        FormatVariant::MessagePack => msgpack::parse_value(&mut dec, 0)?,
        _ => dec.parse_value(0)?,
    };
    Ok((value, dec.pos))
}

/// Cursor over one input buffer plus the active options.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    opts: &'a CodecOptions,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8], opts: &'a CodecOptions) -> Self {
        Self { buf, pos: 0, opts }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn opts(&self) -> &CodecOptions {
        self.opts
    }

    fn eof(&self, needed: usize) -> eyre::Report {
        CodecError::UnexpectedEndOfInput {
            offset: self.pos,
            needed,
        }
        .into()
    }

    pub(crate) fn invalid(&self, offset: usize, context: impl Into<String>) -> eyre::Report {
        CodecError::InvalidFormat {
            offset,
            context: context.into(),
        }
        .into()
    }

    pub(crate) fn peek(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or_else(|| self.eof(1))
    }

    pub(crate) fn take(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(self.eof(n - (self.buf.len() - self.pos)));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// One element payload, returned in canonical little-endian order.
    pub(crate) fn read_elem_le(&mut self, width: usize) -> Result<[u8; 8]> {
        let mut le = [0u8; 8];
        le[..width].copy_from_slice(self.read_exact(width)?);
        if self.opts.endian == Endian::Big {
            le[..width].reverse();
        }
        Ok(le)
    }

    /// `n` elements of `width` bytes, unswapped into canonical order.
    pub(crate) fn read_run_le(&mut self, n: usize, width: usize) -> Result<Vec<u8>> {
        let mut bytes = self.read_exact(n.checked_mul(width).ok_or_else(|| {
            self.invalid(self.pos, "element run length overflows")
        })?)?
        .to_vec();
        if self.opts.endian == Endian::Big {
            markers::swap_elements(&mut bytes, width);
        }
        Ok(bytes)
    }

    /// Integer scalar payload for a known element type.
    pub(crate) fn read_int(&mut self, elem: ElemType) -> Result<i64> {
        let at = self.pos;
        let le = self.read_elem_le(elem.width())?;
        read_elem_i64(&le[..elem.width()], elem)
            .ok_or_else(|| self.invalid(at, format!("{} is not an integer type", elem.name())))
    }

    /// Length/count field: integer marker + payload, non-negative.
    pub(crate) fn read_length(&mut self) -> Result<usize> {
        let at = self.pos;
        let marker = self.take()?;
        let elem = markers::elem_for(marker, self.opts.variant, at)?;
        if !elem.is_integer() {
            return Err(self.invalid(at, format!("length marker {} is not an integer", elem.name())));
        }
        if elem == ElemType::Uint64 {
            let le = self.read_elem_le(8)?;
            let v = u64::from_le_bytes(le);
            return usize::try_from(v).map_err(|_| self.invalid(at, "length exceeds usize"));
        }
        let v = self.read_int(elem)?;
        if v < 0 {
            return Err(self.invalid(at, format!("negative length {v}")));
        }
        Ok(v as usize)
    }

    /// Object key: length prefix + raw bytes. `KeyTooLong` under strict
    /// mode signals the caller to retry with `ParseMode::MapFallback`.
    pub(crate) fn read_key(&mut self) -> Result<String> {
        let at = self.pos;
        let len = self.read_length()?;
        if self.opts.parse_mode == ParseMode::Strict && len > self.opts.key_length_limit {
            return Err(CodecError::KeyTooLong {
                offset: at,
                len,
                limit: self.opts.key_length_limit,
            }
            .into());
        }
        let bytes = self.read_exact(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| self.invalid(at, "object key is not valid UTF-8"))
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.opts.max_depth {
            return Err(CodecError::DepthLimitExceeded { depth }.into());
        }
        Ok(())
    }

    pub(crate) fn parse_value(&mut self, depth: usize) -> Result<Value> {
        self.check_depth(depth)?;
        let at = self.pos;
        let mut marker = self.take()?;
        while marker == markers::MARKER_NOOP {
            marker = self.take()?;
        }
        match marker {
            markers::MARKER_NULL => Ok(Value::Null),
            markers::MARKER_TRUE => Ok(Value::Bool(true)),
            markers::MARKER_FALSE => Ok(Value::Bool(false)),
            b'C' => {
                let c = self.take()?;
                if !c.is_ascii() {
                    return Err(self.invalid(at, "char payload is not ASCII"));
                }
                Ok(Value::Str((c as char).to_string()))
            }
            markers::MARKER_STR => {
                let len = self.read_length()?;
                let bytes = self.read_exact(len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Value::Str)
                    .map_err(|_| self.invalid(at, "string payload is not valid UTF-8"))
            }
            markers::MARKER_HIPREC => {
                let len = self.read_length()?;
                let data = self.read_exact(len)?.to_vec();
                Ok(Value::Ext(Ext {
                    type_id: EXT_BIGNUM,
                    data,
                }))
            }
            markers::MARKER_ARRAY_OPEN => self.parse_array(depth),
            markers::MARKER_OBJECT_OPEN => self.parse_object(depth),
            _ => {
                let elem = markers::elem_for(marker, self.opts.variant, at)?;
                self.scalar_for(elem)
            }
        }
    }

    /// Scalar payload for an already-resolved element type.
    fn scalar_for(&mut self, elem: ElemType) -> Result<Value> {
        match elem {
            ElemType::Half => {
                let le = self.read_elem_le(2)?;
                Ok(Value::Half(u16::from_le_bytes([le[0], le[1]])))
            }
            ElemType::Float32 => {
                let le = self.read_elem_le(4)?;
                Ok(Value::Float(
                    f32::from_le_bytes([le[0], le[1], le[2], le[3]]) as f64,
                ))
            }
            ElemType::Float64 => {
                let le = self.read_elem_le(8)?;
                Ok(Value::Float(f64::from_le_bytes(le)))
            }
            ElemType::Uint64 => {
                let le = self.read_elem_le(8)?;
                let v = u64::from_le_bytes(le);
                if v > i64::MAX as u64 {
                    Ok(Value::UInt(v))
                } else {
                    Ok(Value::Int(v as i64))
                }
            }
            ElemType::Char => {
                let at = self.pos;
                let c = self.take()?;
                if !c.is_ascii() {
                    return Err(self.invalid(at, "char payload is not ASCII"));
                }
                Ok(Value::Str((c as char).to_string()))
            }
            _ => self.read_int(elem).map(Value::Int),
        }
    }

    /// Cursor sits just past `[`.
    fn parse_array(&mut self, depth: usize) -> Result<Value> {
        match self.peek()? {
            markers::MARKER_TYPE => {
                self.pos += 1;
                if self.peek()? == markers::MARKER_OBJECT_OPEN {
                    return self.parse_soa(Layout::RowMajor, depth);
                }
                let at = self.pos;
                let marker = self.take()?;
                let elem = markers::elem_for(marker, self.opts.variant, at)?;
                self.expect(markers::MARKER_COUNT)?;
                let dims = self.read_dims()?;
                self.parse_typed_run(elem, dims)
            }
            markers::MARKER_COUNT => {
                self.pos += 1;
                let count = self.read_length()?;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.parse_value(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            _ => {
                let mut items = Vec::new();
                loop {
                    match self.peek()? {
                        markers::MARKER_ARRAY_CLOSE => {
                            self.pos += 1;
                            return Ok(Value::List(items));
                        }
                        markers::MARKER_NOOP => self.pos += 1,
                        _ => items.push(self.parse_value(depth + 1)?),
                    }
                }
            }
        }
    }

    /// `#` then either one count or a BJData `[dims]` list.
    pub(crate) fn read_dims(&mut self) -> Result<Dims> {
        if self.peek()? == markers::MARKER_ARRAY_OPEN {
            let at = self.pos;
            if self.opts.variant != FormatVariant::BjData {
                return Err(self.invalid(at, "ND typed-run headers are BJData-only"));
            }
            self.pos += 1;
            let mut dims = Dims::new();
            while self.peek()? != markers::MARKER_ARRAY_CLOSE {
                dims.push(self.read_length()?);
            }
            self.pos += 1;
            if dims.is_empty() {
                return Err(self.invalid(at, "empty dimension list"));
            }
            Ok(dims)
        } else {
            Ok(smallvec![self.read_length()?])
        }
    }

    fn parse_typed_run(&mut self, elem: ElemType, dims: Dims) -> Result<Value> {
        let count: usize = dims.iter().product();
        let bytes = self.read_run_le(count, elem.width())?;
        if elem == ElemType::Char {
            // char runs are strings stored element-wise
            let at = self.pos - count;
            return String::from_utf8(bytes)
                .map(Value::Str)
                .map_err(|_| self.invalid(at, "char run is not valid UTF-8"));
        }
        trace!(elem = elem.name(), ?dims, "typed run decoded");
        Ok(Value::Array(NumericArray::dense(elem, dims, bytes)))
    }

    /// Cursor sits just past `{`.
    fn parse_object(&mut self, depth: usize) -> Result<Value> {
        let at = self.pos - 1;
        let mut pairs: Vec<(String, Value)> = Vec::new();
        match self.peek()? {
            markers::MARKER_TYPE => {
                self.pos += 1;
                if self.peek()? == markers::MARKER_OBJECT_OPEN {
                    return self.parse_soa(Layout::ColumnMajor, depth);
                }
                // typed-value object: every value is one scalar of `elem`
                let m_at = self.pos;
                let marker = self.take()?;
                let elem = markers::elem_for(marker, self.opts.variant, m_at)?;
                self.expect(markers::MARKER_COUNT)?;
                let count = self.read_length()?;
                for _ in 0..count {
                    let key = self.read_key()?;
                    let value = self.scalar_for(elem)?;
                    pairs.push((key, value));
                }
            }
            markers::MARKER_COUNT => {
                self.pos += 1;
                let count = self.read_length()?;
                for _ in 0..count {
                    let key = self.read_key()?;
                    pairs.push((key, self.parse_value(depth + 1)?));
                }
            }
            _ => loop {
                match self.peek()? {
                    markers::MARKER_OBJECT_CLOSE => {
                        self.pos += 1;
                        break;
                    }
                    markers::MARKER_NOOP => self.pos += 1,
                    _ => {
                        let key = self.read_key()?;
                        pairs.push((key, self.parse_value(depth + 1)?));
                    }
                }
            },
        }
        {
            let mut seen = HashSet::with_capacity(pairs.len());
            for (k, _) in &pairs {
                if !seen.insert(k.as_str()) {
                    return Err(self.invalid(at, format!("duplicate object key {k:?}")));
                }
            }
        }
        annotated::finish_object(self, pairs)
    }

    fn parse_soa(&mut self, layout: Layout, depth: usize) -> Result<Value> {
        let records = soa::decode::decode_records(self, layout, depth)?;
        if self.opts.expand_records {
            soa::decode::expand(&records)
        } else {
            Ok(Value::Records(records))
        }
    }

    pub(crate) fn expect(&mut self, marker: u8) -> Result<()> {
        let at = self.pos;
        let got = self.take()?;
        if got != marker {
            return Err(self.invalid(
                at,
                format!("expected {:?}, found 0x{got:02x}", marker as char),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecOptions;

    fn opts() -> CodecOptions {
        CodecOptions::default()
    }

    #[test]
    fn scalars_decode_with_consumed_count() {
        let o = opts();
        let (v, used) = decode(b"Z", &o).unwrap();
        assert_eq!(v, Value::Null);
        assert_eq!(used, 1);
        let (v, used) = decode(b"i\x05extra", &o).unwrap();
        assert_eq!(v, Value::Int(5));
        assert_eq!(used, 2);
    }

    #[test]
    fn terminator_containers_skip_noops() {
        let o = opts();
        let (v, _) = decode(b"[NTNF]", &o).unwrap();
        assert_eq!(v, Value::List(vec![Value::Bool(true), Value::Bool(false)]));
    }

    #[test]
    fn count_prefixed_object_decodes() {
        let o = opts();
        let (v, _) = decode(b"{#U\x01U\x01aT", &o).unwrap();
        assert_eq!(v, Value::map(vec![("a", Value::Bool(true))]));
    }

    #[test]
    fn typed_value_object_reads_scalar_run() {
        let o = opts();
        let (v, _) = decode(b"{$i#U\x02U\x01x\x07U\x01y\xfe", &o).unwrap();
        assert_eq!(
            v,
            Value::map(vec![("x", Value::Int(7)), ("y", Value::Int(-2))])
        );
    }

    #[test]
    fn truncated_payload_reports_offset_and_shortfall() {
        let o = opts();
        let err = decode(b"l\x01\x02", &o).unwrap_err();
        match err.downcast_ref::<CodecError>() {
            Some(CodecError::UnexpectedEndOfInput { offset, needed }) => {
                assert_eq!(*offset, 1);
                assert_eq!(*needed, 2);
            }
            other => panic!("expected UnexpectedEndOfInput, got {other:?}"),
        }
    }

    #[test]
    fn over_long_key_fails_strict_then_parses_in_fallback() {
        let mut o = opts();
        o.key_length_limit = 3;
        let input = b"{U\x04longT}";
        let err = decode(input, &o).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::KeyTooLong { len: 4, limit: 3, .. })
        ));
        o.parse_mode = ParseMode::MapFallback;
        let (v, _) = decode(input, &o).unwrap();
        assert_eq!(v, Value::map(vec![("long", Value::Bool(true))]));
    }

    #[test]
    fn depth_ceiling_stops_runaway_nesting() {
        let mut o = opts();
        o.max_depth = 8;
        let input = vec![b'['; 64];
        let err = decode(&input, &o).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::DepthLimitExceeded { .. })
        ));
    }

    #[test]
    fn typed_char_values_must_be_ascii() {
        let o = opts();
        let err = decode(b"{$C#U\x01U\x01a\xff", &o).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_invalid() {
        let o = opts();
        let err = decode(b"{U\x01aTU\x01aF}", &o).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::InvalidFormat { .. })
        ));
    }
}
