//! # Shared Value Model
//!
//! `Value` is the single annotated tree both codec directions speak: the
//! encoder consumes one, the decoder produces one. Ownership is strictly
//! tree-shaped (no cycles, no shared mutable nodes) because the wire format
//! itself cannot express aliasing.
//!
//! ## Variants
//!
//! | Variant | Wire form |
//! |---------|-----------|
//! | Null / Bool | `Z` / `T` / `F` (nil, true, false under MessagePack) |
//! | Int / UInt | narrowest covering integer marker |
//! | Float | `D`, downcast to `d` when exactly representable |
//! | Half | raw binary16 bits, `h` under BJData |
//! | Str | `S` + length-prefixed bytes, or single-byte `C` |
//! | Binary | `bin` under MessagePack, `[$U#` run otherwise |
//! | List / Map | container headers, optionally count/type optimized |
//! | Array | typed ND run or annotated-object form |
//! | Records | SOA header + schema + deferred blocks + fixed payload |
//! | Ext | `H` (bignum) or MessagePack ext family |
//!
//! ## Numeric Payload Convention
//!
//! `NumericArray` payloads are canonical little-endian byte runs, row-major,
//! with complex data stored as a real plane followed by an imaginary plane.
//! The one endianness conversion point is `markers::swap_elements`, applied
//! at emission/reading time only.

use crate::markers::ElemType;
use crate::soa::schema::SoaRecords;
use smallvec::SmallVec;
use zerocopy::little_endian::{F64 as F64le, I64 as I64le};
use zerocopy::IntoBytes;

/// Dimension vector, row-major. Inline up to 4 dims.
pub type Dims = SmallVec<[usize; 4]>;

/// Extension payload for types outside the core model (high-precision
/// numbers, MessagePack timestamps and application ext types).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ext {
    pub type_id: i8,
    pub data: Vec<u8>,
}

/// The annotated value tree shared by encoder and decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Only produced for magnitudes above `i64::MAX`.
    UInt(u64),
    Float(f64),
    /// Raw IEEE binary16 bits, carried without arithmetic.
    Half(u16),
    Str(String),
    Binary(Vec<u8>),
    List(Vec<Value>),
    /// Ordered key/value pairs, keys unique.
    Map(Vec<(String, Value)>),
    Array(NumericArray),
    Records(SoaRecords),
    Ext(Ext),
}

impl Value {
    pub fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Sparse payload: index runs first, then the value run. One index run for
/// vectors, two (rows then columns) for general 2-D. Indices are 0-based.
/// Complex sparse values interleave re/im per nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseData {
    pub rows: Vec<u64>,
    /// Present for 2-D sparse matrices, absent for sparse vectors.
    pub cols: Option<Vec<u64>>,
    /// `nnz * width` bytes, doubled when complex, canonical little-endian.
    pub values: Vec<u8>,
}

impl SparseData {
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }
}

/// N-D numeric array with its wire annotations.
///
/// Dense payloads live in `data` (row-major, little-endian, real plane then
/// imaginary plane when `complex`); sparse payloads live in `sparse` and
/// `data` stays empty. Shape compaction and compression are wire-level
/// transforms chosen at encode time; a decoded array is always expanded
/// back to this dense/sparse form.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub elem: ElemType,
    pub dims: Dims,
    pub complex: bool,
    pub sparse: Option<SparseData>,
    pub data: Vec<u8>,
}

impl NumericArray {
    pub fn dense(elem: ElemType, dims: Dims, data: Vec<u8>) -> Self {
        Self {
            elem,
            dims,
            complex: false,
            sparse: None,
            data,
        }
    }

    /// Dense f64 array from logical values, row-major.
    pub fn from_f64s(dims: &[usize], values: &[f64]) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), values.len());
        let le: Vec<F64le> = values.iter().map(|&v| F64le::new(v)).collect();
        Self::dense(
            ElemType::Float64,
            Dims::from_slice(dims),
            le.as_bytes().to_vec(),
        )
    }

    /// Dense i64 array from logical values, row-major.
    pub fn from_i64s(dims: &[usize], values: &[i64]) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), values.len());
        let le: Vec<I64le> = values.iter().map(|&v| I64le::new(v)).collect();
        Self::dense(
            ElemType::Int64,
            Dims::from_slice(dims),
            le.as_bytes().to_vec(),
        )
    }

    /// Logical element count implied by the dims (complex counts once).
    pub fn elem_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Byte length of one dense plane.
    pub fn plane_len(&self) -> usize {
        self.elem_count() * self.elem.width()
    }

    /// Real plane of a dense payload.
    pub fn real_plane(&self) -> &[u8] {
        &self.data[..self.plane_len()]
    }

    /// Imaginary plane of a dense complex payload, if present.
    pub fn imag_plane(&self) -> Option<&[u8]> {
        if self.complex {
            Some(&self.data[self.plane_len()..2 * self.plane_len()])
        } else {
            None
        }
    }

    /// Reads dense elements back as f64, for tests and expansion.
    pub fn to_f64s(&self) -> Vec<f64> {
        let w = self.elem.width();
        self.real_plane()
            .chunks_exact(w)
            .map(|c| read_elem_f64(c, self.elem))
            .collect()
    }
}

/// Interprets one little-endian element as f64 (integers convert exactly
/// within f64's 53-bit mantissa; wider values are test-only concerns).
pub fn read_elem_f64(le: &[u8], elem: ElemType) -> f64 {
    read_elem_i64(le, elem)
        .map(|i| i as f64)
        .unwrap_or_else(|| match elem {
            ElemType::Half => crate::markers::half_to_f32(u16::from_le_bytes([le[0], le[1]])) as f64,
            ElemType::Float32 => f32::from_le_bytes([le[0], le[1], le[2], le[3]]) as f64,
            ElemType::Float64 => f64::from_le_bytes(le.try_into().unwrap_or_default()),
            _ => unreachable!(),
        })
}

/// Interprets one little-endian element as i64, or `None` for floats.
pub fn read_elem_i64(le: &[u8], elem: ElemType) -> Option<i64> {
    Some(match elem {
        ElemType::Int8 => le[0] as i8 as i64,
        ElemType::Uint8 | ElemType::Char => le[0] as i64,
        ElemType::Int16 => i16::from_le_bytes([le[0], le[1]]) as i64,
        ElemType::Uint16 => u16::from_le_bytes([le[0], le[1]]) as i64,
        ElemType::Int32 => i32::from_le_bytes([le[0], le[1], le[2], le[3]]) as i64,
        ElemType::Uint32 => u32::from_le_bytes([le[0], le[1], le[2], le[3]]) as i64,
        ElemType::Int64 => i64::from_le_bytes(le.try_into().ok()?),
        ElemType::Uint64 => u64::from_le_bytes(le.try_into().ok()?) as i64,
        ElemType::Half | ElemType::Float32 | ElemType::Float64 => return None,
    })
}

/// Writes one element as little-endian bytes from an i64 source value.
pub fn write_elem_i64(value: i64, elem: ElemType, out: &mut Vec<u8>) {
    match elem {
        ElemType::Int8 => out.push(value as i8 as u8),
        ElemType::Uint8 | ElemType::Char => out.push(value as u8),
        ElemType::Int16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        ElemType::Uint16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        ElemType::Int32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
        ElemType::Uint32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        ElemType::Int64 => out.extend_from_slice(&value.to_le_bytes()),
        ElemType::Uint64 => out.extend_from_slice(&(value as u64).to_le_bytes()),
        ElemType::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
        ElemType::Float64 => out.extend_from_slice(&(value as f64).to_le_bytes()),
        ElemType::Half => unreachable!("half is never an inference target"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn dense_f64_round_trips_through_planes() {
        let arr = NumericArray::from_f64s(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(arr.elem_count(), 4);
        assert_eq!(arr.plane_len(), 32);
        assert_eq!(arr.to_f64s(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(arr.imag_plane().is_none());
    }

    #[test]
    fn complex_payload_splits_into_two_planes() {
        let mut arr = NumericArray::from_f64s(&[2], &[1.0, 2.0]);
        let imag = NumericArray::from_f64s(&[2], &[-1.0, -2.0]);
        arr.data.extend_from_slice(&imag.data);
        arr.complex = true;
        assert_eq!(arr.real_plane().len(), 16);
        assert_eq!(arr.imag_plane().unwrap().len(), 16);
    }

    #[test]
    fn elem_readback_sign_extends() {
        let mut buf = Vec::new();
        write_elem_i64(-5, ElemType::Int16, &mut buf);
        assert_eq!(read_elem_i64(&buf, ElemType::Int16), Some(-5));
        assert_eq!(read_elem_f64(&buf, ElemType::Int16), -5.0);
    }

    #[test]
    fn sparse_tracks_nnz_from_row_run() {
        let s = SparseData {
            rows: vec![0, 3, 4],
            cols: Some(vec![1, 1, 2]),
            values: vec![0; 24],
        };
        assert_eq!(s.nnz(), 3);
        let _arr = NumericArray {
            elem: ElemType::Float64,
            dims: smallvec![5, 5],
            complex: false,
            sparse: Some(s),
            data: Vec::new(),
        };
    }
}
