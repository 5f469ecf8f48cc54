//! # Type Marker Table
//!
//! Static mapping between one-byte markers and element types, parameterized
//! by the active [`FormatVariant`]. Three independent tables exist:
//!
//! | Variant | Markers |
//! |---------|---------|
//! | UBJSON draft 12 | `i U I l L d D C` + `Z N T F S H [ ] { } $ #` |
//! | BJData draft 2 | UBJSON plus `u m M h` (u16/u32/u64/f16) |
//! | MessagePack | range-encoded tags, see [`msgpack`] |
//!
//! Marker→type lookup is O(1) through 256-entry arrays built at compile
//! time; type-name→type lookup (used by the annotated-array `_ArrayType_`
//! field) goes through a static `phf` map.
//!
//! The single element byte-swap routine [`swap_elements`] also lives here:
//! every multi-byte field in the crate is swapped through it at the moment
//! of emission or reading, never ad hoc.

pub mod msgpack;

use crate::config::FormatVariant;
use crate::error::CodecError;
use eyre::Result;

// Structural markers shared by BJData and UBJSON.
pub const MARKER_NULL: u8 = b'Z';
pub const MARKER_NOOP: u8 = b'N';
pub const MARKER_TRUE: u8 = b'T';
pub const MARKER_FALSE: u8 = b'F';
pub const MARKER_STR: u8 = b'S';
pub const MARKER_HIPREC: u8 = b'H';
pub const MARKER_ARRAY_OPEN: u8 = b'[';
pub const MARKER_ARRAY_CLOSE: u8 = b']';
pub const MARKER_OBJECT_OPEN: u8 = b'{';
pub const MARKER_OBJECT_CLOSE: u8 = b'}';
pub const MARKER_TYPE: u8 = b'$';
pub const MARKER_COUNT: u8 = b'#';

// String-strategy tags inside an SOA schema descriptor.
pub const STR_TAG_DICT: u8 = b'd';
pub const STR_TAG_FIXED: u8 = b'f';
pub const STR_TAG_OFFSET: u8 = b'o';

/// Element type behind a numeric/char marker: kind, width and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Half,
    Float32,
    Float64,
    Char,
}

impl ElemType {
    /// Payload width in bytes.
    pub fn width(self) -> usize {
        match self {
            ElemType::Int8 | ElemType::Uint8 | ElemType::Char => 1,
            ElemType::Int16 | ElemType::Uint16 | ElemType::Half => 2,
            ElemType::Int32 | ElemType::Uint32 | ElemType::Float32 => 4,
            ElemType::Int64 | ElemType::Uint64 | ElemType::Float64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ElemType::Int8 | ElemType::Int16 | ElemType::Int32 | ElemType::Int64
        )
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ElemType::Half | ElemType::Float32 | ElemType::Float64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemType::Half | ElemType::Float32 | ElemType::Float64)
    }

    /// Canonical type name, as written into `_ArrayType_`.
    pub fn name(self) -> &'static str {
        match self {
            ElemType::Int8 => "int8",
            ElemType::Uint8 => "uint8",
            ElemType::Int16 => "int16",
            ElemType::Uint16 => "uint16",
            ElemType::Int32 => "int32",
            ElemType::Uint32 => "uint32",
            ElemType::Int64 => "int64",
            ElemType::Uint64 => "uint64",
            ElemType::Half => "half",
            ElemType::Float32 => "single",
            ElemType::Float64 => "double",
            ElemType::Char => "char",
        }
    }
}

/// Type-name → element type, covering the canonical names plus common
/// aliases seen in annotated-array headers.
pub static ELEM_BY_NAME: phf::Map<&'static str, ElemType> = phf::phf_map! {
    "int8" => ElemType::Int8,
    "uint8" => ElemType::Uint8,
    "int16" => ElemType::Int16,
    "uint16" => ElemType::Uint16,
    "int32" => ElemType::Int32,
    "uint32" => ElemType::Uint32,
    "int64" => ElemType::Int64,
    "uint64" => ElemType::Uint64,
    "half" => ElemType::Half,
    "float16" => ElemType::Half,
    "single" => ElemType::Float32,
    "float32" => ElemType::Float32,
    "double" => ElemType::Float64,
    "float64" => ElemType::Float64,
    "char" => ElemType::Char,
};

const fn elem_table(bjdata: bool) -> [Option<ElemType>; 256] {
    let mut t = [None; 256];
    t[b'i' as usize] = Some(ElemType::Int8);
    t[b'U' as usize] = Some(ElemType::Uint8);
    t[b'I' as usize] = Some(ElemType::Int16);
    t[b'l' as usize] = Some(ElemType::Int32);
    t[b'L' as usize] = Some(ElemType::Int64);
    t[b'd' as usize] = Some(ElemType::Float32);
    t[b'D' as usize] = Some(ElemType::Float64);
    t[b'C' as usize] = Some(ElemType::Char);
    if bjdata {
        t[b'u' as usize] = Some(ElemType::Uint16);
        t[b'm' as usize] = Some(ElemType::Uint32);
        t[b'M' as usize] = Some(ElemType::Uint64);
        t[b'h' as usize] = Some(ElemType::Half);
    }
    t
}

static BJDATA_ELEMS: [Option<ElemType>; 256] = elem_table(true);
static UBJSON_ELEMS: [Option<ElemType>; 256] = elem_table(false);

/// Marker byte for an element type under a variant.
///
/// Fails with `UnsupportedType` when the type has no marker in the variant
/// (e.g. `u`/`m`/`M`/`h` under UBJSON). MessagePack has no per-element
/// markers; see [`msgpack`].
pub fn marker_for(elem: ElemType, variant: FormatVariant) -> Result<u8> {
    let marker = match elem {
        ElemType::Int8 => b'i',
        ElemType::Uint8 => b'U',
        ElemType::Int16 => b'I',
        ElemType::Uint16 => b'u',
        ElemType::Int32 => b'l',
        ElemType::Uint32 => b'm',
        ElemType::Int64 => b'L',
        ElemType::Uint64 => b'M',
        ElemType::Half => b'h',
        ElemType::Float32 => b'd',
        ElemType::Float64 => b'D',
        ElemType::Char => b'C',
    };
    let table = match variant {
        FormatVariant::BjData => &BJDATA_ELEMS,
        FormatVariant::Ubjson => &UBJSON_ELEMS,
        FormatVariant::MessagePack => {
            return Err(CodecError::UnsupportedType {
                marker,
                offset: 0,
                variant: variant.name(),
            }
            .into());
        }
    };
    if table[marker as usize].is_some() {
        Ok(marker)
    } else {
        Err(CodecError::UnsupportedType {
            marker,
            offset: 0,
            variant: variant.name(),
        }
        .into())
    }
}

/// Element type for a marker byte under a variant, O(1).
///
/// `offset` is threaded through so the failure names where the bad marker
/// was read.
pub fn elem_for(marker: u8, variant: FormatVariant, offset: usize) -> Result<ElemType> {
    let table = match variant {
        FormatVariant::BjData => &BJDATA_ELEMS,
        FormatVariant::Ubjson => &UBJSON_ELEMS,
        FormatVariant::MessagePack => {
            return Err(CodecError::UnsupportedType {
                marker,
                offset,
                variant: variant.name(),
            }
            .into());
        }
    };
    table[marker as usize].ok_or_else(|| {
        // Distinguish "BJData-only marker under UBJSON" from garbage.
        if BJDATA_ELEMS[marker as usize].is_some() {
            CodecError::UnsupportedType {
                marker,
                offset,
                variant: variant.name(),
            }
            .into()
        } else {
            CodecError::InvalidFormat {
                offset,
                context: format!("byte 0x{marker:02x} is not a type marker"),
            }
            .into()
        }
    })
}

/// Smallest integer element type whose range covers `[min, max]` exactly.
///
/// Unsigned markers are preferred when `min >= 0`; under UBJSON (which has
/// no unsigned types above u8) the next signed width covers instead.
pub fn minimal_int(min: i64, max: i64, variant: FormatVariant) -> ElemType {
    let unsigned_ok = !matches!(variant, FormatVariant::Ubjson);
    if min >= 0 {
        let max = max as u64;
        if max <= u8::MAX as u64 {
            return ElemType::Uint8;
        }
        if unsigned_ok {
            if max <= u16::MAX as u64 {
                return ElemType::Uint16;
            }
            if max <= u32::MAX as u64 {
                return ElemType::Uint32;
            }
            return ElemType::Uint64;
        }
        if max <= i16::MAX as u64 {
            return ElemType::Int16;
        }
        if max <= i32::MAX as u64 {
            return ElemType::Int32;
        }
        return ElemType::Int64;
    }
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        ElemType::Int8
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        ElemType::Int16
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        ElemType::Int32
    } else {
        ElemType::Int64
    }
}

/// Smallest unsigned index type covering `max` under a variant, used for
/// SOA dictionary/offset index columns.
pub fn minimal_index(max: u64, variant: FormatVariant) -> ElemType {
    minimal_int(0, max.min(i64::MAX as u64) as i64, variant)
}

/// Reverses the bytes of each `width`-sized element in place.
///
/// This is the one endianness conversion routine in the crate. Payloads are
/// canonically little-endian in memory; encoding to or decoding from a
/// big-endian stream swaps here and nowhere else.
pub fn swap_elements(bytes: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    debug_assert_eq!(bytes.len() % width, 0);
    for chunk in bytes.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

/// Widens IEEE 754 binary16 bits to f32. Exact for every half value.
pub fn half_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 1) as u32;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let frac = (bits & 0x3ff) as u32;
    match (exp, frac) {
        (0, 0) => f32::from_bits(sign << 31),
        (0, _) => {
            let mag = frac as f32 / 16_777_216.0; // 2^-24 per ulp
            if sign == 1 {
                -mag
            } else {
                mag
            }
        }
        (0x1f, 0) => f32::from_bits((sign << 31) | 0x7f80_0000),
        (0x1f, _) => f32::from_bits((sign << 31) | 0x7fc0_0000),
        _ => f32::from_bits((sign << 31) | ((exp + 112) << 23) | (frac << 13)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn bjdata_table_covers_extended_markers() {
        assert_eq!(
            elem_for(b'u', FormatVariant::BjData, 0).unwrap(),
            ElemType::Uint16
        );
        assert_eq!(
            elem_for(b'M', FormatVariant::BjData, 0).unwrap(),
            ElemType::Uint64
        );
        assert_eq!(
            elem_for(b'h', FormatVariant::BjData, 0).unwrap(),
            ElemType::Half
        );
    }

    #[test]
    fn ubjson_rejects_bjdata_only_markers_as_unsupported() {
        let err = elem_for(b'u', FormatVariant::Ubjson, 7).unwrap_err();
        match err.downcast_ref::<CodecError>() {
            Some(CodecError::UnsupportedType { marker, offset, .. }) => {
                assert_eq!(*marker, b'u');
                assert_eq!(*offset, 7);
            }
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn unknown_byte_is_invalid_format_with_offset() {
        let err = elem_for(0x01, FormatVariant::BjData, 42).unwrap_err();
        match err.downcast_ref::<CodecError>() {
            Some(CodecError::InvalidFormat { offset, .. }) => assert_eq!(*offset, 42),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn minimal_int_prefers_unsigned_for_nonnegative() {
        assert_eq!(
            minimal_int(0, 300, FormatVariant::BjData),
            ElemType::Uint16
        );
        assert_eq!(minimal_int(0, 255, FormatVariant::BjData), ElemType::Uint8);
        assert_eq!(
            minimal_int(-5, 300, FormatVariant::BjData),
            ElemType::Int16
        );
        assert_eq!(minimal_int(-5, 100, FormatVariant::BjData), ElemType::Int8);
    }

    #[test]
    fn minimal_int_falls_back_to_signed_under_ubjson() {
        assert_eq!(minimal_int(0, 300, FormatVariant::Ubjson), ElemType::Int16);
        assert_eq!(
            minimal_int(0, 70_000, FormatVariant::Ubjson),
            ElemType::Int32
        );
    }

    #[test]
    fn swap_elements_reverses_each_lane() {
        let mut b = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_elements(&mut b, 4);
        assert_eq!(b, vec![4, 3, 2, 1, 8, 7, 6, 5]);
        swap_elements(&mut b, 1);
        assert_eq!(b, vec![4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn half_widening_is_exact_for_simple_values() {
        assert_eq!(half_to_f32(0x3c00), 1.0);
        assert_eq!(half_to_f32(0xc000), -2.0);
        assert_eq!(half_to_f32(0x0000), 0.0);
        assert!(half_to_f32(0x7c00).is_infinite());
        assert!(half_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn name_lookup_round_trips_canonical_names() {
        for elem in [
            ElemType::Int8,
            ElemType::Uint16,
            ElemType::Float64,
            ElemType::Half,
        ] {
            assert_eq!(ELEM_BY_NAME[elem.name()], elem);
        }
    }
}
