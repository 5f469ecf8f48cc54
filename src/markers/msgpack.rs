//! # MessagePack Tag Constants
//!
//! MessagePack uses range-encoded tags rather than ASCII letters: small
//! integers and short containers pack into the low bits of the tag byte,
//! everything else takes an explicit tag in `0xc0..=0xdf`.
//!
//! ## Tag Ranges
//!
//! | Range | Meaning |
//! |-------|---------|
//! | `0x00..=0x7f` | positive fixint |
//! | `0x80..=0x8f` | fixmap (len in low 4 bits) |
//! | `0x90..=0x9f` | fixarray (len in low 4 bits) |
//! | `0xa0..=0xbf` | fixstr (len in low 5 bits) |
//! | `0xc0..=0xdf` | explicit tags below |
//! | `0xe0..=0xff` | negative fixint |

pub const NIL: u8 = 0xc0;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;
pub const BIN8: u8 = 0xc4;
pub const BIN16: u8 = 0xc5;
pub const BIN32: u8 = 0xc6;
pub const EXT8: u8 = 0xc7;
pub const EXT16: u8 = 0xc8;
pub const EXT32: u8 = 0xc9;
pub const FLOAT32: u8 = 0xca;
pub const FLOAT64: u8 = 0xcb;
pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const UINT64: u8 = 0xcf;
pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const INT64: u8 = 0xd3;
pub const FIXEXT1: u8 = 0xd4;
pub const FIXEXT2: u8 = 0xd5;
pub const FIXEXT4: u8 = 0xd6;
pub const FIXEXT8: u8 = 0xd7;
pub const FIXEXT16: u8 = 0xd8;
pub const STR8: u8 = 0xd9;
pub const STR16: u8 = 0xda;
pub const STR32: u8 = 0xdb;
pub const ARRAY16: u8 = 0xdc;
pub const ARRAY32: u8 = 0xdd;
pub const MAP16: u8 = 0xde;
pub const MAP32: u8 = 0xdf;

pub const FIXMAP_BASE: u8 = 0x80;
pub const FIXARRAY_BASE: u8 = 0x90;
pub const FIXSTR_BASE: u8 = 0xa0;

pub const FIXMAP_MAX: usize = 15;
pub const FIXARRAY_MAX: usize = 15;
pub const FIXSTR_MAX: usize = 31;

pub fn is_positive_fixint(tag: u8) -> bool {
    tag <= 0x7f
}

pub fn is_negative_fixint(tag: u8) -> bool {
    tag >= 0xe0
}

pub fn is_fixmap(tag: u8) -> bool {
    (0x80..=0x8f).contains(&tag)
}

pub fn is_fixarray(tag: u8) -> bool {
    (0x90..=0x9f).contains(&tag)
}

pub fn is_fixstr(tag: u8) -> bool {
    (0xa0..=0xbf).contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_ranges_are_disjoint() {
        for b in 0u8..=0xff {
            let hits = [
                is_positive_fixint(b),
                is_fixmap(b),
                is_fixarray(b),
                is_fixstr(b),
                is_negative_fixint(b),
            ]
            .iter()
            .filter(|&&h| h)
            .count();
            assert!(hits <= 1, "tag 0x{b:02x} matched {hits} ranges");
        }
    }
}
