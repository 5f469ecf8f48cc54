//! # MessagePack Parsing
//!
//! Tag-dispatched counterpart of `encode::msgpack`. All multi-byte fields
//! are big-endian per the MessagePack spec; decoded numeric payloads are
//! flipped back to the crate's canonical little-endian form only inside
//! annotated-array reassembly, where element widths are known.

use super::{annotated, Decoder};
use crate::config::ParseMode;
use crate::error::CodecError;
use crate::markers::msgpack as tag;
use crate::value::{Ext, Value};
use eyre::Result;
use hashbrown::HashSet;

pub(crate) fn parse_value(dec: &mut Decoder, depth: usize) -> Result<Value> {
    if depth > dec.opts().max_depth {
        return Err(CodecError::DepthLimitExceeded { depth }.into());
    }
    let at = dec.pos();
    let b = dec.take()?;
    if tag::is_positive_fixint(b) {
        return Ok(Value::Int(b as i64));
    }
    if tag::is_negative_fixint(b) {
        return Ok(Value::Int(b as i8 as i64));
    }
    if tag::is_fixstr(b) {
        return parse_str(dec, (b & 0x1f) as usize, at);
    }
    if tag::is_fixarray(b) {
        return parse_list(dec, (b & 0x0f) as usize, depth);
    }
    if tag::is_fixmap(b) {
        return parse_map(dec, (b & 0x0f) as usize, depth, at);
    }
    match b {
        tag::NIL => Ok(Value::Null),
        tag::TRUE => Ok(Value::Bool(true)),
        tag::FALSE => Ok(Value::Bool(false)),
        tag::UINT8 => Ok(Value::Int(dec.take()? as i64)),
        tag::UINT16 => Ok(Value::Int(read_u16(dec)? as i64)),
        tag::UINT32 => Ok(Value::Int(read_u32(dec)? as i64)),
        tag::UINT64 => {
            let v = read_u64(dec)?;
            if v > i64::MAX as u64 {
                Ok(Value::UInt(v))
            } else {
                Ok(Value::Int(v as i64))
            }
        }
        tag::INT8 => Ok(Value::Int(dec.take()? as i8 as i64)),
        tag::INT16 => Ok(Value::Int(read_u16(dec)? as i16 as i64)),
        tag::INT32 => Ok(Value::Int(read_u32(dec)? as i32 as i64)),
        tag::INT64 => Ok(Value::Int(read_u64(dec)? as i64)),
        tag::FLOAT32 => Ok(Value::Float(f32::from_bits(read_u32(dec)?) as f64)),
        tag::FLOAT64 => Ok(Value::Float(f64::from_bits(read_u64(dec)?))),
        tag::STR8 => {
            let n = dec.take()? as usize;
            parse_str(dec, n, at)
        }
        tag::STR16 => {
            let n = read_u16(dec)? as usize;
            parse_str(dec, n, at)
        }
        tag::STR32 => {
            let n = read_u32(dec)? as usize;
            parse_str(dec, n, at)
        }
        tag::BIN8 => {
            let n = dec.take()? as usize;
            Ok(Value::Binary(dec.read_exact(n)?.to_vec()))
        }
        tag::BIN16 => {
            let n = read_u16(dec)? as usize;
            Ok(Value::Binary(dec.read_exact(n)?.to_vec()))
        }
        tag::BIN32 => {
            let n = read_u32(dec)? as usize;
            Ok(Value::Binary(dec.read_exact(n)?.to_vec()))
        }
        tag::ARRAY16 => {
            let n = read_u16(dec)? as usize;
            parse_list(dec, n, depth)
        }
        tag::ARRAY32 => {
            let n = read_u32(dec)? as usize;
            parse_list(dec, n, depth)
        }
        tag::MAP16 => {
            let n = read_u16(dec)? as usize;
            parse_map(dec, n, depth, at)
        }
        tag::MAP32 => {
            let n = read_u32(dec)? as usize;
            parse_map(dec, n, depth, at)
        }
        tag::FIXEXT1 => parse_ext(dec, 1),
        tag::FIXEXT2 => parse_ext(dec, 2),
        tag::FIXEXT4 => parse_ext(dec, 4),
        tag::FIXEXT8 => parse_ext(dec, 8),
        tag::FIXEXT16 => parse_ext(dec, 16),
        tag::EXT8 => {
            let n = dec.take()? as usize;
            parse_ext(dec, n)
        }
        tag::EXT16 => {
            let n = read_u16(dec)? as usize;
            parse_ext(dec, n)
        }
        tag::EXT32 => {
            let n = read_u32(dec)? as usize;
            parse_ext(dec, n)
        }
        _ => Err(dec.invalid(at, format!("byte 0x{b:02x} is not a MessagePack tag"))),
    }
}

fn read_u16(dec: &mut Decoder) -> Result<u16> {
    let b = dec.read_exact(2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(dec: &mut Decoder) -> Result<u32> {
    let b = dec.read_exact(4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(dec: &mut Decoder) -> Result<u64> {
    let b = dec.read_exact(8)?;
    Ok(u64::from_be_bytes(b.try_into().unwrap_or_default()))
}

fn parse_str(dec: &mut Decoder, n: usize, at: usize) -> Result<Value> {
    let bytes = dec.read_exact(n)?;
    String::from_utf8(bytes.to_vec())
        .map(Value::Str)
        .map_err(|_| dec.invalid(at, "string payload is not valid UTF-8"))
}

fn parse_list(dec: &mut Decoder, n: usize, depth: usize) -> Result<Value> {
    let mut items = Vec::with_capacity(n.min(4096));
    for _ in 0..n {
        items.push(parse_value(dec, depth + 1)?);
    }
    Ok(Value::List(items))
}

fn parse_map(dec: &mut Decoder, n: usize, depth: usize, at: usize) -> Result<Value> {
    let mut pairs = Vec::with_capacity(n.min(4096));
    for _ in 0..n {
        let k_at = dec.pos();
        let key = match parse_value(dec, depth + 1)? {
            Value::Str(s) => s,
            _ => return Err(dec.invalid(k_at, "map key is not a string")),
        };
        if dec.opts().parse_mode == ParseMode::Strict && key.len() > dec.opts().key_length_limit {
            return Err(CodecError::KeyTooLong {
                offset: k_at,
                len: key.len(),
                limit: dec.opts().key_length_limit,
            }
            .into());
        }
        pairs.push((key, parse_value(dec, depth + 1)?));
    }
    {
        let mut seen = HashSet::with_capacity(pairs.len());
        for (k, _) in &pairs {
            if !seen.insert(k.as_str()) {
                return Err(dec.invalid(at, format!("duplicate map key {k:?}")));
            }
        }
    }
    annotated::finish_object(dec, pairs)
}

fn parse_ext(dec: &mut Decoder, n: usize) -> Result<Value> {
    let type_id = dec.take()? as i8;
    let data = dec.read_exact(n)?.to_vec();
    Ok(Value::Ext(Ext { type_id, data }))
}
