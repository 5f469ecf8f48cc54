//! # MessagePack Emission
//!
//! MessagePack is always big-endian and uses range-encoded tags, so it gets
//! its own emission path instead of threading through the marker table.
//! Numeric arrays ride as the annotated map form with `bin` payloads;
//! record collections expand to plain lists of maps.

use crate::config::CodecOptions;
use crate::error::CodecError;
use crate::markers::{half_to_f32, msgpack as tag};
use crate::value::Value;
use eyre::Result;

pub(crate) fn emit_value(
    out: &mut Vec<u8>,
    value: &Value,
    opts: &CodecOptions,
    depth: usize,
) -> Result<()> {
    if depth > opts.max_depth {
        return Err(CodecError::DepthLimitExceeded { depth }.into());
    }
    match value {
        Value::Null => out.push(tag::NIL),
        Value::Bool(true) => out.push(tag::TRUE),
        Value::Bool(false) => out.push(tag::FALSE),
        Value::Int(i) => emit_int(out, *i),
        Value::UInt(u) => {
            out.push(tag::UINT64);
            out.extend_from_slice(&u.to_be_bytes());
        }
        Value::Float(f) => {
            if *f == (*f as f32) as f64 {
                out.push(tag::FLOAT32);
                out.extend_from_slice(&(*f as f32).to_be_bytes());
            } else {
                out.push(tag::FLOAT64);
                out.extend_from_slice(&f.to_be_bytes());
            }
        }
        Value::Half(bits) => {
            out.push(tag::FLOAT32);
            out.extend_from_slice(&half_to_f32(*bits).to_be_bytes());
        }
        Value::Str(s) => emit_str(out, s)?,
        Value::Binary(b) => emit_bin(out, b)?,
        Value::List(items) => {
            emit_array_header(out, items.len())?;
            for item in items {
                emit_value(out, item, opts, depth + 1)?;
            }
        }
        Value::Map(pairs) => {
            emit_map_header(out, pairs.len())?;
            for (k, v) in pairs {
                emit_str(out, k)?;
                emit_value(out, v, opts, depth + 1)?;
            }
        }
        Value::Array(arr) => return super::emit_array(out, arr, opts, depth),
        Value::Records(soa) => return super::emit_records(out, soa, opts, depth),
        Value::Ext(ext) => emit_ext(out, ext.type_id, &ext.data)?,
    }
    Ok(())
}

fn emit_int(out: &mut Vec<u8>, v: i64) {
    if (0..=0x7f).contains(&v) {
        out.push(v as u8);
    } else if (-32..0).contains(&v) {
        out.push(v as u8);
    } else if v >= 0 {
        let u = v as u64;
        if u <= u8::MAX as u64 {
            out.push(tag::UINT8);
            out.push(u as u8);
        } else if u <= u16::MAX as u64 {
            out.push(tag::UINT16);
            out.extend_from_slice(&(u as u16).to_be_bytes());
        } else if u <= u32::MAX as u64 {
            out.push(tag::UINT32);
            out.extend_from_slice(&(u as u32).to_be_bytes());
        } else {
            out.push(tag::UINT64);
            out.extend_from_slice(&u.to_be_bytes());
        }
    } else if v >= i8::MIN as i64 {
        out.push(tag::INT8);
        out.push(v as i8 as u8);
    } else if v >= i16::MIN as i64 {
        out.push(tag::INT16);
        out.extend_from_slice(&(v as i16).to_be_bytes());
    } else if v >= i32::MIN as i64 {
        out.push(tag::INT32);
        out.extend_from_slice(&(v as i32).to_be_bytes());
    } else {
        out.push(tag::INT64);
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn emit_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let b = s.as_bytes();
    match b.len() {
        n if n <= tag::FIXSTR_MAX => out.push(tag::FIXSTR_BASE | n as u8),
        n if n <= u8::MAX as usize => {
            out.push(tag::STR8);
            out.push(n as u8);
        }
        n if n <= u16::MAX as usize => {
            out.push(tag::STR16);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            eyre::ensure!(n <= u32::MAX as usize, "string exceeds str32 range");
            out.push(tag::STR32);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(b);
    Ok(())
}

fn emit_bin(out: &mut Vec<u8>, b: &[u8]) -> Result<()> {
    match b.len() {
        n if n <= u8::MAX as usize => {
            out.push(tag::BIN8);
            out.push(n as u8);
        }
        n if n <= u16::MAX as usize => {
            out.push(tag::BIN16);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            eyre::ensure!(n <= u32::MAX as usize, "binary exceeds bin32 range");
            out.push(tag::BIN32);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(b);
    Ok(())
}

fn emit_array_header(out: &mut Vec<u8>, len: usize) -> Result<()> {
    match len {
        n if n <= tag::FIXARRAY_MAX => out.push(tag::FIXARRAY_BASE | n as u8),
        n if n <= u16::MAX as usize => {
            out.push(tag::ARRAY16);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            eyre::ensure!(n <= u32::MAX as usize, "list exceeds array32 range");
            out.push(tag::ARRAY32);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
    }
    Ok(())
}

fn emit_map_header(out: &mut Vec<u8>, len: usize) -> Result<()> {
    match len {
        n if n <= tag::FIXMAP_MAX => out.push(tag::FIXMAP_BASE | n as u8),
        n if n <= u16::MAX as usize => {
            out.push(tag::MAP16);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            eyre::ensure!(n <= u32::MAX as usize, "map exceeds map32 range");
            out.push(tag::MAP32);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
    }
    Ok(())
}

fn emit_ext(out: &mut Vec<u8>, type_id: i8, data: &[u8]) -> Result<()> {
    match data.len() {
        1 => out.push(tag::FIXEXT1),
        2 => out.push(tag::FIXEXT2),
        4 => out.push(tag::FIXEXT4),
        8 => out.push(tag::FIXEXT8),
        16 => out.push(tag::FIXEXT16),
        n if n <= u8::MAX as usize => {
            out.push(tag::EXT8);
            out.push(n as u8);
        }
        n if n <= u16::MAX as usize => {
            out.push(tag::EXT16);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            eyre::ensure!(n <= u32::MAX as usize, "ext exceeds ext32 range");
            out.push(tag::EXT32);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
    }
    out.push(type_id as u8);
    out.extend_from_slice(data);
    Ok(())
}
