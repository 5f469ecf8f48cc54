//! # SOA Parsing and Expansion
//!
//! Reads the wire form back into [`SoaRecords`] (schema, deferred string
//! tables, fixed payload split into canonical columns) and expands a
//! collection into the list of maps it came from.

use super::schema::{
    FieldColumn, FieldKind, Layout, SoaField, SoaRecords, SoaSchema, StrEncoding,
};
use crate::config::Endian;
use crate::decode::Decoder;
use crate::error::CodecError;
use crate::markers::{
    self, ElemType, MARKER_ARRAY_OPEN, MARKER_COUNT, MARKER_OBJECT_CLOSE, MARKER_OBJECT_OPEN,
    MARKER_STR, STR_TAG_DICT, STR_TAG_FIXED, STR_TAG_OFFSET,
};
use crate::value::{read_elem_f64, read_elem_i64, NumericArray, Value};
use eyre::Result;
use smallvec::smallvec;
use tracing::trace;

fn mismatch(context: impl Into<String>) -> eyre::Report {
    CodecError::SchemaMismatch {
        context: context.into(),
    }
    .into()
}

/// Deferred string data parsed between the header and the fixed payload,
/// one entry per schema field.
enum Deferred {
    None,
    Dict(Vec<String>),
    Offset { offsets: Vec<usize>, bytes: Vec<u8> },
    Nested(Vec<Deferred>),
}

/// Cursor sits at the `{` opening the schema (just past `[$` / `{$`).
pub(crate) fn decode_records(
    dec: &mut Decoder,
    layout: Layout,
    depth: usize,
) -> Result<SoaRecords> {
    let schema = parse_schema(dec, depth)?;
    if schema.fields.is_empty() {
        return Err(dec.invalid(dec.pos(), "record schema has no fields"));
    }
    dec.expect(MARKER_COUNT)?;
    let dims = dec.read_dims()?;
    let count: usize = dims.iter().product();

    let mut deferred = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        deferred.push(read_deferred(dec, &field.kind, count)?);
    }

    let payload = dec
        .read_exact(schema.record_width().checked_mul(count).ok_or_else(|| {
            dec.invalid(dec.pos(), "record payload length overflows")
        })?)?
        .to_vec();
    trace!(count, fields = schema.fields.len(), "record collection parsed");

    let big = dec.opts().endian == Endian::Big;
    let columns = split_columns(&schema, &payload, count, layout, &deferred, big)?;
    Ok(SoaRecords {
        schema,
        dims,
        layout,
        columns,
    })
}

fn parse_schema(dec: &mut Decoder, depth: usize) -> Result<SoaSchema> {
    if depth > dec.opts().max_depth {
        return Err(CodecError::DepthLimitExceeded { depth }.into());
    }
    dec.expect(MARKER_OBJECT_OPEN)?;
    let mut fields = Vec::new();
    loop {
        if dec.peek()? == MARKER_OBJECT_CLOSE {
            dec.take()?;
            return Ok(SoaSchema { fields });
        }
        let name = dec.read_key()?;
        let kind = parse_descriptor(dec, depth)?;
        fields.push(SoaField { name, kind });
    }
}

fn parse_descriptor(dec: &mut Decoder, depth: usize) -> Result<FieldKind> {
    let at = dec.pos();
    match dec.peek()? {
        MARKER_ARRAY_OPEN => {
            dec.take()?;
            let m_at = dec.pos();
            let marker = dec.take()?;
            let elem = markers::elem_for(marker, dec.opts().variant, m_at)?;
            dec.expect(MARKER_COUNT)?;
            let n = dec.read_length()?;
            Ok(FieldKind::Vector(elem, n))
        }
        MARKER_STR => {
            dec.take()?;
            match dec.take()? {
                STR_TAG_DICT => Ok(FieldKind::Str(StrEncoding::Dict {
                    index: parse_index_type(dec)?,
                })),
                STR_TAG_FIXED => Ok(FieldKind::Str(StrEncoding::Fixed {
                    len: dec.read_length()?,
                })),
                STR_TAG_OFFSET => Ok(FieldKind::Str(StrEncoding::Offset {
                    index: parse_index_type(dec)?,
                })),
                other => Err(dec.invalid(
                    at,
                    format!("0x{other:02x} is not a string strategy tag"),
                )),
            }
        }
        MARKER_OBJECT_OPEN => Ok(FieldKind::Nested(parse_schema(dec, depth + 1)?)),
        _ => {
            let marker = dec.take()?;
            let elem = markers::elem_for(marker, dec.opts().variant, at)?;
            Ok(FieldKind::Scalar(elem))
        }
    }
}

fn parse_index_type(dec: &mut Decoder) -> Result<ElemType> {
    let at = dec.pos();
    let marker = dec.take()?;
    let elem = markers::elem_for(marker, dec.opts().variant, at)?;
    if !elem.is_integer() {
        return Err(dec.invalid(at, format!("{} cannot index strings", elem.name())));
    }
    Ok(elem)
}

fn read_deferred(dec: &mut Decoder, kind: &FieldKind, count: usize) -> Result<Deferred> {
    match kind {
        FieldKind::Str(StrEncoding::Dict { .. }) => {
            let n = dec.read_length()?;
            let mut table = Vec::with_capacity(n.min(4096));
            for _ in 0..n {
                let at = dec.pos();
                let len = dec.read_length()?;
                let bytes = dec.read_exact(len)?;
                table.push(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| dec.invalid(at, "dictionary entry is not valid UTF-8"))?,
                );
            }
            Ok(Deferred::Dict(table))
        }
        FieldKind::Str(StrEncoding::Offset { index }) => {
            let at = dec.pos();
            let mut offsets = Vec::with_capacity(count + 1);
            for _ in 0..=count {
                let v = dec.read_int(*index)?;
                if v < 0 {
                    return Err(dec.invalid(at, format!("negative string offset {v}")));
                }
                offsets.push(v as usize);
            }
            if offsets.windows(2).any(|w| w[1] < w[0]) {
                return Err(dec.invalid(at, "string offsets are not monotonic"));
            }
            let total = offsets.last().copied().unwrap_or(0);
            let bytes = dec.read_exact(total)?.to_vec();
            Ok(Deferred::Offset { offsets, bytes })
        }
        FieldKind::Nested(sub) => {
            let mut children = Vec::with_capacity(sub.fields.len());
            for field in &sub.fields {
                children.push(read_deferred(dec, &field.kind, count)?);
            }
            Ok(Deferred::Nested(children))
        }
        _ => Ok(Deferred::None),
    }
}

/// Slices the fixed payload into per-record views for every field, then
/// turns each view set into a canonical column.
fn split_columns(
    schema: &SoaSchema,
    payload: &[u8],
    count: usize,
    layout: Layout,
    deferred: &[Deferred],
    big: bool,
) -> Result<Vec<FieldColumn>> {
    let rw = schema.record_width();
    let mut columns = Vec::with_capacity(schema.fields.len());
    let mut block_off = 0usize;
    for (f, field) in schema.fields.iter().enumerate() {
        let w = field.kind.width();
        let slices: Vec<&[u8]> = (0..count)
            .map(|i| match layout {
                Layout::RowMajor => {
                    let start = i * rw + schema.field_offset(f);
                    &payload[start..start + w]
                }
                Layout::ColumnMajor => {
                    let start = block_off + i * w;
                    &payload[start..start + w]
                }
            })
            .collect();
        columns.push(build_column(&field.kind, &slices, &deferred[f], big)?);
        block_off += w * count;
    }
    Ok(columns)
}

fn gather(slices: &[&[u8]], elem_width: usize, big: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(slices.iter().map(|s| s.len()).sum());
    for s in slices {
        bytes.extend_from_slice(s);
    }
    if big {
        markers::swap_elements(&mut bytes, elem_width);
    }
    bytes
}

/// Wire-order index field → logical value.
fn index_at(slice: &[u8], elem: ElemType, big: bool) -> u64 {
    let mut le = [0u8; 8];
    le[..slice.len()].copy_from_slice(slice);
    if big {
        le[..slice.len()].reverse();
    }
    read_elem_i64(&le[..slice.len()], elem).unwrap_or(0) as u64
}

fn build_column(
    kind: &FieldKind,
    slices: &[&[u8]],
    deferred: &Deferred,
    big: bool,
) -> Result<FieldColumn> {
    match (kind, deferred) {
        (FieldKind::Scalar(t), Deferred::None) => {
            Ok(FieldColumn::Scalar(gather(slices, t.width(), big)))
        }
        (FieldKind::Vector(t, _), Deferred::None) => {
            Ok(FieldColumn::Vector(gather(slices, t.width(), big)))
        }
        (FieldKind::Str(StrEncoding::Dict { index }), Deferred::Dict(table)) => {
            let mut strings = Vec::with_capacity(slices.len());
            for s in slices {
                let id = index_at(s, *index, big) as usize;
                let entry = table.get(id).ok_or_else(|| {
                    mismatch(format!(
                        "dictionary index {id} out of range ({} entries)",
                        table.len()
                    ))
                })?;
                strings.push(entry.clone());
            }
            Ok(FieldColumn::Str(strings))
        }
        (FieldKind::Str(StrEncoding::Fixed { .. }), Deferred::None) => {
            let mut strings = Vec::with_capacity(slices.len());
            for s in slices {
                let end = s.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
                strings.push(
                    std::str::from_utf8(&s[..end])
                        .map_err(|_| mismatch("fixed-width string is not valid UTF-8"))?
                        .to_string(),
                );
            }
            Ok(FieldColumn::Str(strings))
        }
        (FieldKind::Str(StrEncoding::Offset { index }), Deferred::Offset { offsets, bytes }) => {
            let mut strings = Vec::with_capacity(slices.len());
            for s in slices {
                let k = index_at(s, *index, big) as usize;
                if k + 1 >= offsets.len() {
                    return Err(mismatch(format!(
                        "string ordinal {k} out of range ({} records)",
                        offsets.len().saturating_sub(1)
                    )));
                }
                strings.push(
                    std::str::from_utf8(&bytes[offsets[k]..offsets[k + 1]])
                        .map_err(|_| mismatch("offset-coded string is not valid UTF-8"))?
                        .to_string(),
                );
            }
            Ok(FieldColumn::Str(strings))
        }
        (FieldKind::Nested(sub), Deferred::Nested(children)) => {
            let mut columns = Vec::with_capacity(sub.fields.len());
            for (g, field) in sub.fields.iter().enumerate() {
                let off = sub.field_offset(g);
                let w = field.kind.width();
                let sub_slices: Vec<&[u8]> = slices.iter().map(|s| &s[off..off + w]).collect();
                columns.push(build_column(&field.kind, &sub_slices, &children[g], big)?);
            }
            Ok(FieldColumn::Nested(columns))
        }
        _ => Err(mismatch("deferred block disagrees with schema field kind")),
    }
}

/// Expands a collection back into the list of maps it was inferred from.
/// Multi-dimensional record grids come back as nested lists, row-major.
pub fn expand(records: &SoaRecords) -> Result<Value> {
    let count = records.count();
    let mut flat = Vec::with_capacity(count);
    for i in 0..count {
        flat.push(record_value(&records.schema, &records.columns, i)?);
    }
    Ok(regroup(flat, &records.dims))
}

fn regroup(mut flat: Vec<Value>, dims: &[usize]) -> Value {
    if dims.len() <= 1 {
        return Value::List(flat);
    }
    let chunk: usize = dims[1..].iter().product();
    let mut groups = Vec::with_capacity(dims[0]);
    for _ in 0..dims[0] {
        let rest = flat.split_off(chunk.min(flat.len()));
        let group = flat;
        flat = rest;
        groups.push(regroup(group, &dims[1..]));
    }
    Value::List(groups)
}

fn record_value(schema: &SoaSchema, columns: &[FieldColumn], i: usize) -> Result<Value> {
    if schema.fields.len() != columns.len() {
        return Err(mismatch("column count disagrees with schema"));
    }
    let mut pairs = Vec::with_capacity(schema.fields.len());
    for (field, column) in schema.fields.iter().zip(columns) {
        let value = match (&field.kind, column) {
            (FieldKind::Scalar(t), FieldColumn::Scalar(bytes)) => {
                let w = t.width();
                let s = &bytes[i * w..(i + 1) * w];
                if t.is_float() {
                    Value::Float(read_elem_f64(s, *t))
                } else if *t == ElemType::Uint64 {
                    let v = u64::from_le_bytes(s.try_into().unwrap_or_default());
                    if v > i64::MAX as u64 {
                        Value::UInt(v)
                    } else {
                        Value::Int(v as i64)
                    }
                } else {
                    Value::Int(read_elem_i64(s, *t).unwrap_or(0))
                }
            }
            (FieldKind::Vector(t, n), FieldColumn::Vector(bytes)) => {
                let stride = t.width() * n;
                Value::Array(NumericArray::dense(
                    *t,
                    smallvec![*n],
                    bytes[i * stride..(i + 1) * stride].to_vec(),
                ))
            }
            (FieldKind::Str(_), FieldColumn::Str(strings)) => Value::Str(strings[i].clone()),
            (FieldKind::Nested(sub), FieldColumn::Nested(cols)) => record_value(sub, cols, i)?,
            _ => return Err(mismatch("column data disagrees with schema kind")),
        };
        pairs.push((field.name.clone(), value));
    }
    Ok(Value::Map(pairs))
}
