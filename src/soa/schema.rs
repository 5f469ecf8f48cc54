//! # SOA Schema and Inference
//!
//! The schema is inferred in a read-only pass over the whole record set
//! before a single byte is emitted; emission happens in a second pass
//! against the finalized schema. A single disqualifying field rejects the
//! entire collection and the caller falls back to the generic per-record
//! encoding.
//!
//! ## Field Qualification
//!
//! A field qualifies under exactly one of:
//!
//! | Class | Requirement |
//! |-------|-------------|
//! | scalar numeric/logical | one numeric class across every record, empties default to zero/false |
//! | fixed vector | 1-D dense non-complex array, one element type, one length |
//! | string | every record a string (empties allowed) |
//! | nested records | every record a map, recursively qualifying |
//!
//! ## String Strategy
//!
//! `unique/total <= dict_ratio` selects the dictionary table; otherwise a
//! longest-value within `FIXED_STRING_BUDGET` selects in-place fixed-width
//! padding; otherwise the offset table. Index widths are the smallest
//! unsigned marker covering `max(dictSize, totalStringBytes)` under the
//! active variant.

use crate::config::{CodecOptions, FIXED_STRING_BUDGET};
use crate::markers::{minimal_index, minimal_int, ElemType};
use crate::value::{write_elem_i64, Dims, Value};
use hashbrown::HashMap;
use smallvec::smallvec;
use tracing::debug;

/// Fixed-payload interleaving order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// All fields of record *i* contiguous, fields in schema order.
    RowMajor,
    /// All records of field *j* contiguous, fields in schema order.
    ColumnMajor,
}

/// How a variable-width string field is represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrEncoding {
    /// Fixed-width index per record into a deferred unique-string table.
    Dict { index: ElemType },
    /// Zero-padded in-place bytes of `len` per record.
    Fixed { len: usize },
    /// Fixed-width record ordinal per record, resolved through a deferred
    /// cumulative-offset table plus concatenated string bytes.
    Offset { index: ElemType },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ElemType),
    Vector(ElemType, usize),
    Str(StrEncoding),
    Nested(SoaSchema),
}

impl FieldKind {
    /// Bytes this field contributes to one record of the fixed payload.
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Scalar(t) => t.width(),
            FieldKind::Vector(t, n) => t.width() * n,
            FieldKind::Str(StrEncoding::Dict { index }) => index.width(),
            FieldKind::Str(StrEncoding::Fixed { len }) => *len,
            FieldKind::Str(StrEncoding::Offset { index }) => index.width(),
            FieldKind::Nested(s) => s.record_width(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoaField {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field list with pre-computable per-record offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct SoaSchema {
    pub fields: Vec<SoaField>,
}

impl SoaSchema {
    /// Total fixed-payload bytes per record.
    pub fn record_width(&self) -> usize {
        self.fields.iter().map(|f| f.kind.width()).sum()
    }

    /// Byte offset of field `idx` within one record (row-major stride).
    pub fn field_offset(&self, idx: usize) -> usize {
        self.fields[..idx].iter().map(|f| f.kind.width()).sum()
    }
}

/// Column data for one field across all records.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldColumn {
    /// `count * width` canonical little-endian bytes.
    Scalar(Vec<u8>),
    /// `count * len * width` canonical little-endian bytes.
    Vector(Vec<u8>),
    Str(Vec<String>),
    Nested(Vec<FieldColumn>),
}

/// A homogeneous record collection in struct-of-arrays form.
#[derive(Debug, Clone, PartialEq)]
pub struct SoaRecords {
    pub schema: SoaSchema,
    /// Record-count dims; product is the record count.
    pub dims: Dims,
    pub layout: Layout,
    /// One column per schema field, in schema order.
    pub columns: Vec<FieldColumn>,
}

impl SoaRecords {
    pub fn count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Scans a record list field-by-field; `Some(schema)` iff the whole
/// collection can be stored as schema + flat payload.
pub fn can_encode(records: &[Value], opts: &CodecOptions) -> Option<SoaSchema> {
    infer(records, opts).map(|soa| soa.schema)
}

/// Two-pass entry: builds the finalized schema and columnar data without
/// emitting a byte. Returns `None` when any field disqualifies.
pub fn infer(records: &[Value], opts: &CodecOptions) -> Option<SoaRecords> {
    if records.is_empty() {
        return None;
    }
    let first = records[0].as_map()?;
    let names: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
    for rec in records {
        let map = rec.as_map()?;
        if map.len() != names.len() || map.iter().zip(&names).any(|((k, _), n)| k != n) {
            return None;
        }
    }

    let count = records.len();
    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for (f, name) in names.iter().enumerate() {
        let mut values: Vec<&Value> = Vec::with_capacity(count);
        for rec in records {
            values.push(&rec.as_map()?[f].1);
        }
        let (kind, column) = classify_field(&values, opts)?;
        fields.push(SoaField {
            name: name.to_string(),
            kind,
        });
        columns.push(column);
    }
    debug!(count, fields = fields.len(), "record collection qualifies for SOA");
    Some(SoaRecords {
        schema: SoaSchema { fields },
        dims: smallvec![count],
        layout: Layout::RowMajor,
        columns,
    })
}

fn classify_field(values: &[&Value], opts: &CodecOptions) -> Option<(FieldKind, FieldColumn)> {
    let count = values.len();

    // scalar integer / logical / float, one class throughout
    if values
        .iter()
        .all(|v| matches!(v, Value::Int(_) | Value::UInt(_) | Value::Null))
        && values.iter().any(|v| !matches!(v, Value::Null))
    {
        // u64 magnitudes beyond i64 don't fit the shared bounds computation
        if values
            .iter()
            .any(|v| matches!(v, Value::UInt(u) if *u > i64::MAX as u64))
        {
            return None;
        }
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for v in values {
            // empties default to zero, which then participates in the bounds
            let x = v.as_i64().unwrap_or(0);
            lo = lo.min(x);
            hi = hi.max(x);
        }
        let elem = minimal_int(lo, hi, opts.variant);
        let mut bytes = Vec::with_capacity(count * elem.width());
        for v in values {
            write_elem_i64(v.as_i64().unwrap_or(0), elem, &mut bytes);
        }
        return Some((FieldKind::Scalar(elem), FieldColumn::Scalar(bytes)));
    }

    if values
        .iter()
        .all(|v| matches!(v, Value::Float(_) | Value::Null))
        && values.iter().any(|v| matches!(v, Value::Float(_)))
    {
        let mut bytes = Vec::with_capacity(count * 8);
        for v in values {
            let x = match v {
                Value::Float(f) => *f,
                _ => 0.0,
            };
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        return Some((
            FieldKind::Scalar(ElemType::Float64),
            FieldColumn::Scalar(bytes),
        ));
    }

    if values
        .iter()
        .all(|v| matches!(v, Value::Bool(_) | Value::Null))
        && values.iter().any(|v| matches!(v, Value::Bool(_)))
    {
        let bytes = values
            .iter()
            .map(|v| u8::from(matches!(v, Value::Bool(true))))
            .collect();
        return Some((
            FieldKind::Scalar(ElemType::Uint8),
            FieldColumn::Scalar(bytes),
        ));
    }

    // fixed-length numeric vector, one element type and one length
    if values
        .iter()
        .all(|v| matches!(v, Value::Array(_) | Value::Null))
    {
        let mut elem_len: Option<(ElemType, usize)> = None;
        for v in values {
            if let Value::Array(a) = v {
                if a.dims.len() != 1 || a.complex || a.sparse.is_some() {
                    return None;
                }
                match elem_len {
                    None => elem_len = Some((a.elem, a.dims[0])),
                    Some((e, n)) if e == a.elem && n == a.dims[0] => {}
                    _ => return None,
                }
            }
        }
        let (elem, n) = elem_len?;
        let stride = elem.width() * n;
        let mut bytes = Vec::with_capacity(count * stride);
        for v in values {
            match v {
                Value::Array(a) => bytes.extend_from_slice(&a.data),
                _ => bytes.extend(std::iter::repeat_n(0u8, stride)),
            }
        }
        return Some((FieldKind::Vector(elem, n), FieldColumn::Vector(bytes)));
    }

    // string field, any lengths, empties allowed
    if values
        .iter()
        .all(|v| matches!(v, Value::Str(_) | Value::Null))
    {
        let strings: Vec<String> = values
            .iter()
            .map(|v| v.as_str().unwrap_or("").to_string())
            .collect();
        let enc = choose_string_encoding(&strings, opts);
        return Some((FieldKind::Str(enc), FieldColumn::Str(strings)));
    }

    // nested record collection, recursively qualifying
    if values.iter().all(|v| matches!(v, Value::Map(_))) {
        let sub: Vec<Value> = values.iter().map(|v| (*v).clone()).collect();
        let nested = infer(&sub, opts)?;
        return Some((
            FieldKind::Nested(nested.schema),
            FieldColumn::Nested(nested.columns),
        ));
    }

    None
}

fn choose_string_encoding(strings: &[String], opts: &CodecOptions) -> StrEncoding {
    let count = strings.len();
    let mut seen: HashMap<&str, u64> = HashMap::new();
    let mut total_bytes = 0u64;
    let mut max_len = 0usize;
    for s in strings {
        let next = seen.len() as u64;
        seen.entry(s.as_str()).or_insert(next);
        total_bytes += s.len() as u64;
        max_len = max_len.max(s.len());
    }
    let unique = seen.len();
    let ratio = unique as f64 / count as f64;
    let enc = if ratio <= opts.dict_ratio {
        StrEncoding::Dict {
            index: minimal_index(unique.max(1) as u64, opts.variant),
        }
    } else if max_len <= FIXED_STRING_BUDGET {
        StrEncoding::Fixed { len: max_len.max(1) }
    } else {
        StrEncoding::Offset {
            index: minimal_index(total_bytes.max(count as u64), opts.variant),
        }
    };
    debug!(count, unique, max_len, ?enc, "string strategy chosen");
    enc
}
