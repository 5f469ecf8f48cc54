//! # SOA Emission
//!
//! Second pass of the two-pass design: the schema and columns are already
//! final, so emission is a straight walk. Deferred string blocks (dictionary
//! tables, offset tables) land between the header and the fixed payload, in
//! schema order, depth-first through nested schemas.

use super::schema::{FieldColumn, FieldKind, Layout, SoaRecords, SoaSchema, StrEncoding};
use crate::config::CodecOptions;
use crate::encode::{emit_key, emit_length, push_swapped};
use crate::error::CodecError;
use crate::markers::{
    self, ElemType, MARKER_ARRAY_CLOSE, MARKER_ARRAY_OPEN, MARKER_COUNT, MARKER_OBJECT_CLOSE,
    MARKER_OBJECT_OPEN, MARKER_STR, MARKER_TYPE, STR_TAG_DICT, STR_TAG_FIXED, STR_TAG_OFFSET,
};
use crate::value::write_elem_i64;
use hashbrown::HashMap;
use tracing::trace;

/// Per-field emission plan resolved against the concrete column data.
enum ColPlan<'a> {
    /// Scalars and fixed vectors: contiguous `stride` bytes per record,
    /// swapped per `width`-sized element.
    Raw {
        width: usize,
        stride: usize,
        bytes: &'a [u8],
    },
    StrDict {
        index: ElemType,
        ids: Vec<u64>,
        table: Vec<&'a str>,
    },
    StrFixed {
        len: usize,
        strings: &'a [String],
    },
    StrOffset {
        index: ElemType,
        offsets: Vec<u64>,
        bytes: Vec<u8>,
    },
    Nested(Vec<ColPlan<'a>>),
}

/// Largest index value an SOA index column of this type can carry.
fn index_capacity(elem: ElemType) -> u64 {
    match elem {
        ElemType::Uint8 => u8::MAX as u64,
        ElemType::Uint16 => u16::MAX as u64,
        ElemType::Uint32 => u32::MAX as u64,
        ElemType::Uint64 => u64::MAX,
        ElemType::Int8 => i8::MAX as u64,
        ElemType::Int16 => i16::MAX as u64,
        ElemType::Int32 => i32::MAX as u64,
        ElemType::Int64 => i64::MAX as u64,
        _ => 0,
    }
}

fn mismatch(context: impl Into<String>) -> eyre::Report {
    CodecError::SchemaMismatch {
        context: context.into(),
    }
    .into()
}

fn build_plans<'a>(
    schema: &SoaSchema,
    columns: &'a [FieldColumn],
    count: usize,
) -> eyre::Result<Vec<ColPlan<'a>>> {
    if schema.fields.len() != columns.len() {
        return Err(mismatch(format!(
            "schema has {} field(s), collection has {} column(s)",
            schema.fields.len(),
            columns.len()
        )));
    }
    let mut plans = Vec::with_capacity(columns.len());
    for (field, column) in schema.fields.iter().zip(columns) {
        let plan = match (&field.kind, column) {
            (FieldKind::Scalar(t), FieldColumn::Scalar(bytes)) => {
                if bytes.len() != count * t.width() {
                    return Err(mismatch(format!(
                        "field {:?}: {} scalar byte(s) for {count} record(s)",
                        field.name,
                        bytes.len()
                    )));
                }
                ColPlan::Raw {
                    width: t.width(),
                    stride: t.width(),
                    bytes,
                }
            }
            (FieldKind::Vector(t, n), FieldColumn::Vector(bytes)) => {
                let stride = t.width() * n;
                if bytes.len() != count * stride {
                    return Err(mismatch(format!(
                        "field {:?}: {} vector byte(s) for {count} record(s)",
                        field.name,
                        bytes.len()
                    )));
                }
                ColPlan::Raw {
                    width: t.width(),
                    stride,
                    bytes,
                }
            }
            (FieldKind::Str(enc), FieldColumn::Str(strings)) => {
                if strings.len() != count {
                    return Err(mismatch(format!(
                        "field {:?}: {} string(s) for {count} record(s)",
                        field.name,
                        strings.len()
                    )));
                }
                build_string_plan(&field.name, enc, strings)?
            }
            (FieldKind::Nested(sub), FieldColumn::Nested(cols)) => {
                ColPlan::Nested(build_plans(sub, cols, count)?)
            }
            _ => {
                return Err(mismatch(format!(
                    "field {:?}: column data disagrees with schema kind",
                    field.name
                )));
            }
        };
        plans.push(plan);
    }
    Ok(plans)
}

fn build_string_plan<'a>(
    name: &str,
    enc: &StrEncoding,
    strings: &'a [String],
) -> eyre::Result<ColPlan<'a>> {
    match enc {
        StrEncoding::Dict { index } => {
            let mut table: Vec<&str> = Vec::new();
            let mut seen: HashMap<&str, u64> = HashMap::new();
            let mut ids = Vec::with_capacity(strings.len());
            for s in strings {
                let id = *seen.entry(s.as_str()).or_insert_with(|| {
                    table.push(s.as_str());
                    (table.len() - 1) as u64
                });
                ids.push(id);
            }
            if table.len() as u64 > index_capacity(*index).saturating_add(1) {
                return Err(mismatch(format!(
                    "field {name:?}: {} dictionary entries overflow the index type",
                    table.len()
                )));
            }
            Ok(ColPlan::StrDict {
                index: *index,
                ids,
                table,
            })
        }
        StrEncoding::Fixed { len } => {
            for s in strings {
                if s.len() > *len {
                    return Err(mismatch(format!(
                        "field {name:?}: {} byte string exceeds fixed width {len}",
                        s.len()
                    )));
                }
            }
            Ok(ColPlan::StrFixed {
                len: *len,
                strings,
            })
        }
        StrEncoding::Offset { index } => {
            let mut offsets = Vec::with_capacity(strings.len() + 1);
            let mut bytes = Vec::new();
            offsets.push(0);
            for s in strings {
                bytes.extend_from_slice(s.as_bytes());
                offsets.push(bytes.len() as u64);
            }
            if bytes.len() as u64 > index_capacity(*index) {
                return Err(mismatch(format!(
                    "field {name:?}: {} string byte(s) overflow the offset type",
                    bytes.len()
                )));
            }
            Ok(ColPlan::StrOffset {
                index: *index,
                offsets,
                bytes,
            })
        }
    }
}

/// `{` name descriptor ... `}` — the schema block after `[$` / `{$`.
fn emit_schema(out: &mut Vec<u8>, schema: &SoaSchema, opts: &CodecOptions) -> eyre::Result<()> {
    out.push(MARKER_OBJECT_OPEN);
    for field in &schema.fields {
        emit_key(out, &field.name, opts)?;
        match &field.kind {
            FieldKind::Scalar(t) => out.push(markers::marker_for(*t, opts.variant)?),
            FieldKind::Vector(t, n) => {
                out.push(MARKER_ARRAY_OPEN);
                out.push(markers::marker_for(*t, opts.variant)?);
                out.push(MARKER_COUNT);
                emit_length(out, *n, opts)?;
            }
            FieldKind::Str(StrEncoding::Dict { index }) => {
                out.push(MARKER_STR);
                out.push(STR_TAG_DICT);
                out.push(markers::marker_for(*index, opts.variant)?);
            }
            FieldKind::Str(StrEncoding::Fixed { len }) => {
                out.push(MARKER_STR);
                out.push(STR_TAG_FIXED);
                emit_length(out, *len, opts)?;
            }
            FieldKind::Str(StrEncoding::Offset { index }) => {
                out.push(MARKER_STR);
                out.push(STR_TAG_OFFSET);
                out.push(markers::marker_for(*index, opts.variant)?);
            }
            FieldKind::Nested(sub) => emit_schema(out, sub, opts)?,
        }
    }
    out.push(MARKER_OBJECT_CLOSE);
    Ok(())
}

fn push_index(out: &mut Vec<u8>, value: u64, index: ElemType, opts: &CodecOptions) {
    let mut le = Vec::with_capacity(8);
    write_elem_i64(value as i64, index, &mut le);
    push_swapped(out, &le, index.width(), opts);
}

/// Dict and offset tables, depth-first in schema order.
fn emit_deferred(plan: &ColPlan, out: &mut Vec<u8>, opts: &CodecOptions) -> eyre::Result<()> {
    match plan {
        ColPlan::StrDict { table, .. } => {
            emit_length(out, table.len(), opts)?;
            for s in table {
                emit_length(out, s.len(), opts)?;
                out.extend_from_slice(s.as_bytes());
            }
        }
        ColPlan::StrOffset { index, offsets, bytes } => {
            for off in offsets {
                push_index(out, *off, *index, opts);
            }
            out.extend_from_slice(bytes);
        }
        ColPlan::Nested(plans) => {
            for p in plans {
                emit_deferred(p, out, opts)?;
            }
        }
        ColPlan::Raw { .. } | ColPlan::StrFixed { .. } => {}
    }
    Ok(())
}

/// One record's bytes for one field, appended in wire byte order.
fn write_record(plan: &ColPlan, i: usize, out: &mut Vec<u8>, opts: &CodecOptions) {
    match plan {
        ColPlan::Raw { width, stride, bytes } => {
            push_swapped(out, &bytes[i * stride..(i + 1) * stride], *width, opts);
        }
        ColPlan::StrDict { index, ids, .. } => push_index(out, ids[i], *index, opts),
        ColPlan::StrFixed { len, strings } => {
            let b = strings[i].as_bytes();
            out.extend_from_slice(b);
            out.extend(std::iter::repeat_n(0u8, len - b.len()));
        }
        // record ordinal, resolved through the offset table on read
        ColPlan::StrOffset { index, .. } => push_index(out, i as u64, *index, opts),
        ColPlan::Nested(plans) => {
            for p in plans {
                write_record(p, i, out, opts);
            }
        }
    }
}

/// Emits a record collection: header, schema, deferred blocks, payload.
pub(crate) fn encode_records(
    out: &mut Vec<u8>,
    soa: &SoaRecords,
    opts: &CodecOptions,
) -> eyre::Result<()> {
    let count = soa.count();
    let plans = build_plans(&soa.schema, &soa.columns, count)?;
    trace!(
        count,
        fields = soa.schema.fields.len(),
        ?soa.layout,
        "emitting record collection"
    );

    out.push(match soa.layout {
        Layout::RowMajor => MARKER_ARRAY_OPEN,
        Layout::ColumnMajor => MARKER_OBJECT_OPEN,
    });
    out.push(MARKER_TYPE);
    emit_schema(out, &soa.schema, opts)?;
    out.push(MARKER_COUNT);
    if soa.dims.len() == 1 {
        emit_length(out, count, opts)?;
    } else {
        out.push(MARKER_ARRAY_OPEN);
        for d in &soa.dims {
            emit_length(out, *d, opts)?;
        }
        out.push(MARKER_ARRAY_CLOSE);
    }

    for plan in &plans {
        emit_deferred(plan, out, opts)?;
    }

    match soa.layout {
        Layout::RowMajor => {
            for i in 0..count {
                for plan in &plans {
                    write_record(plan, i, out, opts);
                }
            }
        }
        Layout::ColumnMajor => {
            for plan in &plans {
                for i in 0..count {
                    write_record(plan, i, out, opts);
                }
            }
        }
    }
    Ok(())
}
