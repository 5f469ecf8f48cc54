//! # Encoder
//!
//! Recursive descent over [`Value`], orchestrating the marker table, shape
//! codec, SOA codec and compression adapter into one byte stream.
//!
//! ## Emission Strategy
//!
//! | Value case | Wire form |
//! |------------|-----------|
//! | scalars | minimal covering marker + payload |
//! | `Str` | `C` single-byte form, else `S` + length prefix |
//! | `List` | `[` children `]`, or a typed run under `pack_lists` |
//! | `Map` | `{` key/value pairs `}` |
//! | `Array` (plain dense) | `[$type#count` or BJData ND `[$type#[dims]` |
//! | `Array` (sparse/complex/shaped/zipped) | annotated-object form |
//! | `Records` | SOA header, see `soa::encode` |
//!
//! Integer width minimization picks the narrowest marker covering the value
//! bounds, unsigned preferred for non-negative data. Every multi-byte field
//! funnels through [`push_swapped`]/`markers::swap_elements` at the moment
//! of emission; no ad hoc byte order handling exists anywhere else.

pub mod msgpack;

use crate::compress;
use crate::config::{CodecOptions, Endian, FormatVariant, EXT_BIGNUM};
use crate::error::CodecError;
use crate::markers::{self, ElemType};
use crate::shape::{self, ShapeKind};
use crate::soa::{self, schema::SoaRecords};
use crate::value::{write_elem_i64, NumericArray, Value};
use eyre::Result;
use hashbrown::HashSet;
use tracing::debug;

/// Serializes one value tree to bytes under the given options.
pub fn encode(value: &Value, opts: &CodecOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match opts.variant {
        FormatVariant::MessagePack => msgpack::emit_value(&mut out, value, opts, 0)?,
        _ => emit_value(&mut out, value, opts, 0)?,
    }
    Ok(out)
}

/// Appends `le_bytes` (one or more `width`-sized elements) swapping to the
/// configured byte order.
pub(crate) fn push_swapped(out: &mut Vec<u8>, le_bytes: &[u8], width: usize, opts: &CodecOptions) {
    let start = out.len();
    out.extend_from_slice(le_bytes);
    if opts.endian == Endian::Big {
        markers::swap_elements(&mut out[start..], width);
    }
}

/// Emits a minimal-width integer scalar: marker + payload.
pub(crate) fn emit_int_scalar(out: &mut Vec<u8>, v: i64, opts: &CodecOptions) -> Result<()> {
    let elem = markers::minimal_int(v, v, opts.variant);
    out.push(markers::marker_for(elem, opts.variant)?);
    let mut le = Vec::with_capacity(8);
    write_elem_i64(v, elem, &mut le);
    push_swapped(out, &le, elem.width(), opts);
    Ok(())
}

pub(crate) fn emit_uint_scalar(out: &mut Vec<u8>, v: u64, opts: &CodecOptions) -> Result<()> {
    if v <= i64::MAX as u64 {
        return emit_int_scalar(out, v as i64, opts);
    }
    if opts.variant != FormatVariant::BjData {
        return Err(CodecError::UnsupportedType {
            marker: b'M',
            offset: out.len(),
            variant: opts.variant.name(),
        }
        .into());
    }
    out.push(b'M');
    push_swapped(out, &v.to_le_bytes(), 8, opts);
    Ok(())
}

/// Emits a non-negative length/count with the smallest covering marker.
pub(crate) fn emit_length(out: &mut Vec<u8>, n: usize, opts: &CodecOptions) -> Result<()> {
    emit_int_scalar(out, n as i64, opts)
}

/// Emits an object key: length prefix + raw bytes (keys carry no `S`).
pub(crate) fn emit_key(out: &mut Vec<u8>, name: &str, opts: &CodecOptions) -> Result<()> {
    emit_length(out, name.len(), opts)?;
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn emit_str(out: &mut Vec<u8>, s: &str, opts: &CodecOptions) -> Result<()> {
    let b = s.as_bytes();
    if b.len() == 1 && b[0].is_ascii() {
        out.push(b'C');
        out.push(b[0]);
        return Ok(());
    }
    out.push(markers::MARKER_STR);
    emit_length(out, b.len(), opts)?;
    out.extend_from_slice(b);
    Ok(())
}

fn check_depth(depth: usize, opts: &CodecOptions) -> Result<()> {
    if depth > opts.max_depth {
        return Err(CodecError::DepthLimitExceeded { depth }.into());
    }
    Ok(())
}

pub(crate) fn emit_value(
    out: &mut Vec<u8>,
    value: &Value,
    opts: &CodecOptions,
    depth: usize,
) -> Result<()> {
    check_depth(depth, opts)?;
    match value {
        Value::Null => out.push(markers::MARKER_NULL),
        Value::Bool(true) => out.push(markers::MARKER_TRUE),
        Value::Bool(false) => out.push(markers::MARKER_FALSE),
        Value::Int(i) => emit_int_scalar(out, *i, opts)?,
        Value::UInt(u) => emit_uint_scalar(out, *u, opts)?,
        Value::Float(f) => emit_float_scalar(out, *f, opts)?,
        Value::Half(bits) => {
            if opts.variant == FormatVariant::BjData {
                out.push(b'h');
                push_swapped(out, &bits.to_le_bytes(), 2, opts);
            } else {
                // UBJSON has no half marker; widen losslessly
                let f = markers::half_to_f32(*bits);
                out.push(b'd');
                push_swapped(out, &f.to_le_bytes(), 4, opts);
            }
        }
        Value::Str(s) => emit_str(out, s, opts)?,
        Value::Binary(b) => {
            out.push(markers::MARKER_ARRAY_OPEN);
            out.push(markers::MARKER_TYPE);
            out.push(b'U');
            out.push(markers::MARKER_COUNT);
            emit_length(out, b.len(), opts)?;
            out.extend_from_slice(b);
        }
        Value::List(items) => emit_list(out, items, opts, depth)?,
        Value::Map(pairs) => emit_map(out, pairs, opts, depth)?,
        Value::Array(arr) => emit_array(out, arr, opts, depth)?,
        Value::Records(soa) => emit_records(out, soa, opts, depth)?,
        Value::Ext(ext) => {
            if ext.type_id == EXT_BIGNUM {
                out.push(markers::MARKER_HIPREC);
                emit_length(out, ext.data.len(), opts)?;
                out.extend_from_slice(&ext.data);
            } else {
                return Err(CodecError::UnsupportedType {
                    marker: ext.type_id as u8,
                    offset: out.len(),
                    variant: opts.variant.name(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn emit_float_scalar(out: &mut Vec<u8>, f: f64, opts: &CodecOptions) -> Result<()> {
    // downcast only when exactly representable (false for NaN, fine)
    if f == (f as f32) as f64 {
        out.push(b'd');
        push_swapped(out, &(f as f32).to_le_bytes(), 4, opts);
    } else {
        out.push(b'D');
        push_swapped(out, &f.to_le_bytes(), 8, opts);
    }
    Ok(())
}

fn emit_records(
    out: &mut Vec<u8>,
    soa: &SoaRecords,
    opts: &CodecOptions,
    depth: usize,
) -> Result<()> {
    check_depth(depth, opts)?;
    if opts.variant == FormatVariant::MessagePack {
        // the bracket-shaped SOA header has no MessagePack expression
        let expanded = soa::decode::expand(soa)?;
        return msgpack::emit_value(out, &expanded, opts, depth);
    }
    soa::encode::encode_records(out, soa, opts)
}

fn emit_list(out: &mut Vec<u8>, items: &[Value], opts: &CodecOptions, depth: usize) -> Result<()> {
    // homogeneous record collections may compact to schema + flat payload
    if opts.use_soa && items.len() > 1 && items.iter().all(|v| matches!(v, Value::Map(_))) {
        if let Some(soa) = soa::schema::infer(items, opts) {
            debug!(records = items.len(), "list encoded as SOA");
            return emit_records(out, &soa, opts, depth);
        }
    }

    if opts.pack_lists && !items.is_empty() {
        if let Some((elem, payload)) = pack_primitive_run(items, opts) {
            out.push(markers::MARKER_ARRAY_OPEN);
            out.push(markers::MARKER_TYPE);
            out.push(markers::marker_for(elem, opts.variant)?);
            out.push(markers::MARKER_COUNT);
            emit_length(out, items.len(), opts)?;
            push_swapped(out, &payload, elem.width(), opts);
            return Ok(());
        }
    }

    out.push(markers::MARKER_ARRAY_OPEN);
    for item in items {
        emit_value(out, item, opts, depth + 1)?;
    }
    out.push(markers::MARKER_ARRAY_CLOSE);
    Ok(())
}

/// Flattens an all-one-primitive-type list into (element type, LE payload).
fn pack_primitive_run(items: &[Value], opts: &CodecOptions) -> Option<(ElemType, Vec<u8>)> {
    if items.iter().all(|v| matches!(v, Value::Int(_) | Value::UInt(_))) {
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for v in items {
            let x = v.as_i64()?;
            lo = lo.min(x);
            hi = hi.max(x);
        }
        let elem = markers::minimal_int(lo, hi, opts.variant);
        let mut payload = Vec::with_capacity(items.len() * elem.width());
        for v in items {
            write_elem_i64(v.as_i64()?, elem, &mut payload);
        }
        return Some((elem, payload));
    }
    if items.iter().all(|v| matches!(v, Value::Float(_))) {
        let all_f32 = items
            .iter()
            .all(|v| matches!(v, Value::Float(f) if *f == (*f as f32) as f64));
        let elem = if all_f32 {
            ElemType::Float32
        } else {
            ElemType::Float64
        };
        let mut payload = Vec::with_capacity(items.len() * elem.width());
        for v in items {
            let Value::Float(f) = v else { return None };
            if all_f32 {
                payload.extend_from_slice(&(*f as f32).to_le_bytes());
            } else {
                payload.extend_from_slice(&f.to_le_bytes());
            }
        }
        return Some((elem, payload));
    }
    None
}

fn emit_map(
    out: &mut Vec<u8>,
    pairs: &[(String, Value)],
    opts: &CodecOptions,
    depth: usize,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(pairs.len());
    for (k, _) in pairs {
        eyre::ensure!(seen.insert(k.as_str()), "duplicate map key {k:?}");
    }
    out.push(markers::MARKER_OBJECT_OPEN);
    for (k, v) in pairs {
        emit_key(out, k, opts)?;
        emit_value(out, v, opts, depth + 1)?;
    }
    out.push(markers::MARKER_OBJECT_CLOSE);
    Ok(())
}

/// Storage element for the wire: the logical type itself when the variant
/// has a marker for it, else the same-width signed type (bit-identical
/// payload; the annotated `_ArrayType_` name restores the logical type).
pub(crate) fn storage_elem(elem: ElemType, variant: FormatVariant) -> ElemType {
    if markers::marker_for(elem, variant).is_ok() {
        return elem;
    }
    match elem.width() {
        2 => ElemType::Int16,
        4 => ElemType::Int32,
        _ => ElemType::Int64,
    }
}

fn emit_array(out: &mut Vec<u8>, arr: &NumericArray, opts: &CodecOptions, depth: usize) -> Result<()> {
    check_depth(depth, opts)?;
    validate_array(arr)?;

    let needs_storage_rename = storage_elem(arr.elem, opts.variant) != arr.elem;
    let nd_unsupported = arr.dims.len() > 1 && opts.variant != FormatVariant::BjData;

    let shaped = if opts.use_shape && arr.sparse.is_none() {
        shape::detect(arr)
    } else {
        None
    };
    // a requested-but-unregistered method must fail loudly even when the
    // size gate would have skipped it
    let zip = match &opts.compression {
        Some(method) => {
            if !compress::is_registered(method) {
                return Err(CodecError::UnsupportedCompression {
                    method: method.clone(),
                }
                .into());
            }
            if arr.elem_count() > opts.compress_threshold {
                Some(method.as_str())
            } else {
                debug!(
                    method,
                    elems = arr.elem_count(),
                    threshold = opts.compress_threshold,
                    "compression gated off"
                );
                None
            }
        }
        None => None,
    };

    let annotated = arr.complex
        || arr.sparse.is_some()
        || shaped.is_some()
        || needs_storage_rename
        || nd_unsupported
        || zip.is_some()
        || opts.variant == FormatVariant::MessagePack;
    if !annotated {
        return emit_plain_dense(out, arr, opts);
    }
    emit_annotated(out, arr, shaped, zip, opts, depth)
}

fn validate_array(arr: &NumericArray) -> Result<()> {
    let planes = if arr.complex { 2 } else { 1 };
    match &arr.sparse {
        None => {
            eyre::ensure!(
                arr.data.len() == arr.plane_len() * planes,
                "dense payload is {} byte(s), dims imply {}",
                arr.data.len(),
                arr.plane_len() * planes
            );
        }
        Some(s) => {
            eyre::ensure!(arr.data.is_empty(), "sparse array with dense payload");
            eyre::ensure!(
                arr.dims.len() <= 2,
                "sparse arrays are vectors or 2-D matrices"
            );
            let want_cols = arr.dims.len() == 2;
            eyre::ensure!(
                s.cols.is_some() == want_cols,
                "sparse index runs disagree with dims"
            );
            if let Some(cols) = &s.cols {
                eyre::ensure!(cols.len() == s.rows.len(), "sparse index runs differ in length");
            }
            eyre::ensure!(
                s.values.len() == s.nnz() * arr.elem.width() * planes,
                "sparse value run is {} byte(s), nnz implies {}",
                s.values.len(),
                s.nnz() * arr.elem.width() * planes
            );
        }
    }
    Ok(())
}

/// `[$type#count` / `[$type#[dims]` typed run for a plain dense array.
fn emit_plain_dense(out: &mut Vec<u8>, arr: &NumericArray, opts: &CodecOptions) -> Result<()> {
    out.push(markers::MARKER_ARRAY_OPEN);
    out.push(markers::MARKER_TYPE);
    out.push(markers::marker_for(arr.elem, opts.variant)?);
    out.push(markers::MARKER_COUNT);
    if arr.dims.len() == 1 {
        emit_length(out, arr.dims[0], opts)?;
    } else {
        out.push(markers::MARKER_ARRAY_OPEN);
        for d in &arr.dims {
            emit_length(out, *d, opts)?;
        }
        out.push(markers::MARKER_ARRAY_CLOSE);
    }
    push_swapped(out, &arr.data, arr.elem.width(), opts);
    Ok(())
}

/// Flat little-endian byte image of the payload the annotated form carries,
/// plus its logical element count (what compression gating counts).
fn flat_payload(arr: &NumericArray, shaped: Option<ShapeKind>) -> Result<(Vec<u8>, usize)> {
    if let Some(s) = &arr.sparse {
        let planes = if arr.complex { 2 } else { 1 };
        let mut flat =
            Vec::with_capacity(s.rows.len() * 8 * 2 + s.nnz() * arr.elem.width() * planes);
        for r in &s.rows {
            flat.extend_from_slice(&r.to_le_bytes());
        }
        if let Some(cols) = &s.cols {
            for c in cols {
                flat.extend_from_slice(&c.to_le_bytes());
            }
        }
        flat.extend_from_slice(&s.values);
        return Ok((flat, s.nnz()));
    }
    if let Some(kind) = shaped {
        let payload = shape::encode(arr, kind)?;
        let stored = payload.len() / arr.elem.width();
        return Ok((payload, stored));
    }
    Ok((arr.data.clone(), arr.elem_count()))
}

fn shape_tag_value(kind: ShapeKind) -> Value {
    let (name, params) = kind.tag();
    if params.is_empty() {
        Value::Str(name.to_string())
    } else {
        let mut items = vec![Value::Str(name.to_string())];
        items.extend(params.into_iter().map(Value::Int));
        Value::List(items)
    }
}

/// Annotated-object form carrying type/dims/flags plus either raw or
/// compressed payload. Compression is the outermost transform: it runs on
/// the bytes exactly as they would otherwise hit the wire.
fn emit_annotated(
    out: &mut Vec<u8>,
    arr: &NumericArray,
    shaped: Option<ShapeKind>,
    zip: Option<&str>,
    opts: &CodecOptions,
    depth: usize,
) -> Result<()> {
    let (mut flat, flat_elems) = flat_payload(arr, shaped)?;

    let mut pairs: Vec<(String, Value)> = vec![
        (
            "_ArrayType_".to_string(),
            Value::Str(arr.elem.name().to_string()),
        ),
        (
            "_ArraySize_".to_string(),
            Value::List(arr.dims.iter().map(|&d| Value::Int(d as i64)).collect()),
        ),
    ];
    if arr.complex {
        pairs.push(("_ArrayIsComplex_".to_string(), Value::Bool(true)));
    }
    if arr.sparse.is_some() {
        pairs.push(("_ArrayIsSparse_".to_string(), Value::Bool(true)));
    }
    if let Some(kind) = shaped {
        debug!(?kind, "array stored shape-compacted");
        pairs.push(("_ArrayShape_".to_string(), shape_tag_value(kind)));
    }

    // MessagePack payloads stay little-endian by convention
    let swap = opts.endian == Endian::Big && opts.variant != FormatVariant::MessagePack;
    let zipped = match zip {
        Some(method) => {
            // wire-order bytes are what the decompressor must reproduce
            if swap {
                swap_flat(&mut flat, arr);
            }
            let packed =
                compress::maybe_compress(&flat, method, opts.compress_threshold, arr.elem_count())?;
            if swap {
                swap_flat(&mut flat, arr);
            }
            packed.map(|bytes| (method.to_string(), bytes))
        }
        None => None,
    };

    // nnz for sparse, stored element count (planes included) otherwise
    let zip_size = if arr.sparse.is_some() {
        flat_elems
    } else {
        flat.len() / arr.elem.width()
    };
    match zipped {
        Some((method, bytes)) => {
            debug!(method, raw = flat.len(), packed = bytes.len(), "array payload compressed");
            pairs.push(("_ArrayZipType_".to_string(), Value::Str(method)));
            pairs.push((
                "_ArrayZipSize_".to_string(),
                Value::List(vec![Value::Int(zip_size as i64)]),
            ));
            pairs.push(("_ArrayZipData_".to_string(), Value::Binary(bytes)));
        }
        None => {
            let data = if opts.variant == FormatVariant::MessagePack {
                // MessagePack has no typed arrays; payloads ride as bin
                // with little-endian elements by convention
                Value::Binary(flat)
            } else if let Some(s) = &arr.sparse {
                sparse_data_value(arr, s, opts)?
            } else {
                let storage = storage_elem(arr.elem, opts.variant);
                let count = flat.len() / storage.width();
                Value::Array(NumericArray::dense(
                    storage,
                    smallvec::smallvec![count],
                    flat,
                ))
            };
            pairs.push(("_ArrayData_".to_string(), data));
        }
    }

    // the wrapper map re-enters the encoder with the transforms disabled
    let inner_opts = CodecOptions {
        compression: None,
        use_shape: false,
        // the annotation lists (_ArraySize_, _ArrayZipSize_) must stay
        // plain lists for reassembly
        pack_lists: false,
        ..opts.clone()
    };
    match opts.variant {
        FormatVariant::MessagePack => msgpack::emit_value(out, &Value::Map(pairs), &inner_opts, depth),
        _ => emit_value(out, &Value::Map(pairs), &inner_opts, depth),
    }
}

fn swap_flat(flat: &mut [u8], arr: &NumericArray) {
    match &arr.sparse {
        Some(s) => {
            let idx_bytes = s.rows.len() * 8 * if s.cols.is_some() { 2 } else { 1 };
            markers::swap_elements(&mut flat[..idx_bytes], 8);
            markers::swap_elements(&mut flat[idx_bytes..], arr.elem.width());
        }
        None => markers::swap_elements(flat, arr.elem.width()),
    }
}

/// Non-zipped sparse payload: self-describing list of typed index runs and
/// the value run.
fn sparse_data_value(arr: &NumericArray, s: &crate::value::SparseData, opts: &CodecOptions) -> Result<Value> {
    let max_dim = arr.dims.iter().copied().max().unwrap_or(0) as u64;
    let idx_elem = markers::minimal_index(max_dim, opts.variant);
    let storage = storage_elem(arr.elem, opts.variant);

    let mut items = Vec::with_capacity(3);
    let mut rows = Vec::with_capacity(s.rows.len() * idx_elem.width());
    for r in &s.rows {
        write_elem_i64(*r as i64, idx_elem, &mut rows);
    }
    items.push(Value::Array(NumericArray::dense(
        idx_elem,
        smallvec::smallvec![s.rows.len()],
        rows,
    )));
    if let Some(cols) = &s.cols {
        let mut bytes = Vec::with_capacity(cols.len() * idx_elem.width());
        for c in cols {
            write_elem_i64(*c as i64, idx_elem, &mut bytes);
        }
        items.push(Value::Array(NumericArray::dense(
            idx_elem,
            smallvec::smallvec![cols.len()],
            bytes,
        )));
    }
    let planes = if arr.complex { 2 } else { 1 };
    items.push(Value::Array(NumericArray::dense(
        storage,
        smallvec::smallvec![s.nnz() * planes],
        s.values.clone(),
    )));
    Ok(Value::List(items))
}
