//! # Annotated-Array Reassembly
//!
//! An object carrying `_ArrayType_` and `_ArraySize_` is a serialized
//! [`NumericArray`], not a map. Reconstruction undoes the encode-side
//! transforms in reverse order: decompress first, then invert the shape
//! compaction, then rebuild sparse triplets; the complex flag needs no
//! rework because dense complex data is stored plane-by-plane already.

use super::Decoder;
use crate::config::{Endian, FormatVariant};
use crate::error::CodecError;
use crate::markers::{self, ELEM_BY_NAME};
use crate::shape::{self, ShapeKind};
use crate::value::{read_elem_i64, Dims, NumericArray, SparseData, Value};
use crate::compress;
use eyre::Result;
use tracing::trace;

fn mismatch(context: impl Into<String>) -> eyre::Report {
    CodecError::SchemaMismatch {
        context: context.into(),
    }
    .into()
}

/// Map finalizer: plain maps pass through, annotated ones re-assemble.
pub(crate) fn finish_object(dec: &mut Decoder, pairs: Vec<(String, Value)>) -> Result<Value> {
    let has = |k: &str| pairs.iter().any(|(name, _)| name == k);
    if has("_ArrayType_") && has("_ArraySize_") {
        return reassemble(dec, pairs).map(Value::Array);
    }
    Ok(Value::Map(pairs))
}

fn get<'a>(pairs: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    pairs.iter().find(|(name, _)| name == key).map(|(_, v)| v)
}

fn reassemble(dec: &mut Decoder, pairs: Vec<(String, Value)>) -> Result<NumericArray> {
    let at = dec.pos();
    let elem = match get(&pairs, "_ArrayType_") {
        Some(Value::Str(name)) => *ELEM_BY_NAME
            .get(name.as_str())
            .ok_or_else(|| dec.invalid(at, format!("unknown array type {name:?}")))?,
        _ => return Err(dec.invalid(at, "_ArrayType_ is not a string")),
    };
    let dims = match get(&pairs, "_ArraySize_") {
        Some(Value::List(items)) => {
            let mut dims = Dims::new();
            for item in items {
                let d = item
                    .as_i64()
                    .filter(|d| *d >= 0)
                    .ok_or_else(|| dec.invalid(at, "_ArraySize_ entry is not a length"))?;
                dims.push(d as usize);
            }
            dims
        }
        _ => return Err(dec.invalid(at, "_ArraySize_ is not a list")),
    };
    let complex = matches!(get(&pairs, "_ArrayIsComplex_"), Some(Value::Bool(true)));
    let is_sparse = matches!(get(&pairs, "_ArrayIsSparse_"), Some(Value::Bool(true)));
    let shaped = match get(&pairs, "_ArrayShape_") {
        None => None,
        Some(tag) => Some(parse_shape_tag(dec, tag)?),
    };
    if is_sparse && shaped.is_some() {
        return Err(CodecError::ShapeReconstruction {
            context: "array is flagged both sparse and shape-compacted".into(),
        }
        .into());
    }

    let elem_count: usize = dims.iter().product();
    let planes = if complex { 2 } else { 1 };
    let w = elem.width();
    let idx_runs = match dims.len() {
        1 => 1,
        2 => 2,
        _ if is_sparse => {
            return Err(dec.invalid(at, "sparse arrays are vectors or 2-D matrices"))
        }
        _ => 0,
    };

    // undo compression first; the decompressed image is in wire byte order
    let flat = match (get(&pairs, "_ArrayZipType_"), get(&pairs, "_ArrayZipData_")) {
        (Some(Value::Str(method)), Some(data)) => {
            // packed bytes arrive as `bin` under MessagePack, as a uint8
            // typed run otherwise
            let packed: &[u8] = match data {
                Value::Binary(bytes) => bytes,
                Value::Array(inner)
                    if inner.elem.width() == 1 && !inner.complex && inner.sparse.is_none() =>
                {
                    &inner.data
                }
                _ => return Err(dec.invalid(at, "_ArrayZipData_ is not a byte run")),
            };
            let mut flat = compress::decompress(packed, method)?;
            let nnz = zip_nnz(&pairs, &flat, is_sparse, idx_runs, w, planes, dec, at)?;
            // MessagePack payloads are little-endian by convention
            let swap = dec.opts().endian == Endian::Big
                && dec.opts().variant != FormatVariant::MessagePack;
            if swap {
                if is_sparse {
                    let idx_bytes = nnz * 8 * idx_runs;
                    markers::swap_elements(&mut flat[..idx_bytes], 8);
                    markers::swap_elements(&mut flat[idx_bytes..], w);
                } else {
                    markers::swap_elements(&mut flat, w);
                }
            }
            trace!(%method, packed = packed.len(), raw = flat.len(), "array payload decompressed");
            Some((flat, nnz))
        }
        (None, None) => None,
        _ => return Err(dec.invalid(at, "zip keys are incomplete")),
    };

    if is_sparse {
        let sparse = match flat {
            Some((flat, nnz)) => split_sparse_flat(&flat, nnz, idx_runs, w, planes)?,
            None => match get(&pairs, "_ArrayData_") {
                Some(Value::List(items)) => sparse_from_runs(dec, at, items, idx_runs, w, planes)?,
                Some(Value::Binary(flat)) => {
                    let nnz = derive_nnz(flat.len(), idx_runs, w, planes)?;
                    split_sparse_flat(flat, nnz, idx_runs, w, planes)?
                }
                _ => return Err(dec.invalid(at, "sparse _ArrayData_ has the wrong form")),
            },
        };
        return Ok(NumericArray {
            elem,
            dims,
            complex,
            sparse: Some(sparse),
            data: Vec::new(),
        });
    }

    let flat = match flat {
        Some((flat, _)) => flat,
        None => match get(&pairs, "_ArrayData_") {
            Some(Value::Array(inner)) => {
                if inner.elem.width() != w || inner.complex || inner.sparse.is_some() {
                    return Err(mismatch("inner payload array disagrees with _ArrayType_"));
                }
                inner.data.clone()
            }
            Some(Value::Binary(bytes)) => bytes.clone(),
            _ => return Err(dec.invalid(at, "_ArrayData_ has the wrong form")),
        },
    };

    let data = match shaped {
        Some(kind) => shape::decode(&flat, kind, elem, &dims, complex)?,
        None => {
            if flat.len() != elem_count * w * planes {
                return Err(mismatch(format!(
                    "dense payload is {} byte(s), dims imply {}",
                    flat.len(),
                    elem_count * w * planes
                )));
            }
            flat
        }
    };
    Ok(NumericArray {
        elem,
        dims,
        complex,
        sparse: None,
        data,
    })
}

/// `_ArrayShape_` is either a bare name or `[name, k...]` for banded kinds.
fn parse_shape_tag(dec: &Decoder, tag: &Value) -> Result<ShapeKind> {
    let at = dec.pos();
    let (name, params) = match tag {
        Value::Str(name) => (name.as_str(), Vec::new()),
        Value::List(items) => {
            let name = items
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| dec.invalid(at, "_ArrayShape_ list lacks a name"))?;
            let mut params = Vec::with_capacity(items.len() - 1);
            for item in &items[1..] {
                let k = item
                    .as_i64()
                    .filter(|k| *k >= 0)
                    .ok_or_else(|| dec.invalid(at, "_ArrayShape_ bandwidth is not a count"))?;
                params.push(k);
            }
            (name, params)
        }
        _ => return Err(dec.invalid(at, "_ArrayShape_ has the wrong form")),
    };
    ShapeKind::from_tag(name, &params)
}

/// Nonzero count of a zipped sparse payload, cross-checked against
/// `_ArrayZipSize_` when present.
#[allow(clippy::too_many_arguments)]
fn zip_nnz(
    pairs: &[(String, Value)],
    flat: &[u8],
    is_sparse: bool,
    idx_runs: usize,
    w: usize,
    planes: usize,
    dec: &Decoder,
    at: usize,
) -> Result<usize> {
    let declared = match get(pairs, "_ArrayZipSize_") {
        Some(Value::List(items)) => match items.as_slice() {
            [single] => single
                .as_i64()
                .filter(|n| *n >= 0)
                .map(|n| n as usize)
                .ok_or_else(|| dec.invalid(at, "_ArrayZipSize_ entry is not a count"))?,
            _ => return Err(dec.invalid(at, "_ArrayZipSize_ is not a single count")),
        },
        Some(_) => return Err(dec.invalid(at, "_ArrayZipSize_ has the wrong form")),
        None if is_sparse => return derive_nnz(flat.len(), idx_runs, w, planes),
        None => {
            if flat.len() % w != 0 {
                return Err(mismatch(format!(
                    "decompressed payload of {} byte(s) is not element-aligned",
                    flat.len()
                )));
            }
            return Ok(flat.len() / w);
        }
    };
    if is_sparse {
        let want = declared * (8 * idx_runs + w * planes);
        if flat.len() != want {
            return Err(mismatch(format!(
                "decompressed sparse payload is {} byte(s), nnz {declared} implies {want}",
                flat.len()
            )));
        }
    } else if flat.len() != declared * w {
        return Err(mismatch(format!(
            "decompressed payload is {} byte(s), _ArrayZipSize_ implies {}",
            flat.len(),
            declared * w
        )));
    }
    Ok(declared)
}

/// Back-derives nnz from the flat byte length when no count was carried.
fn derive_nnz(len: usize, idx_runs: usize, w: usize, planes: usize) -> Result<usize> {
    let per = 8 * idx_runs + w * planes;
    if per == 0 || len % per != 0 {
        return Err(mismatch(format!(
            "sparse payload of {len} byte(s) is not a multiple of {per}"
        )));
    }
    Ok(len / per)
}

/// Splits the flat sparse image (u64 index runs, then values).
fn split_sparse_flat(
    flat: &[u8],
    nnz: usize,
    idx_runs: usize,
    w: usize,
    planes: usize,
) -> Result<SparseData> {
    let idx_bytes = nnz * 8 * idx_runs;
    if flat.len() != idx_bytes + nnz * w * planes {
        return Err(mismatch(format!(
            "sparse payload is {} byte(s), nnz {nnz} implies {}",
            flat.len(),
            idx_bytes + nnz * w * planes
        )));
    }
    let run = |s: &[u8]| -> Vec<u64> {
        s.chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap_or_default()))
            .collect()
    };
    let rows = run(&flat[..nnz * 8]);
    let cols = (idx_runs == 2).then(|| run(&flat[nnz * 8..idx_bytes]));
    Ok(SparseData {
        rows,
        cols,
        values: flat[idx_bytes..].to_vec(),
    })
}

/// Self-describing sparse payload: typed index runs then the value run.
fn sparse_from_runs(
    dec: &Decoder,
    at: usize,
    items: &[Value],
    idx_runs: usize,
    w: usize,
    planes: usize,
) -> Result<SparseData> {
    if items.len() != idx_runs + 1 {
        return Err(dec.invalid(
            at,
            format!("sparse payload has {} run(s), expected {}", items.len(), idx_runs + 1),
        ));
    }
    let index_run = |v: &Value| -> Result<Vec<u64>> {
        let Value::Array(arr) = v else {
            return Err(dec.invalid(at, "sparse index run is not a typed array"));
        };
        if !arr.elem.is_integer() {
            return Err(dec.invalid(at, "sparse index run is not integer-typed"));
        }
        let iw = arr.elem.width();
        Ok(arr
            .data
            .chunks_exact(iw)
            .map(|c| read_elem_i64(c, arr.elem).unwrap_or(0) as u64)
            .collect())
    };
    let rows = index_run(&items[0])?;
    let cols = if idx_runs == 2 {
        let cols = index_run(&items[1])?;
        if cols.len() != rows.len() {
            return Err(mismatch("sparse index runs differ in length"));
        }
        Some(cols)
    } else {
        None
    };
    let Value::Array(values) = &items[idx_runs] else {
        return Err(dec.invalid(at, "sparse value run is not a typed array"));
    };
    if values.elem.width() != w {
        return Err(mismatch("sparse value run width disagrees with _ArrayType_"));
    }
    if values.data.len() != rows.len() * w * planes {
        return Err(mismatch(format!(
            "sparse value run is {} byte(s), nnz implies {}",
            values.data.len(),
            rows.len() * w * planes
        )));
    }
    Ok(SparseData {
        rows,
        cols,
        values: values.data.clone(),
    })
}
