//! # Matrix Shape Compaction Codec
//!
//! Detects and (de)codes compact representations of structured 2-D numeric
//! matrices. The codec is a pure function pair with no shared state; it
//! operates bytewise on element planes, so one implementation covers every
//! element type, and complex matrices are shape-coded plane by plane.
//!
//! ## Classification Priority
//!
//! | Order | Test | Tag |
//! |-------|------|-----|
//! | 1 | upper and lower bandwidth both 0 | `diag` |
//! | 2 | one-sided, full bandwidth | `upper` / `lower` |
//! | 3 | one-sided, partial bandwidth | `upperband(k)` / `lowerband(k)` |
//! | 4 | two-sided, symmetric / Hermitian | `uppersymm` / `upperherm` |
//! | 5 | two-sided, partial bandwidth | `band(ku,kl)` |
//! | 6 | constant along every diagonal | `toeplitz` |
//! | 7 | none of the above | dense fallback |
//!
//! ## Stored Payloads
//!
//! | Tag | Payload (per plane) |
//! |-----|---------------------|
//! | `diag` | the main diagonal, `min(r,c)` elements |
//! | `upper`/`lower`(+`symm`/`herm`) | the triangle row-major, diagonal included |
//! | `band(ku,kl)` | `ku+kl+1` diagonals, in increasing diagonal offset |
//! | `toeplitz` | first row, then first column below the corner |
//!
//! Decoding is the exact inverse; the `*symm`/`*herm` variants mirror the
//! stored triangle and keep the stored diagonal as-is (never doubled). The
//! `*herm` mirror negates the imaginary plane.

use crate::error::CodecError;
use crate::markers::ElemType;
use crate::value::NumericArray;
use eyre::Result;
use tracing::trace;

/// Compact-shape tag plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Diag,
    Upper,
    Lower,
    UpperSymm,
    LowerSymm,
    UpperHerm,
    LowerHerm,
    UpperBand(usize),
    LowerBand(usize),
    Band(usize, usize),
    Toeplitz,
}

impl ShapeKind {
    /// Wire tag name and numeric parameters for the `_ArrayShape_` field.
    pub fn tag(&self) -> (&'static str, Vec<i64>) {
        match self {
            ShapeKind::Diag => ("diag", vec![]),
            ShapeKind::Upper => ("upper", vec![]),
            ShapeKind::Lower => ("lower", vec![]),
            ShapeKind::UpperSymm => ("uppersymm", vec![]),
            ShapeKind::LowerSymm => ("lowersymm", vec![]),
            ShapeKind::UpperHerm => ("upperherm", vec![]),
            ShapeKind::LowerHerm => ("lowerherm", vec![]),
            ShapeKind::UpperBand(k) => ("upperband", vec![*k as i64]),
            ShapeKind::LowerBand(k) => ("lowerband", vec![*k as i64]),
            ShapeKind::Band(ku, kl) => ("band", vec![*ku as i64, *kl as i64]),
            ShapeKind::Toeplitz => ("toeplitz", vec![]),
        }
    }

    /// Inverse of [`ShapeKind::tag`].
    pub fn from_tag(name: &str, params: &[i64]) -> Result<ShapeKind> {
        let kind = match (name, params) {
            ("diag", []) => ShapeKind::Diag,
            ("upper", []) => ShapeKind::Upper,
            ("lower", []) => ShapeKind::Lower,
            ("uppersymm", []) => ShapeKind::UpperSymm,
            ("lowersymm", []) => ShapeKind::LowerSymm,
            ("upperherm", []) => ShapeKind::UpperHerm,
            ("lowerherm", []) => ShapeKind::LowerHerm,
            ("upperband", [k]) if *k >= 0 => ShapeKind::UpperBand(*k as usize),
            ("lowerband", [k]) if *k >= 0 => ShapeKind::LowerBand(*k as usize),
            ("band", [ku, kl]) if *ku >= 0 && *kl >= 0 => {
                ShapeKind::Band(*ku as usize, *kl as usize)
            }
            ("toeplitz", []) => ShapeKind::Toeplitz,
            _ => {
                return Err(CodecError::ShapeReconstruction {
                    context: format!("unknown shape tag {name:?} with {} param(s)", params.len()),
                }
                .into());
            }
        };
        Ok(kind)
    }

    /// Elements stored per plane for an `r x c` matrix under this shape.
    pub fn stored_count(&self, r: usize, c: usize) -> usize {
        match *self {
            ShapeKind::Diag => r.min(c),
            ShapeKind::Upper | ShapeKind::UpperSymm | ShapeKind::UpperHerm => {
                (0..r).map(|i| c.saturating_sub(i)).sum()
            }
            ShapeKind::Lower | ShapeKind::LowerSymm | ShapeKind::LowerHerm => {
                (0..r).map(|i| (i + 1).min(c)).sum()
            }
            ShapeKind::UpperBand(k) => ShapeKind::Band(k, 0).stored_count(r, c),
            ShapeKind::LowerBand(k) => ShapeKind::Band(0, k).stored_count(r, c),
            ShapeKind::Band(ku, kl) => {
                let mut n = r.min(c);
                for d in 1..=ku {
                    n += r.min(c.saturating_sub(d));
                }
                for k in 1..=kl {
                    n += r.saturating_sub(k).min(c);
                }
                n
            }
            ShapeKind::Toeplitz => c + r.saturating_sub(1),
        }
    }
}

#[inline]
fn el<'a>(plane: &'a [u8], w: usize, c: usize, i: usize, j: usize) -> &'a [u8] {
    &plane[(i * c + j) * w..(i * c + j) * w + w]
}

#[inline]
fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// Writes the additive negation of one little-endian element into `out`.
fn negate_element(le: &[u8], elem: ElemType, out: &mut [u8]) {
    out.copy_from_slice(le);
    if elem.is_float() {
        // IEEE sign bit lives in the top bit of the last LE byte.
        let last = out.len() - 1;
        out[last] ^= 0x80;
    } else {
        let v = crate::value::read_elem_i64(le, elem).unwrap_or(0);
        let mut buf = Vec::with_capacity(elem.width());
        crate::value::write_elem_i64(v.wrapping_neg(), elem, &mut buf);
        out.copy_from_slice(&buf);
    }
}

fn neg_eq(a: &[u8], b: &[u8], elem: ElemType) -> bool {
    // +0.0 and -0.0 differ bytewise; treat a zero pair as negations
    if is_zero(a) && is_zero(b) {
        return true;
    }
    let mut tmp = [0u8; 8];
    let tmp = &mut tmp[..elem.width()];
    negate_element(b, elem, tmp);
    a == &*tmp
}

struct Planes<'a> {
    re: &'a [u8],
    im: Option<&'a [u8]>,
    w: usize,
    elem: ElemType,
    r: usize,
    c: usize,
}

impl<'a> Planes<'a> {
    fn nonzero(&self, i: usize, j: usize) -> bool {
        !is_zero(el(self.re, self.w, self.c, i, j))
            || self
                .im
                .map(|im| !is_zero(el(im, self.w, self.c, i, j)))
                .unwrap_or(false)
    }

    fn eq(&self, i: usize, j: usize, i2: usize, j2: usize) -> bool {
        el(self.re, self.w, self.c, i, j) == el(self.re, self.w, self.c, i2, j2)
            && self
                .im
                .map(|im| el(im, self.w, self.c, i, j) == el(im, self.w, self.c, i2, j2))
                .unwrap_or(true)
    }

    fn symmetric(&self) -> bool {
        for i in 0..self.r {
            for j in (i + 1)..self.c {
                if !self.eq(i, j, j, i) {
                    return false;
                }
            }
        }
        true
    }

    fn hermitian(&self) -> bool {
        let Some(im) = self.im else { return false };
        for i in 0..self.r {
            // a Hermitian diagonal is real
            if !is_zero(el(im, self.w, self.c, i, i)) {
                return false;
            }
            for j in (i + 1)..self.c {
                if el(self.re, self.w, self.c, i, j) != el(self.re, self.w, self.c, j, i) {
                    return false;
                }
                if !neg_eq(
                    el(im, self.w, self.c, i, j),
                    el(im, self.w, self.c, j, i),
                    self.elem,
                ) {
                    return false;
                }
            }
        }
        true
    }

    fn toeplitz(&self) -> bool {
        for i in 1..self.r {
            for j in 1..self.c {
                if !self.eq(i, j, i - 1, j - 1) {
                    return false;
                }
            }
        }
        true
    }
}

/// Classifies a dense 2-D array, returning `None` when no compact shape
/// applies (dense fallback) or the array is not an eligible matrix.
pub fn detect(arr: &NumericArray) -> Option<ShapeKind> {
    if arr.dims.len() != 2 || arr.sparse.is_some() {
        return None;
    }
    let (r, c) = (arr.dims[0], arr.dims[1]);
    if r < 2 || c < 2 {
        return None;
    }
    let planes = Planes {
        re: arr.real_plane(),
        im: arr.imag_plane(),
        w: arr.elem.width(),
        elem: arr.elem,
        r,
        c,
    };

    // One scan for both bandwidths.
    let (mut ku, mut kl) = (0usize, 0usize);
    for i in 0..r {
        for j in 0..c {
            if planes.nonzero(i, j) {
                if j > i {
                    ku = ku.max(j - i);
                } else if i > j {
                    kl = kl.max(i - j);
                }
            }
        }
    }

    let kind = if ku == 0 && kl == 0 {
        Some(ShapeKind::Diag)
    } else if kl == 0 {
        if ku == c - 1 {
            Some(ShapeKind::Upper)
        } else {
            Some(ShapeKind::UpperBand(ku))
        }
    } else if ku == 0 {
        if kl == r - 1 {
            Some(ShapeKind::Lower)
        } else {
            Some(ShapeKind::LowerBand(kl))
        }
    } else if r == c && planes.hermitian() {
        Some(ShapeKind::UpperHerm)
    } else if r == c && planes.symmetric() {
        Some(ShapeKind::UpperSymm)
    } else if ku < c - 1 || kl < r - 1 {
        Some(ShapeKind::Band(ku, kl))
    } else if planes.toeplitz() {
        Some(ShapeKind::Toeplitz)
    } else {
        None
    };
    trace!(?kind, r, c, ku, kl, "shape detection");
    kind
}

fn encode_plane(plane: &[u8], elem: ElemType, r: usize, c: usize, kind: ShapeKind, out: &mut Vec<u8>) {
    let w = elem.width();
    // one-sided bands share the general banded layout
    let kind = match kind {
        ShapeKind::UpperBand(k) => ShapeKind::Band(k, 0),
        ShapeKind::LowerBand(k) => ShapeKind::Band(0, k),
        k => k,
    };
    let mut push = |i: usize, j: usize| out.extend_from_slice(el(plane, w, c, i, j));
    match kind {
        ShapeKind::Diag => {
            for i in 0..r.min(c) {
                push(i, i);
            }
        }
        ShapeKind::Upper | ShapeKind::UpperSymm | ShapeKind::UpperHerm => {
            for i in 0..r {
                for j in i..c {
                    push(i, j);
                }
            }
        }
        ShapeKind::Lower | ShapeKind::LowerSymm | ShapeKind::LowerHerm => {
            for i in 0..r {
                for j in 0..(i + 1).min(c) {
                    push(i, j);
                }
            }
        }
        ShapeKind::UpperBand(_) | ShapeKind::LowerBand(_) => unreachable!(),
        ShapeKind::Band(ku, kl) => {
            // diagonal-major, from the lowest subdiagonal up
            for d in -(kl as isize)..=(ku as isize) {
                if d >= 0 {
                    let d = d as usize;
                    for i in 0..r.min(c.saturating_sub(d)) {
                        push(i, i + d);
                    }
                } else {
                    let k = (-d) as usize;
                    for i in 0..r.saturating_sub(k).min(c) {
                        push(i + k, i);
                    }
                }
            }
        }
        ShapeKind::Toeplitz => {
            for j in 0..c {
                push(0, j);
            }
            for i in 1..r {
                push(i, 0);
            }
        }
    }
}

/// Emits the minimal payload for `arr` under `kind`: the real plane's
/// compact form, then the imaginary plane's when the array is complex.
pub fn encode(arr: &NumericArray, kind: ShapeKind) -> Result<Vec<u8>> {
    eyre::ensure!(arr.dims.len() == 2, "shape codec requires a 2-D array");
    let (r, c) = (arr.dims[0], arr.dims[1]);
    let mut out = Vec::with_capacity(
        kind.stored_count(r, c) * arr.elem.width() * if arr.complex { 2 } else { 1 },
    );
    encode_plane(arr.real_plane(), arr.elem, r, c, kind, &mut out);
    if let Some(im) = arr.imag_plane() {
        encode_plane(im, arr.elem, r, c, kind, &mut out);
    }
    Ok(out)
}

fn decode_plane(
    payload: &[u8],
    elem: ElemType,
    r: usize,
    c: usize,
    kind: ShapeKind,
    imag_plane: bool,
) -> Vec<u8> {
    let w = elem.width();
    let kind = match kind {
        ShapeKind::UpperBand(k) => ShapeKind::Band(k, 0),
        ShapeKind::LowerBand(k) => ShapeKind::Band(0, k),
        k => k,
    };
    let mut plane = vec![0u8; r * c * w];
    let mut cursor = 0usize;
    let mut take = |plane: &mut Vec<u8>, i: usize, j: usize| {
        plane[(i * c + j) * w..(i * c + j) * w + w].copy_from_slice(&payload[cursor..cursor + w]);
        cursor += w;
    };
    match kind {
        ShapeKind::Diag => {
            for i in 0..r.min(c) {
                take(&mut plane, i, i);
            }
        }
        ShapeKind::Upper | ShapeKind::UpperSymm | ShapeKind::UpperHerm => {
            for i in 0..r {
                for j in i..c {
                    take(&mut plane, i, j);
                }
            }
        }
        ShapeKind::Lower | ShapeKind::LowerSymm | ShapeKind::LowerHerm => {
            for i in 0..r {
                for j in 0..(i + 1).min(c) {
                    take(&mut plane, i, j);
                }
            }
        }
        ShapeKind::UpperBand(_) | ShapeKind::LowerBand(_) => unreachable!(),
        ShapeKind::Band(ku, kl) => {
            for d in -(kl as isize)..=(ku as isize) {
                if d >= 0 {
                    let d = d as usize;
                    for i in 0..r.min(c.saturating_sub(d)) {
                        take(&mut plane, i, i + d);
                    }
                } else {
                    let k = (-d) as usize;
                    for i in 0..r.saturating_sub(k).min(c) {
                        take(&mut plane, i + k, i);
                    }
                }
            }
        }
        ShapeKind::Toeplitz => {
            let mut first_row = vec![0u8; c * w];
            first_row.copy_from_slice(&payload[..c * w]);
            let rest = &payload[c * w..];
            for i in 0..r {
                for j in 0..c {
                    let src: &[u8] = if j >= i {
                        &first_row[(j - i) * w..(j - i + 1) * w]
                    } else {
                        let k = i - j - 1;
                        &rest[k * w..(k + 1) * w]
                    };
                    plane[(i * c + j) * w..(i * c + j) * w + w].copy_from_slice(src);
                }
            }
            return plane;
        }
    }

    // mirror the stored triangle for the symmetric/Hermitian variants
    match kind {
        ShapeKind::UpperSymm | ShapeKind::UpperHerm => {
            for i in 0..r {
                for j in (i + 1)..c {
                    let (src_i, src_j) = (i, j);
                    mirror(&mut plane, w, c, src_i, src_j, j, i, elem, imag_plane && kind == ShapeKind::UpperHerm);
                }
            }
        }
        ShapeKind::LowerSymm | ShapeKind::LowerHerm => {
            for i in 0..r {
                for j in 0..i.min(c) {
                    mirror(&mut plane, w, c, i, j, j, i, elem, imag_plane && kind == ShapeKind::LowerHerm);
                }
            }
        }
        _ => {}
    }
    plane
}

#[allow(clippy::too_many_arguments)]
fn mirror(
    plane: &mut [u8],
    w: usize,
    c: usize,
    si: usize,
    sj: usize,
    di: usize,
    dj: usize,
    elem: ElemType,
    negate: bool,
) {
    let src_off = (si * c + sj) * w;
    let dst_off = (di * c + dj) * w;
    let mut tmp = [0u8; 8];
    let tmp = &mut tmp[..w];
    tmp.copy_from_slice(&plane[src_off..src_off + w]);
    if negate && !is_zero(tmp) {
        let mut neg = [0u8; 8];
        let neg = &mut neg[..w];
        negate_element(tmp, elem, neg);
        plane[dst_off..dst_off + w].copy_from_slice(neg);
    } else {
        plane[dst_off..dst_off + w].copy_from_slice(tmp);
    }
}

/// Reconstructs the dense payload (real plane, then imaginary plane when
/// `complex`) from a compact shape payload. The exact inverse of [`encode`].
pub fn decode(
    payload: &[u8],
    kind: ShapeKind,
    elem: ElemType,
    dims: &[usize],
    complex: bool,
) -> Result<Vec<u8>> {
    if dims.len() != 2 {
        return Err(CodecError::ShapeReconstruction {
            context: format!("shape tag on a {}-D array", dims.len()),
        }
        .into());
    }
    let (r, c) = (dims[0], dims[1]);
    if matches!(
        kind,
        ShapeKind::UpperSymm | ShapeKind::LowerSymm | ShapeKind::UpperHerm | ShapeKind::LowerHerm
    ) && r != c
    {
        return Err(CodecError::ShapeReconstruction {
            context: format!("{kind:?} requires a square matrix, got {r}x{c}"),
        }
        .into());
    }
    let per_plane = kind.stored_count(r, c) * elem.width();
    let expected = per_plane * if complex { 2 } else { 1 };
    if payload.len() != expected {
        return Err(CodecError::ShapeReconstruction {
            context: format!(
                "{:?} on {r}x{c} expects {expected} payload byte(s), got {}",
                kind,
                payload.len()
            ),
        }
        .into());
    }
    let mut out = decode_plane(&payload[..per_plane], elem, r, c, kind, false);
    if complex {
        out.extend(decode_plane(&payload[per_plane..], elem, r, c, kind, true));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NumericArray;

    fn mat(r: usize, c: usize, f: impl Fn(usize, usize) -> f64) -> NumericArray {
        let mut v = Vec::with_capacity(r * c);
        for i in 0..r {
            for j in 0..c {
                v.push(f(i, j));
            }
        }
        NumericArray::from_f64s(&[r, c], &v)
    }

    fn roundtrip(arr: &NumericArray, kind: ShapeKind) {
        let payload = encode(arr, kind).unwrap();
        let dense = decode(&payload, kind, arr.elem, &arr.dims, arr.complex).unwrap();
        assert_eq!(dense, arr.data, "{kind:?} did not invert");
    }

    #[test]
    fn diagonal_matrix_classifies_and_inverts() {
        let m = mat(6, 6, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        assert_eq!(detect(&m), Some(ShapeKind::Diag));
        roundtrip(&m, ShapeKind::Diag);
        let payload = encode(&m, ShapeKind::Diag).unwrap();
        assert_eq!(payload.len(), 6 * 8);
    }

    #[test]
    fn banded_matrix_detects_ku1_kl2() {
        let m = mat(6, 6, |i, j| {
            let (i, j) = (i as i64, j as i64);
            if j - i == 1 || (i - j >= 0 && i - j <= 2) {
                (i + j + 1) as f64
            } else {
                0.0
            }
        });
        assert_eq!(detect(&m), Some(ShapeKind::Band(1, 2)));
        roundtrip(&m, ShapeKind::Band(1, 2));
    }

    #[test]
    fn one_sided_bands_and_triangles() {
        let upper = mat(5, 5, |i, j| if j >= i { 1.0 + (i * 5 + j) as f64 } else { 0.0 });
        assert_eq!(detect(&upper), Some(ShapeKind::Upper));
        roundtrip(&upper, ShapeKind::Upper);

        let ub = mat(5, 5, |i, j| if j >= i && j - i <= 2 { 3.0 } else { 0.0 });
        assert_eq!(detect(&ub), Some(ShapeKind::UpperBand(2)));
        roundtrip(&ub, ShapeKind::UpperBand(2));

        let lower = mat(4, 4, |i, j| if j <= i { -2.5 } else { 0.0 });
        assert_eq!(detect(&lower), Some(ShapeKind::Lower));
        roundtrip(&lower, ShapeKind::Lower);
    }

    #[test]
    fn symmetric_matrix_stores_one_triangle() {
        let m = mat(4, 4, |i, j| (i * j + i + j + 1) as f64);
        assert_eq!(detect(&m), Some(ShapeKind::UpperSymm));
        let payload = encode(&m, ShapeKind::UpperSymm).unwrap();
        assert_eq!(payload.len(), 10 * 8);
        roundtrip(&m, ShapeKind::UpperSymm);
    }

    #[test]
    fn hermitian_matrix_negates_imag_mirror() {
        let re = mat(3, 3, |i, j| (i * j + 1) as f64);
        let im = mat(3, 3, |i, j| {
            if i == j {
                0.0
            } else if j > i {
                (i + j) as f64
            } else {
                -((i + j) as f64)
            }
        });
        let mut arr = re.clone();
        arr.data.extend_from_slice(&im.data);
        arr.complex = true;
        assert_eq!(detect(&arr), Some(ShapeKind::UpperHerm));
        roundtrip(&arr, ShapeKind::UpperHerm);
    }

    #[test]
    fn toeplitz_matrix_stores_first_row_and_column() {
        let m = mat(4, 5, |i, j| (10 + j as i64 - i as i64) as f64);
        assert_eq!(detect(&m), Some(ShapeKind::Toeplitz));
        let payload = encode(&m, ShapeKind::Toeplitz).unwrap();
        assert_eq!(payload.len(), (5 + 3) * 8);
        roundtrip(&m, ShapeKind::Toeplitz);
    }

    #[test]
    fn dense_matrix_falls_back_to_none() {
        let m = mat(3, 3, |i, j| (i * 31 + j * 7 + 1) as f64);
        assert_eq!(detect(&m), None);
    }

    #[test]
    fn wrong_payload_length_is_shape_reconstruction_error() {
        let err = decode(&[0u8; 7], ShapeKind::Diag, ElemType::Float64, &[3, 3], false)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::CodecError>(),
            Some(crate::error::CodecError::ShapeReconstruction { .. })
        ));
    }

    #[test]
    fn tags_round_trip() {
        for kind in [
            ShapeKind::Diag,
            ShapeKind::UpperSymm,
            ShapeKind::UpperBand(3),
            ShapeKind::Band(1, 2),
            ShapeKind::Toeplitz,
        ] {
            let (name, params) = kind.tag();
            assert_eq!(ShapeKind::from_tag(name, &params).unwrap(), kind);
        }
    }
}
