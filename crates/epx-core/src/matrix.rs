//! Size-agnostic sparse matrix edits.
//!
//! The solver assembles block systems (KKT conditions, convex hulls, padded
//! constraint sets) out of many small sparse pieces. Everything here returns
//! a fresh matrix instead of mutating in place, and every function tolerates
//! zero-dimension inputs, which show up routinely as empty constraint blocks.
//!
//! Assembly goes through [`sprs::TriMat`] batch insertion and a final
//! `to_csr()`, which is considerably faster than repeated structural inserts
//! into a compressed matrix.

use crate::{EpxError, EpxResult, SpMat};
use sprs::TriMat;

/// An all-zero matrix of the given shape.
pub fn zeros(n_rows: usize, n_cols: usize) -> SpMat {
    SpMat::zero((n_rows, n_cols))
}

/// Returns a fresh `n_rows` x `n_cols` matrix holding the overlapping
/// entries of `m`. Growing pads with structural zeros; shrinking drops
/// out-of-range entries.
pub fn resized(m: &SpMat, n_rows: usize, n_cols: usize) -> SpMat {
    let mut tri = TriMat::new((n_rows, n_cols));
    for (&v, (r, c)) in m.iter() {
        if r < n_rows && c < n_cols {
            tri.add_triplet(r, c, v);
        }
    }
    tri.to_csr()
}

/// Vector analogue of [`resized`].
pub fn resized_vec(v: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n];
    let keep = v.len().min(n);
    out[..keep].copy_from_slice(&v[..keep]);
    out
}

/// Stacks matrices vertically. All parts must agree on the column count,
/// except zero-row parts, which are skipped.
pub fn vstack(parts: &[&SpMat]) -> EpxResult<SpMat> {
    let n_cols = parts
        .iter()
        .find(|m| m.rows() > 0)
        .map(|m| m.cols())
        .unwrap_or_else(|| parts.first().map(|m| m.cols()).unwrap_or(0));
    let mut n_rows = 0;
    let mut triplets = Vec::new();
    for m in parts {
        if m.rows() == 0 {
            continue;
        }
        if m.cols() != n_cols {
            return Err(EpxError::InvalidShape(format!(
                "vstack: column mismatch {} != {}",
                m.cols(),
                n_cols
            )));
        }
        for (&v, (r, c)) in m.iter() {
            triplets.push((r + n_rows, c, v));
        }
        n_rows += m.rows();
    }
    let mut tri = TriMat::new((n_rows, n_cols));
    for (r, c, v) in triplets {
        tri.add_triplet(r, c, v);
    }
    Ok(tri.to_csr())
}

/// Stacks matrices horizontally. All parts must agree on the row count;
/// zero-row parts contribute columns only.
pub fn hstack(parts: &[&SpMat]) -> EpxResult<SpMat> {
    let n_rows = parts.iter().map(|m| m.rows()).max().unwrap_or(0);
    let mut n_cols = 0;
    let mut triplets = Vec::new();
    for m in parts {
        if m.rows() != n_rows && m.rows() != 0 {
            return Err(EpxError::InvalidShape(format!(
                "hstack: row mismatch {} != {}",
                m.rows(),
                n_rows
            )));
        }
        for (&v, (r, c)) in m.iter() {
            triplets.push((r, c + n_cols, v));
        }
        n_cols += m.cols();
    }
    let mut tri = TriMat::new((n_rows, n_cols));
    for (r, c, v) in triplets {
        tri.add_triplet(r, c, v);
    }
    Ok(tri.to_csr())
}

/// Adds every entry of `m` into `tri`, offset by (`r0`, `c0`).
pub fn scatter(tri: &mut TriMat<f64>, r0: usize, c0: usize, m: &SpMat) {
    for (&v, (r, c)) in m.iter() {
        tri.add_triplet(r0 + r, c0 + c, v);
    }
}

/// Adds the `n_rows` x `n_cols` window of `m` anchored at (`src_r`, `src_c`)
/// into `tri`, offset by (`r0`, `c0`).
pub fn scatter_window(
    tri: &mut TriMat<f64>,
    r0: usize,
    c0: usize,
    m: &SpMat,
    src_r: usize,
    src_c: usize,
    n_rows: usize,
    n_cols: usize,
) {
    if n_rows == 0 || n_cols == 0 {
        return;
    }
    for (&v, (r, c)) in m.iter() {
        if r >= src_r && r < src_r + n_rows && c >= src_c && c < src_c + n_cols {
            tri.add_triplet(r0 + r - src_r, c0 + c - src_c, v);
        }
    }
}

/// Transpose as a fresh CSR matrix.
pub fn transpose(m: &SpMat) -> SpMat {
    let mut tri = TriMat::new((m.cols(), m.rows()));
    for (&v, (r, c)) in m.iter() {
        tri.add_triplet(c, r, v);
    }
    tri.to_csr()
}

/// Entry-wise negation.
pub fn neg(m: &SpMat) -> SpMat {
    let mut tri = TriMat::new((m.rows(), m.cols()));
    for (&v, (r, c)) in m.iter() {
        tri.add_triplet(r, c, -v);
    }
    tri.to_csr()
}

/// Sparse matrix times dense vector.
pub fn mul_vec(m: &SpMat, v: &[f64]) -> EpxResult<Vec<f64>> {
    if m.cols() != v.len() {
        return Err(EpxError::InvalidShape(format!(
            "mul_vec: {} columns against a vector of length {}",
            m.cols(),
            v.len()
        )));
    }
    let mut out = vec![0.0; m.rows()];
    for (&val, (r, c)) in m.iter() {
        out[r] += val * v[c];
    }
    Ok(out)
}

/// Reads one entry (0.0 when structurally absent).
pub fn get(m: &SpMat, r: usize, c: usize) -> f64 {
    m.get(r, c).copied().unwrap_or(0.0)
}

/// True when every entry of `m` is within `tol` of zero.
pub fn is_zero(m: &SpMat, tol: f64) -> bool {
    m.iter().all(|(&v, _)| v.abs() <= tol)
}

/// Largest absolute entry-wise difference between two equally shaped
/// matrices.
pub fn max_abs_diff(a: &SpMat, b: &SpMat) -> f64 {
    debug_assert_eq!(a.shape(), b.shape());
    let mut dense = std::collections::HashMap::new();
    for (&v, rc) in a.iter() {
        *dense.entry(rc).or_insert(0.0) += v;
    }
    for (&v, rc) in b.iter() {
        *dense.entry(rc).or_insert(0.0) -= v;
    }
    dense
        .values()
        .fold(0.0_f64, |acc, v: &f64| acc.max(v.abs()))
}

/// True when two equally sized vectors agree within `tol`.
pub fn vecs_close(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
        let mut tri = TriMat::new(shape);
        for &(r, c, v) in entries {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    #[test]
    fn resized_grows_with_zeros() {
        let m = mat(&[(0, 0, 1.0), (1, 2, -2.0)], (2, 3));
        let r = resized(&m, 4, 5);
        assert_eq!(r.shape(), (4, 5));
        assert_eq!(get(&r, 0, 0), 1.0);
        assert_eq!(get(&r, 1, 2), -2.0);
        assert_eq!(r.nnz(), 2);
    }

    #[test]
    fn resized_shrinks_dropping_entries() {
        let m = mat(&[(0, 0, 1.0), (2, 2, 5.0)], (3, 3));
        let r = resized(&m, 2, 2);
        assert_eq!(r.shape(), (2, 2));
        assert_eq!(r.nnz(), 1);
    }

    #[test]
    fn resized_handles_empty_input() {
        let m = zeros(0, 0);
        let r = resized(&m, 3, 2);
        assert_eq!(r.shape(), (3, 2));
        assert_eq!(r.nnz(), 0);
    }

    #[test]
    fn stacking_round_trip() {
        let a = mat(&[(0, 0, 1.0)], (1, 2));
        let b = mat(&[(0, 1, 3.0)], (2, 2));
        let v = vstack(&[&a, &b]).unwrap();
        assert_eq!(v.shape(), (3, 2));
        assert_eq!(get(&v, 1, 1), 3.0);

        let h = hstack(&[&a, &mat(&[(0, 0, 7.0)], (1, 1))]).unwrap();
        assert_eq!(h.shape(), (1, 3));
        assert_eq!(get(&h, 0, 2), 7.0);
    }

    #[test]
    fn vstack_skips_empty_blocks() {
        let a = zeros(0, 4);
        let b = mat(&[(0, 3, 2.0)], (1, 4));
        let v = vstack(&[&a, &b]).unwrap();
        assert_eq!(v.shape(), (1, 4));
    }

    #[test]
    fn scatter_window_copies_block() {
        let m = mat(&[(0, 0, 1.0), (1, 1, 2.0), (2, 2, 3.0)], (3, 3));
        let mut tri = TriMat::new((2, 2));
        scatter_window(&mut tri, 0, 0, &m, 1, 1, 2, 2);
        let out: SpMat = tri.to_csr();
        assert_eq!(get(&out, 0, 0), 2.0);
        assert_eq!(get(&out, 1, 1), 3.0);
        assert_eq!(out.nnz(), 2);
    }

    #[test]
    fn mul_vec_matches_dense() {
        let m = mat(&[(0, 0, 2.0), (0, 1, -1.0), (1, 1, 4.0)], (2, 2));
        let r = mul_vec(&m, &[3.0, 2.0]).unwrap();
        assert_eq!(r, vec![4.0, 8.0]);
        assert!(mul_vec(&m, &[1.0]).is_err());
    }

    #[test]
    fn transpose_flips_entries() {
        let m = mat(&[(0, 1, 5.0)], (2, 3));
        let t = transpose(&m);
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(get(&t, 1, 0), 5.0);
    }
}
