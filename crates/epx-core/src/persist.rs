//! Append save/load framing for solver state files.
//!
//! A state file is a sequence of records, each written as a self-describing
//! header line followed by a length line and an ascii payload:
//!
//! ```text
//! LCP::M
//! 4 6 3          <- rows cols nnz, then one "row col value" triple per line
//! 0 0 2.5
//! ...
//! LCP::q
//! 4              <- element count, one value per line
//! ...
//! ```
//!
//! Floats are printed with Rust's shortest round-trip formatting, so a
//! save/load cycle reproduces every entry bitwise. [`Loader`] walks the file
//! as a token stream and checks each expected header before consuming the
//! payload.

use crate::{matrix, EpxError, EpxResult, SpMat};
use std::io::Write;

/// Appends a bare marker line (used for magic strings such as `"LCP"`).
pub fn save_marker(w: &mut impl Write, marker: &str) -> EpxResult<()> {
    writeln!(w, "{marker}")?;
    Ok(())
}

/// Appends a sparse matrix in coordinate ascii under `header`.
pub fn save_mat(w: &mut impl Write, header: &str, m: &SpMat) -> EpxResult<()> {
    writeln!(w, "{header}")?;
    writeln!(w, "{} {} {}", m.rows(), m.cols(), m.nnz())?;
    for (&v, (r, c)) in m.iter() {
        writeln!(w, "{r} {c} {v}")?;
    }
    Ok(())
}

/// Appends a dense vector as length-prefixed ascii under `header`.
pub fn save_vec(w: &mut impl Write, header: &str, v: &[f64]) -> EpxResult<()> {
    writeln!(w, "{header}")?;
    writeln!(w, "{}", v.len())?;
    for x in v {
        writeln!(w, "{x}")?;
    }
    Ok(())
}

/// Appends a single unsigned integer under `header`.
pub fn save_usize(w: &mut impl Write, header: &str, x: usize) -> EpxResult<()> {
    writeln!(w, "{header}")?;
    writeln!(w, "{x}")?;
    Ok(())
}

/// Token-stream reader over a state file written with the `save_*` helpers.
pub struct Loader {
    tokens: Vec<String>,
    pos: usize,
}

impl Loader {
    pub fn from_str(content: &str) -> Self {
        Loader {
            tokens: content.split_whitespace().map(str::to_string).collect(),
            pos: 0,
        }
    }

    pub fn from_path(path: &std::path::Path) -> EpxResult<Self> {
        Ok(Self::from_str(&std::fs::read_to_string(path)?))
    }

    /// True when every token has been consumed.
    pub fn exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> EpxResult<&str> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| EpxError::Parse("unexpected end of file".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    /// Consumes one token and checks it equals `header`.
    pub fn expect(&mut self, header: &str) -> EpxResult<()> {
        let tok = self.next()?;
        if tok != header {
            return Err(EpxError::Parse(format!(
                "wrong header: expected {header}, found {tok}"
            )));
        }
        Ok(())
    }

    /// Peeks at the next token without consuming it.
    pub fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    pub fn read_usize(&mut self) -> EpxResult<usize> {
        let tok = self.next()?;
        tok.parse()
            .map_err(|_| EpxError::Parse(format!("expected integer, found {tok}")))
    }

    pub fn read_f64(&mut self) -> EpxResult<f64> {
        let tok = self.next()?;
        tok.parse()
            .map_err(|_| EpxError::Parse(format!("expected number, found {tok}")))
    }

    /// Reads one free-form token (names, enum tags).
    pub fn read_token(&mut self) -> EpxResult<String> {
        Ok(self.next()?.to_string())
    }

    /// Reads a headered sparse matrix.
    pub fn read_mat(&mut self, header: &str) -> EpxResult<SpMat> {
        self.expect(header)?;
        let n_rows = self.read_usize()?;
        let n_cols = self.read_usize()?;
        let nnz = self.read_usize()?;
        let mut tri = sprs::TriMat::new((n_rows, n_cols));
        for _ in 0..nnz {
            let r = self.read_usize()?;
            let c = self.read_usize()?;
            let v = self.read_f64()?;
            if r >= n_rows || c >= n_cols {
                return Err(EpxError::Parse(format!(
                    "{header}: entry ({r}, {c}) out of bounds"
                )));
            }
            tri.add_triplet(r, c, v);
        }
        Ok(tri.to_csr())
    }

    /// Reads a headered length-prefixed vector.
    pub fn read_vec(&mut self, header: &str) -> EpxResult<Vec<f64>> {
        self.expect(header)?;
        let n = self.read_usize()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_f64()?);
        }
        Ok(out)
    }

    /// Reads a headered unsigned integer.
    pub fn read_headed_usize(&mut self, header: &str) -> EpxResult<usize> {
        self.expect(header)?;
        self.read_usize()
    }
}

/// Saves through a closure into a file, truncating or appending.
pub fn with_file<F>(path: &std::path::Path, erase: bool, f: F) -> EpxResult<()>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>) -> EpxResult<()>,
{
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(erase)
        .append(!erase)
        .open(path)?;
    let mut w = std::io::BufWriter::new(file);
    f(&mut w)?;
    Ok(())
}

/// Convenience: matrix equality test for round-trip assertions.
pub fn mats_identical(a: &SpMat, b: &SpMat) -> bool {
    a.shape() == b.shape() && matrix::max_abs_diff(a, b) == 0.0
}
