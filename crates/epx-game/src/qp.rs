//! Parametric quadratic programs.
//!
//! A [`QpParam`] is the minimisation of `(1/2) y'Qy + c'y + (Cx)'y` over
//! `Ax + By <= b, y >= 0`, where `y` are the player's own variables and `x`
//! the exogenous parameters (typically the other players' decisions).

use epx_core::{matrix, persist, EpxError, EpxResult, SpMat};
use epx_mip::{ConstrSense, MipModel, VarType};
use std::path::Path;

/// Objective data `(Q, C, c)` of a parametric QP.
#[derive(Debug, Clone)]
pub struct QpObjective {
    pub q: SpMat,
    pub c_x: SpMat,
    pub c: Vec<f64>,
}

/// Constraint data `(A, B, b)` of a parametric QP.
#[derive(Debug, Clone)]
pub struct QpConstraints {
    pub a: SpMat,
    pub b_mat: SpMat,
    pub b: Vec<f64>,
}

/// Where dummy parameter columns are spliced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyPosition {
    /// Append after the last existing column.
    Append,
    /// Insert before the given column index (0 prepends).
    At(usize),
}

/// A solved fixed-parameter QP.
#[derive(Debug, Clone)]
pub struct QpSolution {
    pub y: Vec<f64>,
    pub objective: f64,
}

/// A parametric quadratic program.
///
/// The quadratic part of the objective is materialised once into a cached
/// backend model; any mutation of the data (including [`QpParam::add_dummy`]
/// at any position) drops that cache.
#[derive(Debug, Clone)]
pub struct QpParam {
    q: SpMat,
    c_x: SpMat,
    a: SpMat,
    b_mat: SpMat,
    c: Vec<f64>,
    b: Vec<f64>,
    nx: usize,
    ny: usize,
    ncons: usize,
    quad_model: Option<MipModel>,
}

impl Default for QpParam {
    fn default() -> Self {
        QpParam::new()
    }
}

impl QpParam {
    pub fn new() -> Self {
        QpParam {
            q: matrix::zeros(0, 0),
            c_x: matrix::zeros(0, 0),
            a: matrix::zeros(0, 0),
            b_mat: matrix::zeros(0, 0),
            c: Vec::new(),
            b: Vec::new(),
            nx: 0,
            ny: 0,
            ncons: 0,
            quad_model: None,
        }
    }

    /// Sets the full data block, validating shapes and the symmetry of `Q`.
    pub fn set(
        &mut self,
        q: SpMat,
        c_x: SpMat,
        a: SpMat,
        b_mat: SpMat,
        c: Vec<f64>,
        b: Vec<f64>,
    ) -> EpxResult<&mut Self> {
        let ny = q.rows();
        let nx = c_x.cols();
        let ncons = b.len();
        if q.cols() != ny {
            return Err(EpxError::InvalidShape(format!(
                "Q must be square, found {}x{}",
                q.rows(),
                q.cols()
            )));
        }
        if matrix::max_abs_diff(&q, &matrix::transpose(&q)) > 1e-9 {
            return Err(EpxError::InvalidShape("Q must be symmetric".into()));
        }
        if c_x.rows() != ny {
            return Err(EpxError::InvalidShape(format!(
                "C must have {} rows, found {}",
                ny,
                c_x.rows()
            )));
        }
        if c.len() != ny {
            return Err(EpxError::InvalidShape(format!(
                "c must have length {}, found {}",
                ny,
                c.len()
            )));
        }
        if a.rows() != ncons || b_mat.rows() != ncons {
            return Err(EpxError::InvalidShape(format!(
                "A and B must have {} rows, found {} and {}",
                ncons,
                a.rows(),
                b_mat.rows()
            )));
        }
        if a.cols() != nx {
            return Err(EpxError::InvalidShape(format!(
                "A must have {} columns, found {}",
                nx,
                a.cols()
            )));
        }
        if b_mat.cols() != ny {
            return Err(EpxError::InvalidShape(format!(
                "B must have {} columns, found {}",
                ny,
                b_mat.cols()
            )));
        }
        self.q = q;
        self.c_x = c_x;
        self.a = a;
        self.b_mat = b_mat;
        self.c = c;
        self.b = b;
        self.nx = nx;
        self.ny = ny;
        self.ncons = ncons;
        self.quad_model = None;
        Ok(self)
    }

    /// Sets data from objective and constraint bundles.
    pub fn set_parts(&mut self, obj: QpObjective, cons: QpConstraints) -> EpxResult<&mut Self> {
        self.set(obj.q, obj.c_x, cons.a, cons.b_mat, obj.c, cons.b)
    }

    pub fn q(&self) -> &SpMat {
        &self.q
    }
    pub fn c_x(&self) -> &SpMat {
        &self.c_x
    }
    pub fn a(&self) -> &SpMat {
        &self.a
    }
    pub fn b_mat(&self) -> &SpMat {
        &self.b_mat
    }
    pub fn c(&self) -> &[f64] {
        &self.c
    }
    pub fn b(&self) -> &[f64] {
        &self.b
    }
    pub fn nx(&self) -> usize {
        self.nx
    }
    pub fn ny(&self) -> usize {
        self.ny
    }
    pub fn ncons(&self) -> usize {
        self.ncons
    }

    /// Zero-pads the parameter and/or decision spaces.
    ///
    /// Decision variables are always appended; parameter columns land at
    /// `position`. Existing entries are preserved, new rows and columns are
    /// structurally zero, and the cached backend model is invalidated.
    pub fn add_dummy(
        &mut self,
        pars: usize,
        vars: usize,
        position: DummyPosition,
    ) -> EpxResult<&mut Self> {
        self.quad_model = None;
        self.nx += pars;
        self.ny += vars;
        if vars > 0 {
            self.q = matrix::resized(&self.q, self.ny, self.ny);
            self.b_mat = matrix::resized(&self.b_mat, self.ncons, self.ny);
            self.c = matrix::resized_vec(&self.c, self.ny);
        }
        if pars > 0 {
            self.a = splice_cols(&self.a, pars, position)?;
        }
        if pars > 0 || vars > 0 {
            let grown = matrix::resized(&self.c_x, self.ny, self.c_x.cols());
            self.c_x = if pars > 0 {
                splice_cols(&grown, pars, position)?
            } else {
                grown
            };
        }
        Ok(self)
    }

    /// Emits the KKT system of the QP:
    ///
    /// `0 <= [y; λ]  ⊥  M [y; λ] + N x + q >= 0`
    ///
    /// with `M = [[Q, B'], [-B, 0]]`, `N = [C; -A]`, `q = [c; b]`.
    pub fn kkt(&self) -> EpxResult<(SpMat, SpMat, Vec<f64>)> {
        let bt = matrix::transpose(&self.b_mat);
        let top = matrix::hstack(&[&self.q, &bt])?;
        let bottom = matrix::hstack(&[
            &matrix::neg(&self.b_mat),
            &matrix::zeros(self.ncons, self.ncons),
        ])?;
        let m = matrix::vstack(&[&top, &bottom])?;
        let n = matrix::vstack(&[&self.c_x, &matrix::neg(&self.a)])?;
        let mut rhs = self.c.clone();
        rhs.extend_from_slice(&self.b);
        Ok((m, n, rhs))
    }

    /// Solves the QP at the fixed parameter value `x` — the player's best
    /// response to the decisions frozen in `x`.
    ///
    /// Returns `None` when the instantiated QP is infeasible.
    pub fn solve_fixed(&mut self, x: &[f64]) -> EpxResult<Option<QpSolution>> {
        if x.len() != self.nx {
            return Err(EpxError::WrongArity {
                expected: self.nx,
                found: x.len(),
            });
        }
        self.make_quad_model();
        let base = self.quad_model.as_ref().expect("cache was just built");
        let mut model = base.clone();

        let cx = matrix::mul_vec(&self.c_x, x)?;
        for i in 0..self.ny {
            model.set_obj_coeff(i, self.c[i] + cx[i]);
        }
        let ax = matrix::mul_vec(&self.a, x)?;
        for i in 0..self.ncons {
            let coeffs: Vec<(usize, f64)> = self
                .b_mat
                .outer_view(i)
                .map(|row| row.iter().map(|(j, &v)| (j, v)).collect())
                .unwrap_or_default();
            model.add_constr(&format!("cons_{i}"), coeffs, ConstrSense::Le, self.b[i] - ax[i]);
        }
        let sol = model.optimize()?;
        if !sol.is_success() {
            return Ok(None);
        }
        Ok(Some(QpSolution {
            y: sol.x[..self.ny].to_vec(),
            objective: sol.objective,
        }))
    }

    /// Evaluates `(1/2) y'Qy + c'y + (Cx)'y`, optionally verifying
    /// `Ax + By <= b` within `tol` first.
    pub fn compute_objective(
        &self,
        y: &[f64],
        x: &[f64],
        check_feas: bool,
        tol: f64,
    ) -> EpxResult<f64> {
        if y.len() != self.ny {
            return Err(EpxError::WrongArity {
                expected: self.ny,
                found: y.len(),
            });
        }
        if x.len() != self.nx {
            return Err(EpxError::WrongArity {
                expected: self.nx,
                found: x.len(),
            });
        }
        if check_feas {
            let ax = matrix::mul_vec(&self.a, x)?;
            let by = matrix::mul_vec(&self.b_mat, y)?;
            for i in 0..self.ncons {
                if ax[i] + by[i] > self.b[i] + tol {
                    return Err(EpxError::Numerical(format!(
                        "constraint {i} violated by {}",
                        ax[i] + by[i] - self.b[i]
                    )));
                }
            }
            if y.iter().any(|&v| v < -tol) {
                return Err(EpxError::Numerical("negative decision variable".into()));
            }
        }
        let qy = matrix::mul_vec(&self.q, y)?;
        let cx = matrix::mul_vec(&self.c_x, x)?;
        let mut val = 0.0;
        for i in 0..self.ny {
            val += 0.5 * y[i] * qy[i] + (self.c[i] + cx[i]) * y[i];
        }
        Ok(val)
    }

    /// Whether this player and `other` can face each other in a Nash game.
    pub fn is_playable(&self, other: &QpParam) -> bool {
        self.nx + self.ny == other.nx + other.ny
            && self.nx >= other.ny
            && self.ny <= other.nx
    }

    fn make_quad_model(&mut self) {
        if self.quad_model.is_some() {
            return;
        }
        let mut model = MipModel::new();
        for i in 0..self.ny {
            model.add_var(&format!("y_{i}"), 0.0, f64::INFINITY, VarType::Continuous);
        }
        for (&v, (i, j)) in self.q.iter() {
            // (1/2) y'Qy as expression terms
            model.add_quad_obj(i, j, 0.5 * v);
        }
        self.quad_model = Some(model);
    }

    /// Appends the data to an open state file with `QP_Param::*` headers.
    pub fn save_into(&self, w: &mut impl std::io::Write) -> EpxResult<()> {
        persist::save_mat(w, "QP_Param::Q", &self.q)?;
        persist::save_mat(w, "QP_Param::A", &self.a)?;
        persist::save_mat(w, "QP_Param::B", &self.b_mat)?;
        persist::save_mat(w, "QP_Param::C", &self.c_x)?;
        persist::save_vec(w, "QP_Param::b", &self.b)?;
        persist::save_vec(w, "QP_Param::c", &self.c)?;
        Ok(())
    }

    pub fn save(&self, path: &Path, erase: bool) -> EpxResult<()> {
        persist::with_file(path, erase, |w| self.save_into(w))
    }

    /// Reads the data written by [`QpParam::save_into`].
    pub fn load_from(&mut self, loader: &mut persist::Loader) -> EpxResult<()> {
        let q = loader.read_mat("QP_Param::Q")?;
        let a = loader.read_mat("QP_Param::A")?;
        let b_mat = loader.read_mat("QP_Param::B")?;
        let c_x = loader.read_mat("QP_Param::C")?;
        let b = loader.read_vec("QP_Param::b")?;
        let c = loader.read_vec("QP_Param::c")?;
        self.set(q, c_x, a, b_mat, c, b)?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> EpxResult<()> {
        let mut loader = persist::Loader::from_path(path)?;
        self.load_from(&mut loader)
    }
}

impl PartialEq for QpParam {
    fn eq(&self, other: &Self) -> bool {
        let close = |a: &SpMat, b: &SpMat| {
            a.shape() == b.shape() && matrix::max_abs_diff(a, b) <= 1e-9
        };
        close(&self.q, &other.q)
            && close(&self.c_x, &other.c_x)
            && close(&self.a, &other.a)
            && close(&self.b_mat, &other.b_mat)
            && matrix::vecs_close(&self.c, &other.c, 1e-9)
            && matrix::vecs_close(&self.b, &other.b, 1e-9)
    }
}

/// Inserts `count` zero columns into `m` at `position`.
fn splice_cols(m: &SpMat, count: usize, position: DummyPosition) -> EpxResult<SpMat> {
    let n_cols = m.cols() + count;
    match position {
        DummyPosition::Append => Ok(matrix::resized(m, m.rows(), n_cols)),
        DummyPosition::At(p) => {
            if p > m.cols() {
                return Err(EpxError::InvalidShape(format!(
                    "cannot splice at column {p} of a matrix with {} columns",
                    m.cols()
                )));
            }
            let mut tri = sprs::TriMat::new((m.rows(), n_cols));
            for (&v, (r, c)) in m.iter() {
                let col = if c < p { c } else { c + count };
                tri.add_triplet(r, col, v);
            }
            Ok(tri.to_csr())
        }
    }
}
