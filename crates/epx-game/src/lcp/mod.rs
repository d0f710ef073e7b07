//! Linear complementarity problems and their mixed-integer reformulations.

mod outer;
pub(crate) mod poly;

pub use outer::OuterLcp;
pub use poly::{PolyLcp, PolySelection};

use crate::nash::NashGame;
use crate::{ComplPair, Encoding};
use epx_core::{matrix, persist, EpxError, EpxResult, SpMat};
use epx_mip::{ConstrSense, MipModel, Solution, VarType};
use std::path::Path;
use tracing::{trace, warn};

/// The problem `0 <= x  ⊥  Mx + q >= 0` with an explicit complementarity
/// pairing, optional side constraints `A x <= b`, and a contiguous range
/// `[lead_start, lead_end]` of variables that are not complemented with any
/// equation ("leader" variables).
pub struct Lcp {
    m: SpMat,
    q: Vec<f64>,
    compl: Vec<ComplPair>,
    lead_start: usize,
    lead_end: usize,
    n_leader: usize,
    a_side: SpMat,
    b_side: Vec<f64>,
    n_r: usize,
    n_c: usize,
    relaxed: Option<MipModel>,
    /// Big-M constant for the binary reformulation.
    pub big_m: f64,
    /// Feasibility/optimality tolerance.
    pub eps: f64,
    /// Integer feasibility tolerance used with the big-M reformulation.
    pub eps_int: f64,
    /// Complementarities as indicator constraints (default) or big-M rows.
    pub use_indicators: bool,
}

impl Lcp {
    /// Builds an LCP from `(M, q)` and an explicit pairing.
    pub fn with_pairs(
        m: SpMat,
        q: Vec<f64>,
        mut compl: Vec<ComplPair>,
        a_side: SpMat,
        b_side: Vec<f64>,
    ) -> EpxResult<Self> {
        let n_r = m.rows();
        let n_c = m.cols();
        if q.len() != n_r {
            return Err(EpxError::InvalidShape(format!(
                "M has {n_r} rows against a q of length {}",
                q.len()
            )));
        }
        if compl.len() != n_r {
            return Err(EpxError::InvalidShape(format!(
                "{} complementarity pairs for {n_r} equations",
                compl.len()
            )));
        }
        compl.sort_by_key(|p| p.0);
        for (i, &(eq, var)) in compl.iter().enumerate() {
            if eq != i || var >= n_c {
                return Err(EpxError::InvalidShape(format!(
                    "bad complementarity pair ({eq}, {var})"
                )));
            }
        }
        // The first pair with eq != var reveals the leader range.
        let (mut lead_start, mut lead_end, mut n_leader) = (n_r, n_r.saturating_sub(1), 0);
        for &(eq, var) in &compl {
            if eq != var {
                lead_start = eq;
                lead_end = var - 1;
                n_leader = lead_end + 1 - lead_start;
                break;
            }
        }
        let mut lcp = Lcp {
            m,
            q,
            compl,
            lead_start,
            lead_end,
            n_leader,
            a_side,
            b_side,
            n_r,
            n_c,
            relaxed: None,
            big_m: 1e7,
            eps: 1e-6,
            eps_int: 1e-8,
            use_indicators: true,
        };
        lcp.check_shapes()?;
        Ok(lcp)
    }

    /// Builds an LCP from `(M, q)` and the leader variable range: equation
    /// `i` pairs with variable `i`, shifted past the leader block.
    pub fn with_leader_range(
        m: SpMat,
        q: Vec<f64>,
        lead_start: usize,
        lead_end: usize,
        a_side: SpMat,
        b_side: Vec<f64>,
    ) -> EpxResult<Self> {
        let n_r = m.rows();
        let n_leader = (lead_end + 1).saturating_sub(lead_start);
        let compl = (0..n_r)
            .map(|i| (i, if i < lead_start { i } else { i + n_leader }))
            .collect();
        let mut lcp = Self::with_pairs(m, q, compl, a_side, b_side)?;
        lcp.lead_start = lead_start;
        lcp.lead_end = lead_end;
        lcp.n_leader = n_leader;
        Ok(lcp)
    }

    /// Builds the LCP of a Nash game: the game's KKT system plus its
    /// rewritten leader constraints as side constraints.
    pub fn from_nash(game: &NashGame) -> EpxResult<Self> {
        let (m, q, compl) = game.formulate_lcp()?;
        let a_side = game.rewrite_leader_constraints()?;
        let b_side = game.mc_lead_rhs();
        Self::with_pairs(m, q, compl, a_side, b_side)
    }

    fn check_shapes(&self) -> EpxResult<()> {
        if self.n_r + self.n_leader != self.n_c {
            return Err(EpxError::InvalidShape(format!(
                "{} rows plus {} leader variables do not give {} columns",
                self.n_r, self.n_leader, self.n_c
            )));
        }
        if self.a_side.rows() != self.b_side.len() {
            return Err(EpxError::InvalidShape(format!(
                "side constraints: {} rows against an RHS of length {}",
                self.a_side.rows(),
                self.b_side.len()
            )));
        }
        if self.a_side.rows() > 0 && self.a_side.cols() != self.n_c {
            return Err(EpxError::InvalidShape(format!(
                "side constraints have {} columns, expected {}",
                self.a_side.cols(),
                self.n_c
            )));
        }
        Ok(())
    }

    pub fn m(&self) -> &SpMat {
        &self.m
    }
    pub fn q_vec(&self) -> &[f64] {
        &self.q
    }
    pub fn compl(&self) -> &[ComplPair] {
        &self.compl
    }
    pub fn a_side(&self) -> &SpMat {
        &self.a_side
    }
    pub fn b_side(&self) -> &[f64] {
        &self.b_side
    }
    pub fn lead_start(&self) -> usize {
        self.lead_start
    }
    pub fn lead_end(&self) -> usize {
        self.lead_end
    }
    pub fn n_leader(&self) -> usize {
        self.n_leader
    }
    pub fn n_rows(&self) -> usize {
        self.n_r
    }
    pub fn n_cols(&self) -> usize {
        self.n_c
    }

    /// Variable index paired with equation `i` under the leader shift.
    pub fn var_position(&self, i: usize) -> usize {
        if i >= self.lead_start {
            i + self.n_leader
        } else {
            i
        }
    }

    /// Index of `x_i` in models derived from the relaxed model.
    pub fn x_var(&self, i: usize) -> usize {
        i
    }

    /// Index of `z_i` in models derived from the relaxed model.
    pub fn z_var(&self, i: usize) -> usize {
        self.n_c + i
    }

    /// Builds (once) and caches the relaxation with complementarity
    /// dropped: variables `x, z >= 0` with `z = Mx + q` and the side
    /// constraints. Derived models are always copies of the cache.
    fn make_relaxed(&mut self) -> EpxResult<()> {
        if self.relaxed.is_some() {
            return Ok(());
        }
        trace!(
            rows = self.n_r,
            cols = self.n_c,
            "building the relaxed model"
        );
        // Every variable carries objective coefficient 1: feasibility
        // solves then pick a minimal point instead of wandering on
        // unbounded faces, and degenerate equilibria resolve to their
        // smallest supporting values.
        let mut model = MipModel::new();
        for i in 0..self.n_c {
            let v = model.add_var(&format!("x_{i}"), 0.0, f64::INFINITY, VarType::Continuous);
            model.set_obj_coeff(v, 1.0);
        }
        for i in 0..self.n_r {
            let v = model.add_var(&format!("z_{i}"), 0.0, f64::INFINITY, VarType::Continuous);
            model.set_obj_coeff(v, 1.0);
        }
        for i in 0..self.n_r {
            let mut coeffs: Vec<(usize, f64)> = self
                .m
                .outer_view(i)
                .map(|row| row.iter().map(|(j, &v)| (j, v)).collect())
                .unwrap_or_default();
            coeffs.push((self.z_var(i), -1.0));
            model.add_constr(&format!("z_{i}_def"), coeffs, ConstrSense::Eq, -self.q[i]);
        }
        for i in 0..self.a_side.rows() {
            let coeffs: Vec<(usize, f64)> = self
                .a_side
                .outer_view(i)
                .map(|row| row.iter().map(|(j, &v)| (j, v)).collect())
                .unwrap_or_default();
            model.add_constr(
                &format!("side_{i}"),
                coeffs,
                ConstrSense::Le,
                self.b_side[i],
            );
        }
        self.relaxed = Some(model);
        Ok(())
    }

    /// A fresh copy of the relaxed model.
    pub fn relaxed_model(&mut self) -> EpxResult<MipModel> {
        self.make_relaxed()?;
        Ok(self.relaxed.as_ref().expect("cache was just built").clone())
    }

    /// The complementarity problem as a mixed-integer model, using the
    /// indicator or big-M reformulation depending on `use_indicators`.
    /// The model asks for the first feasible point (solution limit 1).
    pub fn as_mip(&mut self) -> EpxResult<MipModel> {
        self.as_mip_fixed(&[], &[])
    }

    /// Like [`Lcp::as_mip`], additionally pinning the listed equations and
    /// variables to zero. The result is always a restriction of the LCP.
    pub fn as_mip_fixed(&mut self, fix_eq: &[usize], fix_var: &[usize]) -> EpxResult<MipModel> {
        let mut model = self.relaxed_model()?;
        let pairs = self.compl.clone();
        if self.use_indicators {
            for &(i, j) in &pairs {
                let u = model.add_var(&format!("u_{i}"), 0.0, 1.0, VarType::Binary);
                let v = model.add_var(&format!("v_{i}"), 0.0, 1.0, VarType::Binary);
                model
                    .add_indicator(
                        &format!("z_ind_{i}"),
                        u,
                        vec![(self.z_var(i), 1.0)],
                        0.0,
                    )
                    .map_err(epx_core::EpxError::from)?;
                model
                    .add_indicator(
                        &format!("x_ind_{i}"),
                        v,
                        vec![(self.x_var(j), 1.0)],
                        0.0,
                    )
                    .map_err(epx_core::EpxError::from)?;
                model.add_constr(
                    &format!("uv_sum_{i}"),
                    vec![(u, 1.0), (v, 1.0)],
                    ConstrSense::Eq,
                    1.0,
                );
            }
        } else {
            for &(i, j) in &pairs {
                let u = model.add_var(&format!("u_{i}"), 0.0, 1.0, VarType::Binary);
                // z_i <= M u  and  x_j <= M (1 - u)
                model.add_constr(
                    &format!("z_{i}_le_Mu"),
                    vec![(self.z_var(i), 1.0), (u, -self.big_m)],
                    ConstrSense::Le,
                    0.0,
                );
                model.add_constr(
                    &format!("x_{i}_le_MuDash"),
                    vec![(self.x_var(j), 1.0), (u, self.big_m)],
                    ConstrSense::Le,
                    self.big_m,
                );
            }
            // big-M is numerically fragile; tighten the tolerances together
            model.params.int_tol = self.eps_int;
            model.params.feas_tol = self.eps;
            model.params.opt_tol = self.eps;
        }
        for &j in fix_var {
            model.set_var_ub(self.x_var(j), 0.0);
        }
        for &i in fix_eq {
            model.set_var_ub(self.z_var(i), 0.0);
        }
        model.params.solution_limit = Some(1);
        Ok(model)
    }

    /// A restriction of the LCP given a ±1/0 fix vector: +1 fixes the
    /// equation to equality, -1 the (paired) variable, 0 neither.
    pub fn as_mip_with_fixes(&mut self, fixes: &Encoding) -> EpxResult<MipModel> {
        if fixes.len() != self.n_r {
            return Err(EpxError::InvalidShape(format!(
                "fix vector has length {}, expected {}",
                fixes.len(),
                self.n_r
            )));
        }
        let mut fix_eq = Vec::new();
        let mut fix_var = Vec::new();
        for (i, &f) in fixes.iter().enumerate() {
            match f {
                1 => fix_eq.push(i),
                -1 => fix_var.push(self.compl[i].1),
                _ => {}
            }
        }
        self.as_mip_fixed(&fix_eq, &fix_var)
    }

    /// Replaces the feasibility objective with the linear leader objective
    /// `(c + C' x_minus_i) . x` over the binary-expanded LCP, solved to
    /// optimality rather than first feasibility.
    pub fn mpec_as_milp(
        &mut self,
        c_x: &SpMat,
        c: &[f64],
        x_minus_i: &[f64],
    ) -> EpxResult<MipModel> {
        if c_x.cols() != x_minus_i.len() {
            return Err(EpxError::WrongArity {
                expected: c_x.cols(),
                found: x_minus_i.len(),
            });
        }
        if c.len() != c_x.rows() {
            return Err(EpxError::InvalidShape(format!(
                "c has length {}, C has {} rows",
                c.len(),
                c_x.rows()
            )));
        }
        let mut model = self.as_mip()?;
        model.params.solution_limit = None;
        model.clear_objective();
        let cx = matrix::mul_vec(c_x, x_minus_i)?;
        for i in 0..c.len().min(self.n_c) {
            model.set_obj_coeff(self.x_var(i), c[i] + cx[i]);
        }
        Ok(model)
    }

    /// Layers `(1/2) x'Qx` on top of [`Lcp::mpec_as_milp`]. With an empty
    /// `Q` the model stays a MILP so the backend can use its plain
    /// mixed-integer path.
    pub fn mpec_as_miqp(
        &mut self,
        q_mat: &SpMat,
        c_x: &SpMat,
        c: &[f64],
        x_minus_i: &[f64],
    ) -> EpxResult<MipModel> {
        let mut model = self.mpec_as_milp(c_x, c, x_minus_i)?;
        for (&v, (i, j)) in q_mat.iter() {
            model.add_quad_obj(self.x_var(i), self.x_var(j), 0.5 * v);
        }
        Ok(model)
    }

    /// Pulls `(x, z)` out of a solved model derived from the relaxed model.
    /// Returns `None` when the solution is not usable.
    pub fn extract(&self, sol: &Solution) -> Option<(Vec<f64>, Vec<f64>)> {
        if !sol.is_success() {
            return None;
        }
        let x = sol.x[..self.n_c].to_vec();
        let z = sol.x[self.n_c..self.n_c + self.n_r].to_vec();
        Some((x, z))
    }

    /// `z = Mx + q`.
    pub fn z_from_x(&self, x: &[f64]) -> EpxResult<Vec<f64>> {
        let mut z = matrix::mul_vec(&self.m, x)?;
        for (zi, qi) in z.iter_mut().zip(&self.q) {
            *zi += qi;
        }
        Ok(z)
    }

    /// Encodes a feasible point in ±1/0 notation: +1 where the equation is
    /// tolerance-zero, -1 where the variable is, 0 where both are.
    pub fn solution_encoding(&self, x: &[f64]) -> EpxResult<Encoding> {
        let z = self.z_from_x(x)?;
        self.solution_encoding_zx(&z, x)
    }

    /// Same as [`Lcp::solution_encoding`] with the equation values given.
    pub fn solution_encoding_zx(&self, z: &[f64], x: &[f64]) -> EpxResult<Encoding> {
        let mut enc = vec![0i8; self.n_r];
        for &(i, j) in &self.compl {
            let z_zero = z[i].abs() <= self.eps;
            let x_zero = x[j].abs() <= self.eps;
            match (z_zero, x_zero) {
                (true, false) => enc[i] = 1,
                (false, true) => enc[i] = -1,
                (true, true) => enc[i] = 0,
                (false, false) => {
                    // a solver can leave both sides marginally positive;
                    // classify the smaller one as zero within 10x tolerance
                    if z[i].abs().min(x[j].abs()) <= 10.0 * self.eps {
                        enc[i] = if z[i].abs() <= x[j].abs() { 1 } else { -1 };
                    } else {
                        warn!(eq = i, var = j, z = z[i], x = x[j], "point is not complementary");
                        return Err(EpxError::Numerical(format!(
                            "pair ({i}, {j}) has z = {} and x = {}, no encoding exists",
                            z[i], x[j]
                        )));
                    }
                }
            }
        }
        Ok(enc)
    }

    /// Tolerant variant of [`Lcp::solution_encoding_zx`] for points that may
    /// violate complementarity: a pair with both sides positive is reported
    /// as unresolved (0) instead of failing. Used to pick branching
    /// locations on infeasible candidates.
    pub fn loose_encoding(&self, z: &[f64], x: &[f64]) -> Encoding {
        let mut enc = vec![0i8; self.n_r];
        for &(i, j) in &self.compl {
            let z_zero = z[i].abs() <= self.eps;
            let x_zero = x[j].abs() <= self.eps;
            if z_zero && !x_zero {
                enc[i] = 1;
            } else if x_zero && !z_zero {
                enc[i] = -1;
            }
        }
        enc
    }

    /// Writes the state file: magic string, then `M`, `q`, the leader
    /// range and the side constraints.
    pub fn save_into(&self, w: &mut impl std::io::Write) -> EpxResult<()> {
        persist::save_marker(w, "LCP")?;
        persist::save_mat(w, "LCP::M", &self.m)?;
        persist::save_vec(w, "LCP::q", &self.q)?;
        persist::save_usize(w, "LCP::LeadStart", self.lead_start)?;
        persist::save_usize(w, "LCP::LeadEnd", self.lead_end)?;
        persist::save_mat(w, "LCP::A", &self.a_side)?;
        persist::save_vec(w, "LCP::b", &self.b_side)?;
        Ok(())
    }

    pub fn save(&self, path: &Path, erase: bool) -> EpxResult<()> {
        persist::with_file(path, erase, |w| self.save_into(w))
    }

    /// Exact inverse of [`Lcp::save_into`].
    pub fn load_from(loader: &mut persist::Loader) -> EpxResult<Self> {
        loader.expect("LCP")?;
        let m = loader.read_mat("LCP::M")?;
        let q = loader.read_vec("LCP::q")?;
        let lead_start = loader.read_headed_usize("LCP::LeadStart")?;
        let lead_end = loader.read_headed_usize("LCP::LeadEnd")?;
        let a_side = loader.read_mat("LCP::A")?;
        let b_side = loader.read_vec("LCP::b")?;
        Self::with_leader_range(m, q, lead_start, lead_end, a_side, b_side)
    }

    pub fn load(path: &Path) -> EpxResult<Self> {
        let mut loader = persist::Loader::from_path(path)?;
        Self::load_from(&mut loader)
    }
}

/// Balas' extended formulation for the convex hull of a union of polyhedra
/// `{A_i x <= b_i, x >= 0}`, all sharing the common block `A_com x <= b_com`.
///
/// Variables are ordered `x (n) | x^1 ... x^k (k*n) | δ_1 ... δ_k`, with the
/// constraints `A_i x^i <= b_i δ_i`, `x = Σ x^i` (two inequalities per
/// coordinate), `Σ δ_i = 1` (two inequalities), and the common block applied
/// to `x` itself.
pub(crate) fn balas_hull(
    ai: &[SpMat],
    bi: &[Vec<f64>],
    a_common: &SpMat,
    b_common: &[f64],
) -> EpxResult<(SpMat, Vec<f64>)> {
    let n_poly = ai.len();
    if n_poly == 0 {
        return Err(EpxError::Unprepared(
            "convex hull of an empty union of polyhedra".into(),
        ));
    }
    if n_poly != bi.len() {
        return Err(EpxError::InvalidShape(
            "mismatched polyhedron LHS and RHS counts".into(),
        ));
    }
    let n_c = ai[0].cols();
    let mut n_poly_rows = 0;
    for (k, a) in ai.iter().enumerate() {
        if a.cols() != n_c {
            return Err(EpxError::InvalidShape(format!(
                "polyhedron {k} lives in {} variables, expected {n_c}",
                a.cols()
            )));
        }
        if a.rows() != bi[k].len() {
            return Err(EpxError::InvalidShape(format!(
                "polyhedron {k} has {} rows against an RHS of length {}",
                a.rows(),
                bi[k].len()
            )));
        }
        n_poly_rows += a.rows();
    }
    if a_common.rows() > 0 && a_common.cols() != n_c {
        return Err(EpxError::InvalidShape(
            "common block has the wrong variable count".into(),
        ));
    }
    if a_common.rows() != b_common.len() {
        return Err(EpxError::InvalidShape(
            "common block LHS and RHS sizes differ".into(),
        ));
    }

    let n_fin_var = n_c + n_poly * n_c + n_poly;
    let n_fin_cons = n_poly_rows + 2 * n_c + 2 + a_common.rows();
    let mut tri = sprs::TriMat::new((n_fin_cons, n_fin_var));
    let mut rhs = vec![0.0; n_fin_cons];

    // A_i x^i - b_i δ_i <= 0
    let mut row0 = 0;
    for (k, a) in ai.iter().enumerate() {
        matrix::scatter(&mut tri, row0, n_c + k * n_c, a);
        for (r, &b) in bi[k].iter().enumerate() {
            if b != 0.0 {
                tri.add_triplet(row0 + r, n_c + n_poly * n_c + k, -b);
            }
        }
        row0 += a.rows();
    }
    // x = Σ x^i, one <= and one >= per coordinate
    for j in 0..n_c {
        tri.add_triplet(row0 + 2 * j, j, -1.0);
        tri.add_triplet(row0 + 2 * j + 1, j, 1.0);
        for k in 0..n_poly {
            tri.add_triplet(row0 + 2 * j, n_c + k * n_c + j, 1.0);
            tri.add_triplet(row0 + 2 * j + 1, n_c + k * n_c + j, -1.0);
        }
    }
    // Σ δ = 1
    for k in 0..n_poly {
        tri.add_triplet(row0 + 2 * n_c, n_c + n_poly * n_c + k, 1.0);
        tri.add_triplet(row0 + 2 * n_c + 1, n_c + n_poly * n_c + k, -1.0);
    }
    rhs[row0 + 2 * n_c] = 1.0;
    rhs[row0 + 2 * n_c + 1] = -1.0;
    // common block on the original x
    let common0 = row0 + 2 * n_c + 2;
    matrix::scatter(&mut tri, common0, 0, a_common);
    rhs[common0..].copy_from_slice(b_common);

    Ok((tri.to_csr(), rhs))
}

impl std::fmt::Display for Lcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LCP with {} rows, {} columns and {} leader variables",
            self.n_r, self.n_c, self.n_leader
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn mat(entries: &[(usize, usize, f64)], shape: (usize, usize)) -> SpMat {
        let mut tri = TriMat::new(shape);
        for &(r, c, v) in entries {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    /// A 2x2 LCP with a unique solution: M = [[2, 1], [1, 2]], q = (-5, -6),
    /// solved by x = (4/3, 7/3), z = 0.
    fn small_lcp() -> Lcp {
        let m = mat(&[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 2.0)], (2, 2));
        Lcp::with_pairs(
            m,
            vec![-5.0, -6.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn constructor_checks_pairing() {
        let m = mat(&[(0, 0, 1.0)], (1, 1));
        assert!(Lcp::with_pairs(m, vec![0.0], vec![], matrix::zeros(0, 0), vec![]).is_err());
    }

    #[test]
    fn leader_range_constructor_shifts_pairs() {
        // 2 equations, 3 variables, variable 1 is the leader
        let m = mat(&[(0, 0, 1.0), (1, 2, 1.0)], (2, 3));
        let lcp =
            Lcp::with_leader_range(m, vec![0.0, 0.0], 1, 1, matrix::zeros(0, 0), vec![]).unwrap();
        assert_eq!(lcp.compl(), &[(0, 0), (1, 2)]);
        assert_eq!(lcp.n_leader(), 1);
        assert_eq!(lcp.var_position(1), 2);
    }

    #[test]
    fn indicator_mip_finds_the_solution() {
        let mut lcp = small_lcp();
        let model = lcp.as_mip().unwrap();
        let sol = model.optimize().unwrap();
        let (x, z) = lcp.extract(&sol).expect("feasible LCP");
        assert!((x[0] - 4.0 / 3.0).abs() < 1e-4, "x0 = {}", x[0]);
        assert!((x[1] - 7.0 / 3.0).abs() < 1e-4);
        assert!(z.iter().all(|&v| v.abs() < 1e-4));
    }

    #[test]
    fn big_m_mip_agrees_with_indicators() {
        let mut lcp = small_lcp();
        lcp.use_indicators = false;
        let sol = lcp.as_mip().unwrap().optimize().unwrap();
        let (x, _) = lcp.extract(&sol).expect("feasible LCP");
        assert!((x[0] - 4.0 / 3.0).abs() < 1e-4);
        assert!((x[1] - 7.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn encoding_from_point() {
        let lcp = small_lcp();
        let enc = lcp.solution_encoding(&[4.0 / 3.0, 7.0 / 3.0]).unwrap();
        assert_eq!(enc, vec![1, 1]);
        // x = 0 gives z = q < 0? No: z = (-5, -6) is negative, so the point
        // is outside the feasible region but still encodable: x is zero.
        let enc = lcp.solution_encoding(&[0.0, 0.0]).unwrap();
        assert_eq!(enc, vec![-1, -1]);
        // a point with both sides positive has no encoding
        assert!(lcp.solution_encoding(&[10.0, 10.0]).is_err());
    }

    #[test]
    fn mpec_milp_optimizes_over_the_solution_set() {
        // M = I, q = (-1, -1): solutions x with x_i in {0 with z>0?}:
        // z = x - 1 >= 0 and x ⊥ z means x_i = 1... actually x_i ⊥ x_i - 1:
        // either x_i = 0 (z = -1 < 0, infeasible) or x_i = 1. Unique point
        // (1, 1); the objective just reads it back.
        let m = mat(&[(0, 0, 1.0), (1, 1, 1.0)], (2, 2));
        let mut lcp = Lcp::with_pairs(
            m,
            vec![-1.0, -1.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap();
        let model = lcp
            .mpec_as_milp(&matrix::zeros(2, 0), &[3.0, 4.0], &[])
            .unwrap();
        let sol = model.optimize().unwrap();
        assert!(sol.is_success());
        assert!((sol.objective - 7.0).abs() < 1e-4);
    }

    #[test]
    fn restriction_with_fixes_is_respected() {
        // M = [[0, 1], [1, 0]], q = (0, 0): either variable can be positive.
        let m = mat(&[(0, 1, 1.0), (1, 0, 1.0)], (2, 2));
        let mut lcp = Lcp::with_pairs(
            m,
            vec![0.0, 0.0],
            vec![(0, 0), (1, 1)],
            matrix::zeros(0, 0),
            vec![],
        )
        .unwrap();
        let model = lcp.as_mip_with_fixes(&vec![-1, 0]).unwrap();
        let sol = model.optimize().unwrap();
        let (x, _) = lcp.extract(&sol).unwrap();
        assert!(x[0].abs() < 1e-6, "x0 was fixed to zero");
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lcp.dat");
        let lcp = small_lcp();
        lcp.save(&path, true).unwrap();
        let back = Lcp::load(&path).unwrap();
        assert!(persist::mats_identical(lcp.m(), back.m()));
        assert_eq!(lcp.q_vec(), back.q_vec());
        assert_eq!(lcp.compl(), back.compl());
        assert_eq!(lcp.lead_start(), back.lead_start());
    }
}
